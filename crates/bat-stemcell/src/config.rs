//! Acceptance-test configuration loading.
//!
//! Only the stemcell section is read:
//! ```yaml
//! properties:
//!   stemcell:
//!     name: bosh-aws-xen-ubuntu
//!     version: latest
//! ```

use crate::error::{ResolveError, Result};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Sentinel version asking for the version recorded inside the stemcell itself.
pub const LATEST_VERSION: &str = "latest";

/// Field name used when the document root itself has the wrong shape.
pub(crate) const ROOT_FIELD: &str = "(document root)";

const PROPERTIES_FIELD: &str = "properties";
const STEMCELL_FIELD: &str = "properties.stemcell";
const NAME_FIELD: &str = "properties.stemcell.name";
const VERSION_FIELD: &str = "properties.stemcell.version";

/// The desired stemcell as declared in the test configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemcellConfig {
    /// Declared stemcell name.
    pub name: String,

    /// Declared version, possibly [`LATEST_VERSION`].
    pub version: String,
}

impl StemcellConfig {
    /// Load the stemcell section from a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// lacks `properties.stemcell.name` / `properties.stemcell.version`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ResolveError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse the stemcell section from YAML text. `origin` is only used
    /// for error context.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the text is not YAML, and a configuration
    /// error if a section has the wrong shape or a required field is absent.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let document = parse_document(content, origin)?;

        let root = mapping_field(Some(&document), origin, ROOT_FIELD)?;
        let properties = mapping_field(
            root.and_then(|m| m.get(PROPERTIES_FIELD)),
            origin,
            PROPERTIES_FIELD,
        )?;
        let stemcell = mapping_field(
            properties.and_then(|m| m.get("stemcell")),
            origin,
            STEMCELL_FIELD,
        )?;

        Ok(Self {
            name: scalar_field(stemcell.and_then(|m| m.get("name")), origin, NAME_FIELD)?,
            version: scalar_field(
                stemcell.and_then(|m| m.get("version")),
                origin,
                VERSION_FIELD,
            )?,
        })
    }

    /// Whether the version should be read from the stemcell archive.
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.version == LATEST_VERSION
    }
}

/// Parse YAML text into a generic document. Only syntax errors are reported
/// here; shape is checked field by field.
pub(crate) fn parse_document(content: &str, origin: &Path) -> Result<Value> {
    serde_yaml::from_str(content).map_err(|source| ResolveError::Parse {
        path: origin.to_path_buf(),
        source,
    })
}

/// Describe a YAML value's type for error messages.
fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "an unquoted float (quote the value)",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Read an optional section that must be a mapping when present.
pub(crate) fn mapping_field<'a>(
    value: Option<&'a Value>,
    origin: &Path,
    field: &'static str,
) -> Result<Option<&'a Mapping>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Mapping(m)) => Ok(Some(m)),
        Some(other) => Err(ResolveError::InvalidField {
            path: origin.to_path_buf(),
            field,
            expected: "a mapping",
            found: describe(other),
        }),
    }
}

/// Read a required scalar field as text.
///
/// Strings are taken verbatim and unquoted integers (`version: 3000`) keep
/// their decimal text. Unquoted floats are rejected since `3000.10` would
/// otherwise read back as `3000.1`. Null and blank strings count as missing.
pub(crate) fn scalar_field(
    value: Option<&Value>,
    origin: &Path,
    field: &'static str,
) -> Result<String> {
    match value {
        None | Some(Value::Null) => Err(ResolveError::MissingField {
            path: origin.to_path_buf(),
            field,
        }),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ResolveError::MissingField {
            path: origin.to_path_buf(),
            field,
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) if !n.is_f64() => Ok(n.to_string()),
        Some(other) => Err(ResolveError::InvalidField {
            path: origin.to_path_buf(),
            field,
            expected: "a string or integer",
            found: describe(other),
        }),
    }
}
