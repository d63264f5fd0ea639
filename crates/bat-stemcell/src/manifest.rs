//! Stemcell manifest (`stemcell.MF`) parsing.

use crate::config::{mapping_field, parse_document, scalar_field, ROOT_FIELD};
use crate::error::{ResolveError, Result};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Name of the manifest entry inside a stemcell archive.
pub const MANIFEST_ENTRY: &str = "stemcell.MF";

/// Metadata embedded in a stemcell archive.
#[derive(Debug, Clone, PartialEq)]
pub struct StemcellManifest {
    /// Stemcell name.
    pub name: String,

    /// Stemcell version.
    pub version: String,

    /// Operating system the image was built from.
    pub operating_system: Option<String>,

    /// SHA1 of the image file.
    pub sha1: Option<String>,

    /// Agent protocol version.
    pub bosh_protocol: Option<String>,

    /// Provider-specific properties.
    pub cloud_properties: Mapping,
}

impl StemcellManifest {
    /// Load a manifest from an extracted file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// lacks a name or version.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ResolveError::ReadManifest {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content, path)
    }

    /// Parse a manifest from YAML text. `origin` is only used for error context.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a required field is absent.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let document = parse_document(content, origin)?;
        let root = mapping_field(Some(&document), origin, ROOT_FIELD)?;
        let field = |key: &str| root.and_then(|m| m.get(key));

        Ok(Self {
            name: scalar_field(field("name"), origin, "name")?,
            version: scalar_field(field("version"), origin, "version")?,
            operating_system: optional_field(field("operating_system"), origin, "operating_system")?,
            sha1: optional_field(field("sha1"), origin, "sha1")?,
            bosh_protocol: optional_field(field("bosh_protocol"), origin, "bosh_protocol")?,
            cloud_properties: mapping_field(field("cloud_properties"), origin, "cloud_properties")?
                .cloned()
                .unwrap_or_default(),
        })
    }
}

fn optional_field(
    value: Option<&Value>,
    origin: &Path,
    field: &'static str,
) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_field(Some(value), origin, field).map(Some),
    }
}
