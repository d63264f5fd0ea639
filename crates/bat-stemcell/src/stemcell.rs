//! The resolved stemcell identity.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A resolved stemcell: name, version and where it came from.
///
/// Two stemcells are equal when their canonical `{name}-{version}` forms
/// match, regardless of source.
#[derive(Debug, Clone)]
pub struct StemcellSpec {
    name: String,
    version: String,
    source: String,
}

impl StemcellSpec {
    /// Create a stemcell identity.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source: source.into(),
        }
    }

    /// Stemcell name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stemcell version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The path or URI this stemcell was resolved against.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The canonical `{name}-{version}` form.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StemcellSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

impl PartialEq for StemcellSpec {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for StemcellSpec {}

impl Hash for StemcellSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}
