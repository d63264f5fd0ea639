//! Error types for stemcell resolution.

use crate::extract::ExtractError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for resolution operations.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Broad classification of a [`ResolveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing input fields, or a missing required local file.
    Configuration,
    /// Process or format failure while pulling the manifest out of an archive.
    ArchiveExtraction,
    /// A document was not valid YAML.
    Parse,
}

/// Errors that can occur while resolving a stemcell.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("failed to read config {path:?}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required field '{field}' in {path:?}")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("field '{field}' in {path:?} must be {expected}, found {found}")]
    InvalidField {
        path: PathBuf,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("specifying \"latest\" requires a local stemcell: {reason} ({path_or_uri})")]
    LocalStemcellRequired {
        path_or_uri: String,
        reason: &'static str,
    },

    #[error("failed to create scratch directory: {0}")]
    ScratchDir(#[source] std::io::Error),

    #[error("failed to extract '{entry}' from {archive:?}: {source}")]
    Extract {
        archive: PathBuf,
        entry: String,
        #[source]
        source: ExtractError,
    },

    #[error("failed to read extracted manifest {path:?}: {source}")]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ResolveError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReadConfig { .. }
            | Self::MissingField { .. }
            | Self::InvalidField { .. }
            | Self::LocalStemcellRequired { .. } => ErrorKind::Configuration,
            Self::ScratchDir(_) | Self::Extract { .. } | Self::ReadManifest { .. } => {
                ErrorKind::ArchiveExtraction
            }
            Self::Parse { .. } => ErrorKind::Parse,
        }
    }
}
