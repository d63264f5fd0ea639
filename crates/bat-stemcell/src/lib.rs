//! Stemcell resolution for BOSH acceptance test runs.
//!
//! This crate provides:
//! - Loading the desired stemcell from an acceptance-test config file
//! - Resolving the `latest` sentinel from a stemcell archive's `stemcell.MF`
//! - Pluggable archive extraction (in-process or via a `tar` binary)
//! - The cloud adapter boundary used by the suite

mod cloud;
mod config;
mod error;
mod extract;
mod manifest;
mod resolve;
mod stemcell;
pub mod testutil;

pub use cloud::{Cloud, CloudError};
pub use config::{StemcellConfig, LATEST_VERSION};
pub use error::{ErrorKind, ResolveError, Result};
pub use extract::{ArchiveExtractor, ExtractError, TarCommand, TarGzExtractor};
pub use manifest::{StemcellManifest, MANIFEST_ENTRY};
pub use resolve::{resolve, ResolverOptions, StemcellResolver};
pub use stemcell::StemcellSpec;
