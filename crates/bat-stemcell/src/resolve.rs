//! Stemcell resolution.
//!
//! A pinned version in the test configuration is taken at face value. The
//! `latest` sentinel instead asks for the stemcell's own manifest: the
//! archive must be local, and its `stemcell.MF` is extracted into a scratch
//! directory that is removed before `resolve` returns, on every path.

use crate::config::StemcellConfig;
use crate::error::{ResolveError, Result};
use crate::extract::{ArchiveExtractor, TarGzExtractor};
use crate::manifest::{StemcellManifest, MANIFEST_ENTRY};
use crate::stemcell::StemcellSpec;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// Tunables for a [`StemcellResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Archive entry holding the stemcell manifest.
    pub manifest_entry: String,

    /// Parent directory for scratch directories. Defaults to the system temp dir.
    pub temp_root: Option<PathBuf>,

    /// Name prefix for scratch directories.
    pub temp_prefix: String,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            manifest_entry: String::from(MANIFEST_ENTRY),
            temp_root: None,
            temp_prefix: String::from("stemcell-"),
        }
    }
}

impl ResolverOptions {
    /// Set the manifest entry name.
    #[must_use]
    pub fn manifest_entry(mut self, entry: impl Into<String>) -> Self {
        self.manifest_entry = entry.into();
        self
    }

    /// Create scratch directories under `root`.
    #[must_use]
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Set the scratch directory name prefix.
    #[must_use]
    pub fn temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = prefix.into();
        self
    }
}

/// Resolves the stemcell an acceptance-test run should use.
#[derive(Debug, Clone, Default)]
pub struct StemcellResolver<E = TarGzExtractor> {
    extractor: E,
    options: ResolverOptions,
}

impl StemcellResolver<TarGzExtractor> {
    /// Create a resolver using the in-process tarball extractor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: ArchiveExtractor> StemcellResolver<E> {
    /// Create a resolver using the given extractor.
    pub fn with_extractor(extractor: E) -> Self {
        Self {
            extractor,
            options: ResolverOptions::default(),
        }
    }

    /// Replace the resolver's options.
    #[must_use]
    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    /// The resolver's options.
    #[must_use]
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve the stemcell declared in the config file at `config_path`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unreadable or incomplete config and
    /// for `latest` without a local stemcell, an extraction error when the
    /// manifest cannot be pulled from the archive, and a parse error for
    /// malformed documents.
    #[instrument(skip(self, config_path), fields(config = %config_path.display()))]
    pub fn resolve(&self, config_path: &Path, path_or_uri: &str) -> Result<StemcellSpec> {
        let config = StemcellConfig::from_path(config_path)?;
        self.resolve_config(&config, path_or_uri)
    }

    /// Resolve from an already loaded configuration.
    ///
    /// # Errors
    ///
    /// See [`StemcellResolver::resolve`].
    pub fn resolve_config(&self, config: &StemcellConfig, path_or_uri: &str) -> Result<StemcellSpec> {
        if !config.is_latest() {
            debug!(name = %config.name, version = %config.version, "using pinned stemcell version");
            return Ok(StemcellSpec::new(
                config.name.clone(),
                config.version.clone(),
                path_or_uri,
            ));
        }

        let archive = local_archive(path_or_uri)?;
        let manifest = self.inspect_archive(&archive)?;
        info!(
            name = %manifest.name,
            version = %manifest.version,
            "resolved latest stemcell from {}",
            archive.display()
        );

        Ok(StemcellSpec::new(manifest.name, manifest.version, path_or_uri))
    }

    /// Read the manifest out of a local stemcell archive.
    ///
    /// # Errors
    ///
    /// Returns an extraction error if the manifest entry cannot be pulled
    /// out, or a parse/configuration error if it is malformed.
    pub fn inspect_archive(&self, archive: &Path) -> Result<StemcellManifest> {
        let scratch = self.scratch_dir()?;
        let entry = &self.options.manifest_entry;

        let path = self
            .extractor
            .extract(archive, entry, scratch.path())
            .map_err(|source| ResolveError::Extract {
                archive: archive.to_path_buf(),
                entry: entry.clone(),
                source,
            })?;
        let manifest = StemcellManifest::from_path(&path)?;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(err) = scratch.close() {
            warn!("failed to remove scratch directory {}: {err}", scratch_path.display());
        }

        Ok(manifest)
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.options.temp_prefix);

        let dir = match &self.options.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(ResolveError::ScratchDir)?;

        debug!("created scratch directory {}", dir.path().display());
        Ok(dir)
    }
}

/// Resolve with a default [`StemcellResolver`].
///
/// # Errors
///
/// See [`StemcellResolver::resolve`].
pub fn resolve(config_path: impl AsRef<Path>, path_or_uri: &str) -> Result<StemcellSpec> {
    StemcellResolver::new().resolve(config_path.as_ref(), path_or_uri)
}

/// Map a `latest` stemcell location to an existing local file.
///
/// `file://` URIs are accepted when their host is empty or `localhost`, and
/// their path is percent-decoded. Any other scheme or host is rejected since
/// the archive has to be opened to read its manifest.
fn local_archive(path_or_uri: &str) -> Result<PathBuf> {
    let rejected = |reason| ResolveError::LocalStemcellRequired {
        path_or_uri: path_or_uri.to_string(),
        reason,
    };

    let path = if let Some(rest) = path_or_uri.strip_prefix("file://") {
        file_uri_path(rest).ok_or_else(|| rejected("file URI must name a local path"))?
    } else if has_scheme(path_or_uri) {
        return Err(rejected("remote stemcells cannot be inspected"));
    } else {
        PathBuf::from(path_or_uri)
    };

    if !path.is_file() {
        return Err(rejected("file does not exist"));
    }

    Ok(path)
}

/// The local path named by the part of a `file://` URI after the scheme.
fn file_uri_path(rest: &str) -> Option<PathBuf> {
    let path = match rest.strip_prefix("localhost") {
        Some(path) if path.starts_with('/') => path,
        _ if rest.starts_with('/') => rest,
        _ => return None,
    };

    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    Some(PathBuf::from(decoded.as_ref()))
}

/// Whether `s` starts with a URI scheme such as `https://`.
fn has_scheme(s: &str) -> bool {
    let Some((scheme, _)) = s.split_once("://") else {
        return false;
    };

    scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::extract::ExtractError;
    use crate::testutil::{write_config, write_stemcell};
    use std::cell::Cell;

    /// Extractor that writes a canned manifest and counts calls.
    struct FakeExtractor {
        manifest: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl FakeExtractor {
        fn returning(manifest: &'static str) -> Self {
            Self {
                manifest: Some(manifest),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                manifest: None,
                calls: Cell::new(0),
            }
        }
    }

    impl ArchiveExtractor for FakeExtractor {
        fn extract(
            &self,
            _archive: &Path,
            entry: &str,
            dest: &Path,
        ) -> std::result::Result<PathBuf, ExtractError> {
            self.calls.set(self.calls.get() + 1);
            let manifest = self
                .manifest
                .ok_or_else(|| ExtractError::EntryNotFound(entry.to_string()))?;
            let path = dest.join(entry);
            std::fs::write(&path, manifest)?;
            Ok(path)
        }
    }

    fn config(name: &str, version: &str) -> StemcellConfig {
        StemcellConfig {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    fn scratch_entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[test]
    fn pinned_version_skips_the_archive() {
        let fake = FakeExtractor::failing();
        let resolver = StemcellResolver::with_extractor(&fake);

        let stemcell = resolver
            .resolve_config(&config("bosh-stemcell", "3000"), "/does/not/exist.tgz")
            .unwrap();

        assert_eq!(stemcell.name(), "bosh-stemcell");
        assert_eq!(stemcell.version(), "3000");
        assert_eq!(stemcell.source(), "/does/not/exist.tgz");
        assert_eq!(stemcell.canonical(), "bosh-stemcell-3000");
        assert_eq!(fake.calls.get(), 0);
    }

    #[test]
    fn latest_requires_existing_file() {
        let fake = FakeExtractor::returning("name: x\nversion: 1\n");
        let resolver = StemcellResolver::with_extractor(&fake);

        let err = resolver
            .resolve_config(&config("bosh-stemcell", "latest"), "/does/not/exist.tgz")
            .unwrap_err();

        assert!(matches!(err, ResolveError::LocalStemcellRequired { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(fake.calls.get(), 0);
    }

    #[test]
    fn latest_rejects_remote_uri() {
        let resolver = StemcellResolver::with_extractor(FakeExtractor::failing());
        let err = resolver
            .resolve_config(
                &config("bosh-stemcell", "latest"),
                "https://example.com/stemcell.tgz",
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::LocalStemcellRequired {
                reason: "remote stemcells cannot be inspected",
                ..
            }
        ));
    }

    #[test]
    fn latest_reads_manifest_through_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("stemcell.tgz");
        std::fs::write(&archive, b"opaque").unwrap();

        let fake = FakeExtractor::returning("name: ubuntu-stemcell\nversion: 250\n");
        let resolver = StemcellResolver::with_extractor(&fake);
        let source = archive.to_str().unwrap();

        let stemcell = resolver
            .resolve_config(&config("ignored", "latest"), source)
            .unwrap();

        assert_eq!(stemcell.canonical(), "ubuntu-stemcell-250");
        assert_eq!(stemcell.source(), source);
        assert_eq!(fake.calls.get(), 1);
    }

    #[test]
    fn file_uri_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("stemcell.tgz");
        write_stemcell(&archive, "ubuntu-stemcell", "250").unwrap();

        let uri = format!("file://{}", archive.display());
        let stemcell = StemcellResolver::new()
            .resolve_config(&config("ignored", "latest"), &uri)
            .unwrap();

        assert_eq!(stemcell.canonical(), "ubuntu-stemcell-250");
        assert_eq!(stemcell.source(), uri);
    }

    #[test]
    fn file_uri_with_localhost_and_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("my stemcell.tgz");
        write_stemcell(&archive, "ubuntu-stemcell", "250").unwrap();

        let escaped = archive.to_str().unwrap().replace(' ', "%20");
        for uri in [format!("file://{escaped}"), format!("file://localhost{escaped}")] {
            let stemcell = StemcellResolver::new()
                .resolve_config(&config("ignored", "latest"), &uri)
                .unwrap();
            assert_eq!(stemcell.canonical(), "ubuntu-stemcell-250");
            assert_eq!(stemcell.source(), uri);
        }
    }

    #[test]
    fn file_uri_with_remote_host_is_rejected() {
        let resolver = StemcellResolver::with_extractor(FakeExtractor::failing());
        let err = resolver
            .resolve_config(
                &config("bosh-stemcell", "latest"),
                "file://fileserver/tmp/stemcell.tgz",
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::LocalStemcellRequired {
                reason: "file URI must name a local path",
                ..
            }
        ));
    }

    #[test]
    fn file_uri_paths() {
        assert_eq!(file_uri_path("/tmp/a.tgz"), Some(PathBuf::from("/tmp/a.tgz")));
        assert_eq!(
            file_uri_path("localhost/tmp/a.tgz"),
            Some(PathBuf::from("/tmp/a.tgz"))
        );
        assert_eq!(
            file_uri_path("/tmp/a%20b.tgz"),
            Some(PathBuf::from("/tmp/a b.tgz"))
        );
        assert_eq!(file_uri_path("host/tmp/a.tgz"), None);
        assert_eq!(file_uri_path("localhostile/a.tgz"), None);
        assert_eq!(file_uri_path("/tmp/%FF.tgz"), None);
    }

    #[test]
    fn scratch_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let archive = dir.path().join("stemcell.tgz");
        write_stemcell(&archive, "ubuntu-stemcell", "250").unwrap();

        let resolver =
            StemcellResolver::new().with_options(ResolverOptions::default().temp_root(root.path()));
        resolver.inspect_archive(&archive).unwrap();

        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[test]
    fn scratch_removed_after_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let archive = dir.path().join("stemcell.tgz");
        std::fs::write(&archive, b"opaque").unwrap();

        let resolver = StemcellResolver::with_extractor(FakeExtractor::failing())
            .with_options(ResolverOptions::default().temp_root(root.path()));
        let err = resolver.inspect_archive(&archive).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ArchiveExtraction);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[test]
    fn scratch_removed_after_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let archive = dir.path().join("stemcell.tgz");
        std::fs::write(&archive, b"opaque").unwrap();

        let resolver = StemcellResolver::with_extractor(FakeExtractor::returning("name: ["))
            .with_options(ResolverOptions::default().temp_root(root.path()));
        let err = resolver.inspect_archive(&archive).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[test]
    fn scratch_removed_on_panic() {
        struct Panicking;

        impl ArchiveExtractor for Panicking {
            fn extract(
                &self,
                _archive: &Path,
                _entry: &str,
                _dest: &Path,
            ) -> std::result::Result<PathBuf, ExtractError> {
                panic!("extractor blew up");
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let archive = dir.path().join("stemcell.tgz");
        std::fs::write(&archive, b"opaque").unwrap();

        let resolver = StemcellResolver::with_extractor(Panicking)
            .with_options(ResolverOptions::default().temp_root(root.path()));
        let result = std::panic::catch_unwind(|| resolver.inspect_archive(&archive));

        assert!(result.is_err());
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[test]
    fn scratch_uses_prefix() {
        struct Recording(std::cell::RefCell<Option<PathBuf>>);

        impl ArchiveExtractor for Recording {
            fn extract(
                &self,
                _archive: &Path,
                entry: &str,
                dest: &Path,
            ) -> std::result::Result<PathBuf, ExtractError> {
                *self.0.borrow_mut() = Some(dest.to_path_buf());
                let path = dest.join(entry);
                std::fs::write(&path, "name: a\nversion: b\n")?;
                Ok(path)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("stemcell.tgz");
        std::fs::write(&archive, b"opaque").unwrap();

        let recording = Recording(std::cell::RefCell::new(None));
        let resolver = StemcellResolver::with_extractor(&recording)
            .with_options(ResolverOptions::default().temp_prefix("bat-"));
        resolver.inspect_archive(&archive).unwrap();

        let used = recording.0.borrow().clone().unwrap();
        let name = used.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("bat-"));
        assert!(!used.exists());
    }

    #[test]
    fn custom_manifest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("stemcell.tgz");
        crate::testutil::write_archive(&archive, &[("meta.yml", "name: custom\nversion: 7\n")])
            .unwrap();

        let resolver =
            StemcellResolver::new().with_options(ResolverOptions::default().manifest_entry("meta.yml"));
        let manifest = resolver.inspect_archive(&archive).unwrap();
        assert_eq!(manifest.name, "custom");
        assert_eq!(manifest.version, "7");
    }

    #[test]
    fn resolve_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bat.yml");
        write_config(&config_path, "bosh-stemcell", "3000").unwrap();

        let stemcell = resolve(&config_path, "anything").unwrap();
        assert_eq!(stemcell.canonical(), "bosh-stemcell-3000");
    }

    #[test]
    fn scheme_detection() {
        assert!(has_scheme("https://example.com/a.tgz"));
        assert!(has_scheme("s3+http://bucket/a.tgz"));
        assert!(!has_scheme("/tmp/a.tgz"));
        assert!(!has_scheme("relative/a.tgz"));
        assert!(!has_scheme("://nothing"));
        assert!(!has_scheme("1http://x"));
    }
}
