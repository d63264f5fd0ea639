//! Pulling a single entry out of a stemcell archive.
//!
//! Resolution only ever needs the manifest, so extractors copy one named
//! entry into a destination directory and report where it landed.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while extracting an archive entry.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("entry '{0}' not found in archive")]
    EntryNotFound(String),

    #[error("entry name '{0}' must be a relative path without '..'")]
    InvalidEntry(String),

    #[error("failed to run {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{program:?} exited with {status}: {stderr}")]
    CommandFailed {
        program: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
}

/// Capability to copy one named entry out of a gzip-compressed tarball.
pub trait ArchiveExtractor {
    /// Extract `entry` from `archive` into `dest`, returning the written file's path.
    ///
    /// # Errors
    ///
    /// Fails if the archive is unreadable or corrupt, or has no such entry.
    fn extract(&self, archive: &Path, entry: &str, dest: &Path) -> Result<PathBuf, ExtractError>;
}

impl<T: ArchiveExtractor + ?Sized> ArchiveExtractor for &T {
    fn extract(&self, archive: &Path, entry: &str, dest: &Path) -> Result<PathBuf, ExtractError> {
        (**self).extract(archive, entry, dest)
    }
}

impl<T: ArchiveExtractor + ?Sized> ArchiveExtractor for Box<T> {
    fn extract(&self, archive: &Path, entry: &str, dest: &Path) -> Result<PathBuf, ExtractError> {
        (**self).extract(archive, entry, dest)
    }
}

/// Where `entry` is written inside `dest`: its full relative path, minus
/// any `.` components. Both extractors agree on this location.
fn destination(entry: &str, dest: &Path) -> Result<PathBuf, ExtractError> {
    let relative = normalize(Path::new(entry));
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if relative.as_os_str().is_empty() || !plain {
        return Err(ExtractError::InvalidEntry(entry.to_string()));
    }
    Ok(dest.join(relative))
}

/// Drop `.` components so `./stemcell.MF` matches `stemcell.MF`.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// In-process extractor built on `flate2` and `tar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, archive: &Path, entry: &str, dest: &Path) -> Result<PathBuf, ExtractError> {
        let wanted = normalize(Path::new(entry));
        let target = destination(entry, dest)?;

        let file = File::open(archive)?;
        let mut tarball = tar::Archive::new(GzDecoder::new(file));

        for item in tarball.entries()? {
            let mut item = item?;
            if !item.header().entry_type().is_file() || normalize(&item.path()?) != wanted {
                continue;
            }

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            let written = io::copy(&mut item, &mut out)?;
            debug!(entry, bytes = written, "extracted {}", target.display());
            return Ok(target);
        }

        Err(ExtractError::EntryNotFound(entry.to_string()))
    }
}

/// Extractor that shells out to a `tar` binary.
///
/// Lists the archive with `tar tzf` to find the stored name of `entry`
/// (which may carry a `./` prefix), then runs
/// `tar xzf <archive> -C <dest> <member>`. Arguments are passed directly,
/// never through a shell.
#[derive(Debug, Clone)]
pub struct TarCommand {
    program: PathBuf,
}

impl TarCommand {
    /// Use a specific `tar` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The executable that will be spawned.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, command: &mut Command) -> Result<String, ExtractError> {
        let output = command.output().map_err(|source| ExtractError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ExtractError::CommandFailed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TarCommand {
    fn default() -> Self {
        Self::new("tar")
    }
}

impl ArchiveExtractor for TarCommand {
    fn extract(&self, archive: &Path, entry: &str, dest: &Path) -> Result<PathBuf, ExtractError> {
        let wanted = normalize(Path::new(entry));
        let target = destination(entry, dest)?;

        debug!(program = %self.program.display(), archive = %archive.display(), entry, "listing archive");
        let listing = self.run(Command::new(&self.program).arg("tzf").arg(archive))?;
        let member = listing
            .lines()
            .find(|line| normalize(Path::new(line)) == wanted)
            .ok_or_else(|| ExtractError::EntryNotFound(entry.to_string()))?;

        self.run(
            Command::new(&self.program)
                .arg("xzf")
                .arg(archive)
                .arg("-C")
                .arg(dest)
                .arg(member),
        )?;

        if !target.is_file() {
            return Err(ExtractError::EntryNotFound(entry.to_string()));
        }

        Ok(target)
    }
}
