//! Test utilities for building stemcell fixtures on disk.

use crate::manifest::MANIFEST_ENTRY;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::Path;

/// Write a gzip-compressed tarball containing the given `(name, contents)` entries.
///
/// Names are stored exactly as given, so `./stemcell.MF` keeps its prefix
/// the way archives built with `tar czf x.tgz .` do.
///
/// # Errors
/// Returns error if the file cannot be created or written, or a name does
/// not fit the 100-byte tar name field
pub fn write_archive(path: &Path, entries: &[(&str, &str)]) -> io::Result<()> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        let raw = name.as_bytes();
        let field = &mut header.as_old_mut().name;
        if raw.len() >= field.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("entry name too long: {name}"),
            ));
        }
        field[..raw.len()].copy_from_slice(raw);

        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, contents.as_bytes())?;
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

/// Write a stemcell tarball whose `stemcell.MF` declares `name` and `version`,
/// alongside a dummy image file.
///
/// # Errors
/// Returns error if the file cannot be created or written
pub fn write_stemcell(path: &Path, name: &str, version: &str) -> io::Result<()> {
    let manifest = format!("---\nname: {name}\nversion: '{version}'\nbosh_protocol: 1\n");
    write_archive(path, &[("image", "not really a disk image"), (MANIFEST_ENTRY, &manifest)])
}

/// Write an acceptance-test config file declaring the given stemcell.
///
/// # Errors
/// Returns error if the file cannot be written
pub fn write_config(path: &Path, name: &str, version: &str) -> io::Result<()> {
    let config = format!(
        "---\ncpi: aws\nproperties:\n  pool_size: 1\n  stemcell:\n    name: {name}\n    version: '{version}'\n"
    );
    std::fs::write(path, config)
}
