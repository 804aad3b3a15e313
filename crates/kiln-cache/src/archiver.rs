//! Directory bundles: zstd-compressed tar archives of output directories.

use kiln_core::{Error, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Artifact type of directory bundles.
pub const BUNDLE_TYPE: &str = "tar.zst";

const ZSTD_LEVEL: i32 = 3;

/// Pack the contents of `dir` into `writer`.
pub fn pack_dir<W: Write>(writer: W, dir: &Path) -> Result<()> {
    let mut encoder = zstd::stream::write::Encoder::new(writer, ZSTD_LEVEL)
        .map_err(|e| Error::Archive(format!("Zstd init failed: {}", e)))?;
    {
        let mut builder = tar::Builder::new(&mut encoder);
        builder
            .append_dir_all(".", dir)
            .map_err(|e| Error::Archive(format!("Failed to pack dir {}: {}", dir.display(), e)))?;
        builder
            .finish()
            .map_err(|e| Error::Archive(format!("Failed to finish tar: {}", e)))?;
    }
    encoder
        .finish()
        .map_err(|e| Error::Archive(format!("Zstd finish failed: {}", e)))?;
    Ok(())
}

/// Pack `dir` into a fresh temporary file and return its path. The file is
/// kept on disk so it can be handed to a cache tier.
pub fn pack_dir_to_temp(dir: &Path, name_hint: &str) -> Result<PathBuf> {
    let temp = tempfile::Builder::new()
        .prefix(&format!("kiln-{}-", name_hint))
        .suffix(&format!(".{}", BUNDLE_TYPE))
        .tempfile()?;
    let (file, path) = temp.keep().map_err(|e| Error::Io(e.error))?;
    pack_dir(file, dir)?;
    Ok(path)
}

/// Extract an archive produced by [`pack_dir`] into `dest`.
pub fn unpack<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let decoder = zstd::stream::read::Decoder::new(reader)
        .map_err(|e| Error::Archive(format!("Failed to create decoder: {}", e)))?;
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(dest)
        .map_err(|e| Error::Archive(format!("Failed to unpack archive: {}", e)))?;
    Ok(())
}

/// Replace the contents of `dest` with the bundle at `bundle`.
pub fn restore_bundle(bundle: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        clean_dir(dest)?;
    } else {
        std::fs::create_dir_all(dest)?;
    }
    unpack(File::open(bundle)?, dest)
}

/// Whether `dir` contains at least one file, at any depth.
pub fn has_files(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_type().is_file())
}

/// Remove everything inside `dir`, keeping the directory itself.
fn clean_dir(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
