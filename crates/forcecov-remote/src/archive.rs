//! Deploy archive packaging
//!
//! Zips a source directory with every entry rooted at the directory's own
//! name, so `project/src/classes/A.cls` becomes `src/classes/A.cls`.

use forcecov_core::PlatformError;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn archive_err(err: impl std::fmt::Display) -> PlatformError {
    PlatformError::Archive(err.to_string())
}

/// Zip `source_dir` into memory
///
/// Entries are sorted so the same tree always yields the same archive layout.
///
/// # Errors
/// - `PlatformError::Io` if the tree cannot be read
/// - `PlatformError::Archive` if the directory has no usable name or zipping fails
pub fn package_directory(source_dir: &Path) -> Result<Vec<u8>, PlatformError> {
    let root = source_dir
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| archive_err(format!("cannot name archive root for {}", source_dir.display())))?;
    if !source_dir.is_dir() {
        return Err(archive_err(format!("{} is not a directory", source_dir.display())));
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut files = 0usize;
    add_tree(&mut writer, source_dir, root, options, &mut files)?;

    let cursor = writer.finish().map_err(archive_err)?;
    let bytes = cursor.into_inner();
    tracing::debug!(files, bytes = bytes.len(), "Packaged {}", source_dir.display());
    Ok(bytes)
}

fn add_tree(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
    files: &mut usize,
) -> Result<(), PlatformError> {
    writer
        .add_directory(format!("{prefix}/"), options)
        .map_err(archive_err)?;

    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!("Skipping non UTF-8 path {}", path.display());
            continue;
        };
        let entry_name = format!("{prefix}/{name}");
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            add_tree(writer, &path, &entry_name, options, files)?;
        } else if file_type.is_file() {
            writer.start_file(entry_name, options).map_err(archive_err)?;
            writer.write_all(&fs::read(&path)?)?;
            *files += 1;
        }
    }
    Ok(())
}
