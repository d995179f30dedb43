//! Session directory archiving for fake-replay export.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::write::FileOptions;

/// Zip every file under `src` into a single archive at `dest`.
///
/// Entry names are relative to `src`. If `dest` happens to live inside
/// `src` it is excluded from itself.
pub fn archive_dir(src: &Path, dest: &Path) -> Result<()> {
    let out_file = fs::File::create(dest)
        .with_context(|| format!("Failed to create archive: {:?}", dest))?;
    let mut zip = zip::ZipWriter::new(out_file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || path == dest {
            continue;
        }

        let name = path
            .strip_prefix(src)
            .with_context(|| format!("Entry {:?} escapes archive root", path))?
            .to_string_lossy()
            .into_owned();

        zip.start_file(name, options)
            .with_context(|| format!("Failed to add {:?} to archive", path))?;
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read {:?} for archiving", path))?;
        zip.write_all(&bytes)?;
    }

    zip.finish().context("Failed to finalize archive")?;
    Ok(())
}
