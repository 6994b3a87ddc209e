//! Zip archive of delivered files.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write `files` into a stored (uncompressed) zip at `target`; returns its size
///
/// Runs on a blocking thread. Images are already compressed, so entries are stored.
pub(crate) async fn build_archive(files: Vec<PathBuf>, target: PathBuf) -> Result<u64> {
    tokio::task::spawn_blocking(move || write_zip(&files, &target))
        .await
        .map_err(|e| Error::Other(format!("archive task failed: {}", e)))?
}

fn write_zip(files: &[PathBuf], target: &Path) -> Result<u64> {
    let file = File::create(target).map_err(|e| Error::storage(target, e))?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(file));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Other(format!("no file name in {}", path.display())))?;
        writer.start_file(name, options).map_err(zip_error)?;
        let mut source = File::open(path).map_err(|e| Error::storage(path, e))?;
        std::io::copy(&mut source, &mut writer).map_err(|e| Error::storage(path, e))?;
    }

    let mut inner = writer.finish().map_err(zip_error)?;
    inner.flush().map_err(|e| Error::storage(target, e))?;
    drop(inner);

    let size = std::fs::metadata(target)
        .map_err(|e| Error::storage(target, e))?
        .len();
    Ok(size)
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::Other(format!("zip error: {}", e))
}
