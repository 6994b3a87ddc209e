//! Utility functions for content directories and file ordering

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Sequence number embedded in a content filename
///
/// Providers write pages as `00001.jpg`, `00002.jpg`, ... and sometimes prefix them
/// (`page_12.webp`). The last run of ASCII digits in the file stem is the sequence.
///
/// # Examples
///
/// ```
/// use comic_dl::utils::sequence_number;
/// use std::path::Path;
///
/// assert_eq!(sequence_number(Path::new("00012.jpg")), Some(12));
/// assert_eq!(sequence_number(Path::new("page_3.webp")), Some(3));
/// assert_eq!(sequence_number(Path::new("cover.jpg")), None);
/// ```
pub fn sequence_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let end = stem.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = stem[..end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    stem[start..end].parse().ok()
}

/// Sort paths by embedded sequence number, ascending
///
/// Files without a sequence number sort after numbered ones, by name.
pub fn sort_by_sequence(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| {
        let key_a = (sequence_number(a).is_none(), sequence_number(a), a.file_name());
        let key_b = (sequence_number(b).is_none(), sequence_number(b), b.file_name());
        key_a.cmp(&key_b)
    });
}

/// List the regular files in a content directory, ordered by sequence number
///
/// Hidden files (leading `.`) and partially written files (`.part`) are skipped.
pub async fn list_content_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::storage(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::storage(dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| Error::storage(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        let partial = path.extension().is_some_and(|ext| ext == "part");
        if hidden || partial {
            continue;
        }
        files.push(path);
    }

    sort_by_sequence(&mut files);
    Ok(files)
}

/// Total size in bytes of the given files
pub async fn total_file_size(files: &[PathBuf]) -> Result<u64> {
    let mut total = 0u64;
    for file in files {
        let metadata = tokio::fs::metadata(file)
            .await
            .map_err(|e| Error::storage(file, e))?;
        total += metadata.len();
    }
    Ok(total)
}

/// Remove a directory tree, treating "already gone" as success
pub async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::storage(dir, e)),
    }
}
