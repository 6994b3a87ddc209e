//! Shared test helpers for creating ComicDownloader instances in tests.

use crate::config::Config;
use crate::downloader::ComicDownloader;
use crate::source::ContentSource;
use crate::test_helpers::{MockSource, test_fetch_config};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Config with every path inside `root` and fast retries
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.cache.database_path = root.join("test.db");
    config.cache.download_dir = root.join("download");
    config.cache.temp_dir = root.join("temp");
    config.fetch = test_fetch_config();
    config
}

/// Helper to create a test ComicDownloader backed by `source`.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    source: Arc<MockSource>,
) -> (ComicDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let downloader = create_test_downloader_with_config(source, config).await;
    (downloader, temp_dir)
}

/// Helper to create a test ComicDownloader with a caller-tuned config
pub(crate) async fn create_test_downloader_with_config(
    source: Arc<MockSource>,
    config: Config,
) -> ComicDownloader {
    ComicDownloader::new(
        config,
        Box::new(move || Ok(source.clone() as Arc<dyn ContentSource>)),
    )
    .await
    .unwrap()
}
