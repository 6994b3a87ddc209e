//! Test configuration helpers for creating downloaders against a mock provider

use comic_dl::config::RetryConfig;
use comic_dl::{ComicDownloader, Config};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

/// Config with every path under `root` and the provider at `server`
pub fn test_config(root: &Path, server: &MockServer) -> Config {
    let mut config = Config::default();
    config.cache.database_path = root.join("comic-dl.db");
    config.cache.download_dir = root.join("download");
    config.cache.temp_dir = root.join("temp");
    config.source.base_url = format!("{}/api", server.uri())
        .parse()
        .expect("mock server URI is a valid URL");
    config.fetch.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Create a ComicDownloader talking to `server` over HTTP
///
/// Returns the downloader and temp directory (keep temp_dir alive for test duration)
pub async fn create_test_downloader(server: &MockServer) -> (ComicDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = test_config(temp_dir.path(), server);
    let downloader = create_downloader_with_config(config).await;
    (downloader, temp_dir)
}

/// Create a ComicDownloader from a prepared config
pub async fn create_downloader_with_config(config: Config) -> ComicDownloader {
    ComicDownloader::with_http_source(config)
        .await
        .expect("failed to create downloader")
}
