//! JSON-over-HTTP provider.
//!
//! `GET {base_url}/album/{id}` returns the album:
//!
//! ```json
//! {"name": "...", "episodes": [{"id": "350234", "index": 1, "title": "..."}], "images": ["https://..."]}
//! ```
//!
//! The image list travels in [`ContentDetail::pages`], so fetching an album costs
//! one album request plus its images, downloaded to `{dir}/{seq:05}.{ext}`.

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::types::{ContentDetail, ContentId, Part};
use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::ContentSource;

/// Per-request timeout; the coordinator applies its own overall fetch timeout on top
const REQUEST_TIMEOUT_SECS: u64 = 60;

const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Deserialize)]
struct AlbumResponse {
    name: String,
    #[serde(default)]
    episodes: Vec<EpisodeResponse>,
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeResponse {
    id: RawId,
    index: u32,
    #[serde(default)]
    title: String,
}

/// Providers send ids either as JSON numbers or as strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn parse(&self) -> Option<ContentId> {
        match self {
            RawId::Number(n) => Some(ContentId(*n)),
            RawId::Text(s) => s.parse().ok(),
        }
    }
}

/// [`ContentSource`] backed by a JSON HTTP API
pub struct HttpContentSource {
    client: reqwest::Client,
    base_url: Url,
    image_concurrency: usize,
}

impl HttpContentSource {
    /// Build a session from the source settings
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        // Url::join drops the last segment unless the base ends with a slash
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            image_concurrency: config.image_concurrency.max(1),
        })
    }

    async fn album(&self, id: ContentId) -> Result<AlbumResponse> {
        let url = self
            .base_url
            .join(&format!("album/{}", id))
            .map_err(|e| Error::Other(format!("Invalid album URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(id, e))?;
        check_status(id, response.status())?;

        response.json().await.map_err(|e| request_error(id, e))
    }

    async fn download_image(&self, id: ContentId, seq: usize, raw_url: &str, dir: &Path) -> Result<()> {
        let url = self
            .base_url
            .join(raw_url)
            .map_err(|e| Error::Fetch {
                id,
                reason: format!("invalid image URL '{}': {}", raw_url, e),
            })?;
        let target = dir.join(format!("{:05}.{}", seq, image_extension(&url)));
        let partial = target.with_extension("part");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(id, e))?;
        // A missing page is not a missing album
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::Fetch {
                id,
                reason: format!("image {} not found", seq),
            });
        }
        check_status(id, response.status())?;

        let bytes = response.bytes().await.map_err(|e| request_error(id, e))?;
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(|e| Error::storage(&partial, e))?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| Error::storage(&target, e))?;

        tracing::trace!(content_id = %id, seq, bytes = bytes.len(), "Image downloaded");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContentSource for HttpContentSource {
    async fn get_detail(&self, id: ContentId) -> Result<ContentDetail> {
        let album = self.album(id).await?;

        let parts = album
            .episodes
            .iter()
            .filter_map(|episode| {
                let Some(part_id) = episode.id.parse() else {
                    tracing::warn!(content_id = %id, raw = ?episode.id, "Skipping episode with invalid id");
                    return None;
                };
                Some(Part {
                    id: part_id,
                    label: part_label(episode.index, &episode.title),
                })
            })
            .collect();

        Ok(ContentDetail {
            display_name: album.name,
            parts,
            pages: album.images,
        })
    }

    async fn fetch_files(&self, id: ContentId, detail: &ContentDetail, dir: &Path) -> Result<usize> {
        let downloads: Vec<_> = detail
            .pages
            .iter()
            .enumerate()
            .map(|(i, url)| self.download_image(id, i + 1, url, dir))
            .collect();
        futures::stream::iter(downloads)
            .buffer_unordered(self.image_concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        tracing::debug!(content_id = %id, files = detail.pages.len(), "Album images downloaded");
        Ok(detail.pages.len())
    }
}

/// Chapter label: sort index, then title when the provider has one
fn part_label(index: u32, title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        index.to_string()
    } else {
        format!("{} {}", index, title)
    }
}

/// File extension of the last URL path segment, or `jpg`
fn image_extension(url: &Url) -> &str {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(DEFAULT_EXTENSION)
}

fn check_status(id: ContentId, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(Error::Fetch {
            id,
            reason: format!("provider returned {}", status),
        })
    } else {
        // 404 and the other client errors: unknown id or no permission to view it
        Err(Error::NotFound { id })
    }
}

/// Transport failures, including a connection dropped mid-body, are transient;
/// an undecodable response is not
fn request_error(id: ContentId, e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        Error::Fetch {
            id,
            reason: e.to_string(),
        }
    } else {
        Error::Network(e)
    }
}
