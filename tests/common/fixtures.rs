//! Mock provider albums and a recording chat consumer

use comic_dl::{ChatId, Consumer, DeliveryError};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bytes served for every image
pub const PAGE_BYTES: usize = 2048;

/// Path of page `page` (1-based) of album `id` on the mock provider
pub fn image_path(id: u64, page: usize) -> String {
    format!("/img/{}/{}.jpg", id, page)
}

/// Serve album `id` with `pages` images, each delayed by `image_delay`
pub async fn mount_album(server: &MockServer, id: u64, name: &str, pages: usize, image_delay: Duration) {
    let images: Vec<String> = (1..=pages)
        .map(|page| format!("{}{}", server.uri(), image_path(id, page)))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/api/album/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": name,
            "episodes": [{"id": id.to_string(), "index": 1, "title": ""}],
            "images": images,
        })))
        .mount(server)
        .await;

    for page in 1..=pages {
        Mock::given(method("GET"))
            .and(path(image_path(id, page)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![page as u8; PAGE_BYTES])
                    .set_delay(image_delay),
            )
            .mount(server)
            .await;
    }
}

/// Serve a multi-chapter album whose chapters are albums of `pages` images
pub async fn mount_series(server: &MockServer, id: u64, name: &str, chapters: &[u64], pages: usize) {
    let episodes: Vec<serde_json::Value> = chapters
        .iter()
        .enumerate()
        .map(|(i, chapter)| {
            serde_json::json!({"id": chapter, "index": i + 1, "title": format!("Chapter {}", i + 1)})
        })
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/api/album/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": name,
            "episodes": episodes,
            "images": [],
        })))
        .mount(server)
        .await;

    for (i, chapter) in chapters.iter().enumerate() {
        mount_album(server, *chapter, &format!("{} {}", name, i + 1), pages, Duration::ZERO).await;
    }
}

/// Number of requests the provider received for `request_path`
pub async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}

/// What the consumer was asked to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upload {
    Preview { file: PathBuf, caption: String },
    Batch(Vec<PathBuf>),
    Document(PathBuf),
}

/// Consumer that keeps every upload in memory
#[derive(Default)]
pub struct RecordingBot {
    uploads: Mutex<Vec<(ChatId, Upload)>>,
}

impl RecordingBot {
    pub fn uploads(&self) -> Vec<(ChatId, Upload)> {
        self.uploads.lock().unwrap().clone()
    }

    /// Files of every batch, flattened in arrival order
    pub fn batch_files(&self) -> Vec<PathBuf> {
        self.uploads()
            .into_iter()
            .filter_map(|(_, upload)| match upload {
                Upload::Batch(files) => Some(files),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn push(&self, chat: ChatId, upload: Upload) {
        self.uploads.lock().unwrap().push((chat, upload));
    }
}

#[async_trait::async_trait]
impl Consumer for RecordingBot {
    async fn send_preview(&self, chat: ChatId, file: &Path, caption: &str) -> Result<(), DeliveryError> {
        self.push(
            chat,
            Upload::Preview {
                file: file.to_path_buf(),
                caption: caption.to_string(),
            },
        );
        Ok(())
    }

    async fn send_batch(&self, chat: ChatId, files: &[PathBuf]) -> Result<(), DeliveryError> {
        self.push(chat, Upload::Batch(files.to_vec()));
        Ok(())
    }

    async fn send_document(&self, chat: ChatId, file: &Path, _caption: &str) -> Result<(), DeliveryError> {
        self.push(chat, Upload::Document(file.to_path_buf()));
        Ok(())
    }
}
