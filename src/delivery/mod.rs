//! Batched delivery to a chat consumer
//!
//! A file list is split into fixed-size [`Batch`]es which are uploaded with
//! bounded concurrency. Every batch is one atomic [`Consumer::send_batch`] call and
//! fails on its own: siblings keep going and the [`DeliveryReport`] carries one
//! [`BatchOutcome`] per batch, in batch order.
//!
//! Large deliveries additionally get a zip archive (see [`DeliveryConfig`]), sent
//! as a document when it fits under both the configured and the consumer's size
//! limit.

use crate::config::DeliveryConfig;
use crate::error::DeliveryError;
use crate::types::{ChatId, Event, FetchedContent};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

mod archive;

/// Receiving side of a delivery (the chat front-end)
#[async_trait::async_trait]
pub trait Consumer: Send + Sync {
    /// Send a single file with a caption (cover message)
    async fn send_preview(&self, chat: ChatId, file: &Path, caption: &str) -> Result<(), DeliveryError>;

    /// Send a group of files as one message
    async fn send_batch(&self, chat: ChatId, files: &[PathBuf]) -> Result<(), DeliveryError>;

    /// Send a file as a document attachment
    async fn send_document(&self, chat: ChatId, file: &Path, caption: &str) -> Result<(), DeliveryError>;

    /// Largest document the consumer accepts
    fn max_document_bytes(&self) -> u64 {
        u64::MAX
    }
}

/// Ordered slice of a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    /// Zero-based position in the delivery
    pub index: usize,
    /// Files in send order
    pub files: &'a [PathBuf],
}

/// Split `files` into batches of at most `batch_size`, preserving order
pub fn make_batches(files: &[PathBuf], batch_size: usize) -> Vec<Batch<'_>> {
    files
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, files)| Batch { index, files })
        .collect()
}

/// Result of sending one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Batch index
    pub index: usize,
    /// Files in the batch
    pub size: usize,
    /// Consumer's answer
    pub result: Result<(), DeliveryError>,
}

/// Everything that happened during one delivery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Cover message result, if one was sent
    pub preview: Option<Result<(), DeliveryError>>,
    /// One outcome per batch, in batch order
    pub batches: Vec<BatchOutcome>,
    /// Archive result (its size on success), if one was built
    pub archive: Option<Result<u64, DeliveryError>>,
}

impl DeliveryReport {
    /// Number of batches the consumer accepted
    pub fn delivered_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.result.is_ok()).count()
    }

    /// Batches that were rejected or failed
    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches.iter().filter(|b| b.result.is_err())
    }

    /// True if every batch was delivered
    pub fn is_complete(&self) -> bool {
        self.batches.iter().all(|b| b.result.is_ok())
    }
}

/// Sends file lists to consumers in batches
pub struct DeliveryPipeline {
    config: DeliveryConfig,
    temp_dir: PathBuf,
    event_tx: broadcast::Sender<Event>,
}

impl DeliveryPipeline {
    /// Create a pipeline building archives under `temp_dir`
    pub fn new(config: DeliveryConfig, temp_dir: impl Into<PathBuf>, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            config,
            temp_dir: temp_dir.into(),
            event_tx,
        }
    }

    /// Deliver `files` in batches, plus an archive when the list is large
    pub async fn deliver(&self, consumer: &dyn Consumer, chat: ChatId, files: &[PathBuf]) -> DeliveryReport {
        let batches = self.send_batches(consumer, chat, files).await;
        let archive = self.send_archive(consumer, chat, files, "archive").await;
        DeliveryReport {
            preview: None,
            batches,
            archive,
        }
    }

    /// Deliver fetched content: cover message with the album name, then [`deliver`](Self::deliver)
    pub async fn deliver_content(
        &self,
        consumer: &dyn Consumer,
        chat: ChatId,
        content: &FetchedContent,
    ) -> DeliveryReport {
        let name = &content.record.display_name;

        let preview = match content.files.first() {
            Some(cover) if self.config.send_preview => {
                let result = consumer.send_preview(chat, cover, name).await;
                if let Err(e) = &result {
                    warn!(chat = %chat, content_id = %content.record.id, error = %e, "Preview failed");
                }
                Some(result)
            }
            _ => None,
        };

        let batches = self.send_batches(consumer, chat, &content.files).await;
        let stem = content.record.id.to_string();
        let archive = self.send_archive(consumer, chat, &content.files, &stem).await;

        DeliveryReport {
            preview,
            batches,
            archive,
        }
    }

    async fn send_batches(&self, consumer: &dyn Consumer, chat: ChatId, files: &[PathBuf]) -> Vec<BatchOutcome> {
        let batches = make_batches(files, self.config.batch_size);
        debug!(chat = %chat, files = files.len(), batches = batches.len(), "Delivering");

        // buffered() keeps results in batch order while running `concurrency` at once
        futures::stream::iter(batches)
            .map(|batch| async move {
                let result = consumer.send_batch(chat, batch.files).await;
                match &result {
                    Ok(()) => {
                        self.emit(Event::BatchDelivered {
                            chat,
                            index: batch.index,
                            size: batch.files.len(),
                        });
                    }
                    Err(e) => {
                        error!(chat = %chat, batch_index = batch.index, error = %e, "Batch delivery failed");
                        self.emit(Event::BatchFailed {
                            chat,
                            index: batch.index,
                            error: e.to_string(),
                        });
                    }
                }
                BatchOutcome {
                    index: batch.index,
                    size: batch.files.len(),
                    result,
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    async fn send_archive(
        &self,
        consumer: &dyn Consumer,
        chat: ChatId,
        files: &[PathBuf],
        stem: &str,
    ) -> Option<Result<u64, DeliveryError>> {
        let threshold = self.config.archive_threshold?;
        if files.len() <= threshold {
            return None;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.temp_dir).await {
            return Some(Err(DeliveryError::Failed(format!(
                "cannot create {}: {}",
                self.temp_dir.display(),
                e
            ))));
        }
        // Unique per delivery: the same content may go to the same chat twice at once
        let target = match tempfile::Builder::new()
            .prefix(&format!("{}-{}-", stem, chat))
            .suffix(".zip")
            .tempfile_in(&self.temp_dir)
        {
            Ok(file) => file.into_temp_path(),
            Err(e) => {
                return Some(Err(DeliveryError::Failed(format!(
                    "cannot create archive in {}: {}",
                    self.temp_dir.display(),
                    e
                ))));
            }
        };

        let result = match archive::build_archive(files.to_vec(), target.to_path_buf()).await {
            Ok(size) => {
                let limit = self.config.archive_max_bytes.min(consumer.max_document_bytes());
                if size > limit {
                    warn!(chat = %chat, size, limit, "Archive too large to send");
                    Err(DeliveryError::TooLarge { size, limit })
                } else {
                    let caption = format!("{}.zip", stem);
                    consumer
                        .send_document(chat, &target, &caption)
                        .await
                        .map(|()| size)
                }
            }
            Err(e) => Err(DeliveryError::Failed(e.to_string())),
        };

        if let Err(e) = &result {
            warn!(chat = %chat, error = %e, "Archive not delivered");
        }
        let path = target.to_path_buf();
        if let Err(e) = target.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove archive");
        }
        Some(result)
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
