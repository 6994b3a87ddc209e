//! Content requests, part selection and purge.

use crate::delivery::{Consumer, DeliveryReport};
use crate::error::{Error, Result};
use crate::eviction::EvictionReport;
use crate::fetch::Resolved;
use crate::session::{Nav, PageView};
use crate::types::{ChatId, ContentId, ContentRecord, Event, FetchedContent, UserId};
use std::sync::atomic::Ordering;

use super::ComicDownloader;

/// What a request turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Files were fetched (or served from cache) and handed to the consumer
    Delivered {
        /// Cache record of the delivered content
        record: ContentRecord,
        /// Whether the files came from the cache
        cache_hit: bool,
        /// Per-batch delivery results
        report: DeliveryReport,
    },
    /// The album has several parts; the user must pick one
    Selection(PageView),
}

impl ComicDownloader {
    /// Handle a user's request for `id` in `chat`
    ///
    /// Cached content is delivered right away. Otherwise the provider is asked for
    /// the album's detail once: a multi-part album opens a selection session for
    /// `user` and returns its first page, anything else is fetched and delivered.
    pub async fn request(
        &self,
        chat: ChatId,
        user: UserId,
        id: ContentId,
        consumer: &dyn Consumer,
    ) -> Result<RequestOutcome> {
        self.ensure_accepting()?;

        match self.fetcher.resolve(id).await? {
            Resolved::Content(content) => Ok(self.deliver(chat, content, consumer).await),
            Resolved::Parts(detail) => {
                let parts = detail.parts.len();
                let view = self.sessions.open(user, id, detail);
                tracing::info!(user = %user, content_id = %id, parts, "Opened selection session");
                self.emit_event(Event::SessionOpened { user, id, parts });
                Ok(RequestOutcome::Selection(view))
            }
        }
    }

    /// Page through `owner`'s selection on behalf of `initiator`
    pub fn navigate(&self, owner: UserId, initiator: UserId, nav: Nav) -> Result<PageView> {
        self.ensure_accepting()?;
        self.sessions.navigate(owner, initiator, nav)
    }

    /// Pick `part` from `owner`'s selection and deliver it to `chat`
    pub async fn select(
        &self,
        chat: ChatId,
        owner: UserId,
        initiator: UserId,
        part: ContentId,
        consumer: &dyn Consumer,
    ) -> Result<RequestOutcome> {
        self.ensure_accepting()?;
        let part = self.sessions.select(owner, initiator, part)?;
        tracing::debug!(user = %owner, part = %part.id, label = %part.label, "Part selected");
        let content = self.fetcher.fetch_content(part.id).await?;
        Ok(self.deliver(chat, content, consumer).await)
    }

    /// Remove `id` from the cache now
    pub async fn purge(&self, id: ContentId) -> Result<bool> {
        self.ensure_accepting()?;
        self.eviction.purge(id).await
    }

    /// Run one eviction pass immediately
    pub async fn run_eviction(&self) -> Result<EvictionReport> {
        self.eviction.run_pass().await
    }

    async fn deliver(
        &self,
        chat: ChatId,
        content: FetchedContent,
        consumer: &dyn Consumer,
    ) -> RequestOutcome {
        let report = self.delivery.deliver_content(consumer, chat, &content).await;

        if !report.is_complete() {
            tracing::warn!(
                chat = %chat,
                content_id = %content.record.id,
                failed = report.batches.len() - report.delivered_batches(),
                "Delivery incomplete"
            );
        }

        RequestOutcome::Delivered {
            record: content.record,
            cache_hit: content.cache_hit,
            report,
        }
    }

    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}
