//! Multi-part selection sessions
//!
//! When a requested album has several chapters, the user gets a paged list to pick
//! from. Each user has at most one [`SelectionSession`]; opening another replaces
//! it. Only the user who opened a session may page through it or pick from it.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::types::{ContentDetail, ContentId, Part, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Just opened, showing the first page
    Listing,
    /// The user has paged at least once
    Navigating,
}

/// Page navigation command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nav {
    /// Go to the first page
    First,
    /// Go back one page (stays on the first page)
    Prev,
    /// Go forward one page (stays on the last page)
    Next,
    /// Go to the last page
    Last,
}

/// One rendered page of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageView {
    /// Session owner
    pub owner: UserId,
    /// Album being browsed
    pub content_id: ContentId,
    /// Album name
    pub title: String,
    /// Zero-based page index
    pub page: usize,
    /// Total number of pages (at least 1)
    pub page_count: usize,
    /// Parts on this page
    pub parts: Vec<Part>,
}

/// Paged part list owned by one user
#[derive(Debug, Clone)]
pub struct SelectionSession {
    owner: UserId,
    content_id: ContentId,
    title: String,
    parts: Vec<Part>,
    page_size: usize,
    current_page: usize,
    page_count: usize,
    last_activity: Instant,
    phase: Phase,
}

impl SelectionSession {
    /// Open a session on the first page
    pub fn new(owner: UserId, content_id: ContentId, detail: ContentDetail, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let page_count = detail.parts.len().div_ceil(page_size).max(1);
        Self {
            owner,
            content_id,
            title: detail.display_name,
            parts: detail.parts,
            page_size,
            current_page: 0,
            page_count,
            last_activity: Instant::now(),
            phase: Phase::Listing,
        }
    }

    /// User who opened the session
    pub fn owner(&self) -> UserId {
        self.owner
    }

    /// Zero-based current page
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Number of pages
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Last time the owner interacted with the session
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Fail unless `initiator` owns the session
    pub fn authorize(&self, initiator: UserId) -> Result<()> {
        if initiator == self.owner {
            Ok(())
        } else {
            Err(Error::SessionAuthorization {
                owner: self.owner,
                initiator,
            })
        }
    }

    /// Move to another page; saturates at both ends
    pub fn navigate(&mut self, initiator: UserId, nav: Nav) -> Result<PageView> {
        self.authorize(initiator)?;
        let last = self.page_count - 1;
        self.current_page = match nav {
            Nav::First => 0,
            Nav::Prev => self.current_page.saturating_sub(1),
            Nav::Next => (self.current_page + 1).min(last),
            Nav::Last => last,
        };
        self.phase = Phase::Navigating;
        self.last_activity = Instant::now();
        Ok(self.view())
    }

    /// Pick a part by id; the session stays open
    pub fn select(&mut self, initiator: UserId, part: ContentId) -> Result<Part> {
        self.authorize(initiator)?;
        let found = self
            .parts
            .iter()
            .find(|p| p.id == part)
            .cloned()
            .ok_or(Error::PartNotFound { part })?;
        self.last_activity = Instant::now();
        Ok(found)
    }

    /// The current page
    pub fn view(&self) -> PageView {
        let start = self.current_page * self.page_size;
        let end = (start + self.page_size).min(self.parts.len());
        PageView {
            owner: self.owner,
            content_id: self.content_id,
            title: self.title.clone(),
            page: self.current_page,
            page_count: self.page_count,
            parts: self.parts.get(start..end).unwrap_or_default().to_vec(),
        }
    }

    /// True if idle for longer than `timeout` at `now`
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > timeout
    }
}

/// All live sessions, one per user
pub struct SessionRegistry {
    sessions: Mutex<HashMap<UserId, SelectionSession>>,
    config: SessionConfig,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Open a session for `owner`, replacing any previous one
    pub fn open(&self, owner: UserId, content_id: ContentId, detail: ContentDetail) -> PageView {
        let session = SelectionSession::new(owner, content_id, detail, self.config.page_size);
        let view = session.view();
        if self.lock().insert(owner, session).is_some() {
            tracing::debug!(user = %owner, "Replaced selection session");
        }
        view
    }

    /// Page through `owner`'s session on behalf of `initiator`
    pub fn navigate(&self, owner: UserId, initiator: UserId, nav: Nav) -> Result<PageView> {
        self.with_session(owner, |session| session.navigate(initiator, nav))
    }

    /// Pick a part from `owner`'s session on behalf of `initiator`
    pub fn select(&self, owner: UserId, initiator: UserId, part: ContentId) -> Result<Part> {
        self.with_session(owner, |session| session.select(initiator, part))
    }

    /// Current page of `owner`'s session, if it is still live
    pub fn current(&self, owner: UserId) -> Option<PageView> {
        self.with_session(owner, |session| Ok(session.view())).ok()
    }

    /// Drop `owner`'s session; returns false if there was none
    pub fn close(&self, owner: UserId) -> bool {
        self.lock().remove(&owner).is_some()
    }

    /// Remove sessions idle for longer than the inactivity timeout; returns how many
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let timeout = self.config.inactivity_timeout;
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, timeout));
        before - sessions.len()
    }

    /// Number of live sessions (including expired ones not yet purged)
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if no sessions are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_session<T>(
        &self,
        owner: UserId,
        f: impl FnOnce(&mut SelectionSession) -> Result<T>,
    ) -> Result<T> {
        let mut sessions = self.lock();
        let expired = match sessions.get(&owner) {
            None => return Err(Error::NoSession(owner)),
            Some(session) => session.is_expired(Instant::now(), self.config.inactivity_timeout),
        };
        if expired {
            sessions.remove(&owner);
            return Err(Error::NoSession(owner));
        }
        match sessions.get_mut(&owner) {
            Some(session) => f(session),
            None => Err(Error::NoSession(owner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, SelectionSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
