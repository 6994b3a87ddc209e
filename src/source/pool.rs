//! Bounded pool of provider sessions.

use crate::error::{Error, Result};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, SemaphorePermit};

use super::ContentSource;

/// Creates a fresh provider session
pub type SourceFactory = Box<dyn Fn() -> Result<Arc<dyn ContentSource>> + Send + Sync>;

/// Pool of at most `capacity` provider sessions
///
/// [`get`](ClientPool::get) hands out an idle session, creates one while under the
/// cap, or waits until a borrowed session is returned.
pub struct ClientPool {
    factory: SourceFactory,
    idle: Mutex<Vec<Arc<dyn ContentSource>>>,
    /// One permit per session that may exist
    permits: Semaphore,
    created: AtomicUsize,
}

impl ClientPool {
    /// Create an empty pool that creates sessions with `factory`
    pub fn new(capacity: usize, factory: SourceFactory) -> Self {
        Self {
            factory,
            idle: Mutex::new(Vec::new()),
            permits: Semaphore::new(capacity),
            created: AtomicUsize::new(0),
        }
    }

    /// Borrow a session, waiting while all of them are in use
    pub async fn get(&self) -> Result<PooledClient<'_>> {
        let permit = self.permits.acquire().await.map_err(|_| Error::ShuttingDown)?;

        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let client = match reused {
            Some(client) => client,
            None => {
                let client = (self.factory)()?;
                let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(created, "Created provider session");
                client
            }
        };

        Ok(PooledClient {
            client,
            pool: self,
            _permit: permit,
        })
    }

    /// Number of sessions created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of sessions waiting to be reused
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    /// Stop handing out sessions; pending and future `get` calls fail
    pub fn close(&self) {
        self.permits.close();
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }
}

/// Session borrowed from a [`ClientPool`]; returned to the pool on drop
pub struct PooledClient<'a> {
    client: Arc<dyn ContentSource>,
    pool: &'a ClientPool,
    _permit: SemaphorePermit<'a>,
}

impl Deref for PooledClient<'_> {
    type Target = dyn ContentSource;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        // Push back before the permit is released so a waiter finds it idle
        if !self.pool.permits.is_closed()
            && let Ok(mut idle) = self.pool.idle.lock()
        {
            idle.push(self.client.clone());
        }
    }
}
