//! Keyed document storage with change notification.
//!
//! A [`DocumentStore`] holds one [`SessionDocument`] per [`DocumentKey`]
//! and notifies every subscriber of that key whenever a new document is
//! written, whoever wrote it. Subscribers only ever see the latest
//! document; intermediate writes may be skipped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use budscale_core::{DocumentKey, SessionDocument};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

/// Errors from a document store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// Receives the latest document for one key; `None` until the first write.
pub type DocumentReceiver = watch::Receiver<Option<SessionDocument>>;

/// Keyed storage for session documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `document` under `key`, replacing any previous one.
    async fn put(&self, key: &DocumentKey, document: SessionDocument) -> Result<(), StoreError>;

    /// The document currently stored under `key`.
    async fn get(&self, key: &DocumentKey) -> Result<Option<SessionDocument>, StoreError>;

    /// Watch `key` for new documents.
    fn subscribe(&self, key: &DocumentKey) -> DocumentReceiver;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn put(&self, key: &DocumentKey, document: SessionDocument) -> Result<(), StoreError> {
        (**self).put(key, document).await
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<SessionDocument>, StoreError> {
        (**self).get(key).await
    }

    fn subscribe(&self, key: &DocumentKey) -> DocumentReceiver {
        (**self).subscribe(key)
    }
}

/// In-process [`DocumentStore`].
///
/// Can be switched offline to exercise write failures.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    channels: Mutex<HashMap<DocumentKey, watch::Sender<Option<SessionDocument>>>>,
    offline: Mutex<bool>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (`true`) or succeed (`false`).
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    fn with_sender<R>(
        &self,
        key: &DocumentKey,
        f: impl FnOnce(&watch::Sender<Option<SessionDocument>>) -> R,
    ) -> R {
        let mut channels = self.channels.lock();
        let sender = channels
            .entry(key.clone())
            .or_insert_with(|| watch::channel(None).0);
        f(sender)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, key: &DocumentKey, document: SessionDocument) -> Result<(), StoreError> {
        if *self.offline.lock() {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        let regions = document.annotations.len();
        self.with_sender(key, |sender| {
            sender.send_replace(Some(document));
        });
        debug!(%key, regions, "document stored");
        Ok(())
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<SessionDocument>, StoreError> {
        Ok(self.with_sender(key, |sender| sender.borrow().clone()))
    }

    fn subscribe(&self, key: &DocumentKey) -> DocumentReceiver {
        self.with_sender(key, watch::Sender::subscribe)
    }
}
