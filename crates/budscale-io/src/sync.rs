//! A [`Session`] kept in step with a [`DocumentStore`].
//!
//! Every mutation that changes persisted state is applied locally first,
//! then the new snapshot is pushed. A failed push is reported to the
//! caller but the local change stays: the next successful push carries
//! it.

use budscale_core::{
    CalibrationError, Dimensions, DocumentKey, Rect, Region, RegionId, RegionRejected,
    RemoveOutcome, Report, Session, SessionDocument, SessionError, SnapshotOutcome, StandardError,
};
use tracing::{info, warn};
use web_time::{SystemTime, UNIX_EPOCH};

use crate::store::{DocumentReceiver, DocumentStore, StoreError};

/// Errors from a synchronized mutation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The region was not accepted; nothing changed.
    #[error(transparent)]
    Rejected(#[from] RegionRejected),

    /// The standard could not be set; nothing changed.
    #[error(transparent)]
    Standard(#[from] StandardError),

    /// The calibration input was invalid; nothing changed.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// The local change was applied but could not be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Session plus the store location it is persisted to.
#[derive(Debug)]
pub struct SyncedSession<S> {
    session: Session,
    store: S,
    key: DocumentKey,
}

impl<S: DocumentStore> SyncedSession<S> {
    /// Wrap `session`, persisting to `key` in `store`.
    #[must_use]
    pub const fn new(session: Session, store: S, key: DocumentKey) -> Self {
        Self {
            session,
            store,
            key,
        }
    }

    /// Load whatever is stored under `key` into a fresh session for
    /// `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    pub async fn open(owner: &str, store: S, key: DocumentKey) -> Result<Self, StoreError> {
        let mut session = Session::new(owner);
        if let Some(document) = store.get(&key).await? {
            let _ = session.apply_snapshot(document);
            info!(%key, regions = session.regions().len(), "session restored");
        }
        Ok(Self::new(session, store, key))
    }

    /// Read access to the session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Where the session is persisted.
    #[must_use]
    pub const fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Watch the store for documents written by anyone, this session included.
    #[must_use]
    pub fn subscribe(&self) -> DocumentReceiver {
        self.store.subscribe(&self.key)
    }

    /// See [`Session::load_image`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the cleared state cannot be persisted.
    pub async fn load_image(&mut self, dimensions: Dimensions) -> Result<(), StoreError> {
        self.session.load_image(dimensions);
        self.push().await
    }

    /// See [`Session::begin_gesture`]. Nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoImage`] if no image is loaded.
    pub fn begin_gesture(&mut self, x: f64, y: f64) -> Result<(), SessionError> {
        self.session.begin_gesture(x, y)
    }

    /// See [`Session::update_gesture`]. Nothing is persisted.
    pub fn update_gesture(&mut self, x: f64, y: f64) -> Option<Rect> {
        self.session.update_gesture(x, y)
    }

    /// See [`Session::cancel_gesture`]. Nothing is persisted.
    pub fn cancel_gesture(&mut self) {
        self.session.cancel_gesture();
    }

    /// See [`Session::end_gesture`]; a committed region is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the new region cannot be persisted.
    pub async fn end_gesture(&mut self, x: f64, y: f64) -> Result<Option<Region>, StoreError> {
        let committed = self.session.end_gesture(x, y);
        if committed.is_some() {
            self.push().await?;
        }
        Ok(committed)
    }

    /// See [`Session::add_region`].
    ///
    /// # Errors
    ///
    /// [`SyncError::Rejected`] if the region is not accepted, or
    /// [`SyncError::Store`] if it cannot be persisted.
    pub async fn add_region(&mut self, x: f64, y: f64, w: f64, h: f64) -> Result<Region, SyncError> {
        let region = self.session.add_region(x, y, w, h)?;
        self.push().await?;
        Ok(region)
    }

    /// See [`Session::delete_region`]; deleting an absent id pushes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the deletion cannot be persisted.
    pub async fn delete_region(&mut self, id: &RegionId) -> Result<RemoveOutcome, StoreError> {
        let outcome = self.session.delete_region(id);
        if outcome.removed.is_some() {
            self.push().await?;
        }
        Ok(outcome)
    }

    /// See [`Session::set_standard`].
    ///
    /// # Errors
    ///
    /// [`SyncError::Standard`] for an unknown id, or [`SyncError::Store`]
    /// if the change cannot be persisted.
    pub async fn set_standard(&mut self, id: &RegionId) -> Result<(), SyncError> {
        self.session.set_standard(id)?;
        self.push().await?;
        Ok(())
    }

    /// See [`Session::clear_all`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the cleared state cannot be persisted.
    pub async fn clear_all(&mut self) -> Result<(), StoreError> {
        self.session.clear_all();
        self.push().await
    }

    /// See [`Session::set_calibration`].
    ///
    /// # Errors
    ///
    /// [`SyncError::Calibration`] for invalid sizes, or [`SyncError::Store`]
    /// if the change cannot be persisted.
    pub async fn set_calibration(&mut self, width_cm: f64, height_cm: f64) -> Result<(), SyncError> {
        self.session.set_calibration(width_cm, height_cm)?;
        self.push().await?;
        Ok(())
    }

    /// See [`Session::compute_report`]. Reports are never persisted.
    ///
    /// # Errors
    ///
    /// See [`budscale_core::compute_report`].
    pub fn compute_report(&mut self) -> Result<Report, CalibrationError> {
        self.session.compute_report()
    }

    /// Adopt a document pushed from elsewhere, unless a gesture is open.
    pub fn apply_remote(&mut self, document: SessionDocument) -> SnapshotOutcome {
        let outcome = self.session.apply_snapshot(document);
        if outcome == SnapshotOutcome::IgnoredDuringGesture {
            warn!(key = %self.key, "remote update ignored during draw gesture");
        }
        outcome
    }

    async fn push(&self) -> Result<(), StoreError> {
        let mut document = self.session.snapshot();
        document.last_update_ms = Some(now_ms());
        self.store.put(&self.key, document).await.inspect_err(|e| {
            warn!(key = %self.key, error = %e, "failed to persist session");
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
