//! Frame persistence.
//!
//! The engine only ever reads through [`FrameStore::fetch_frames`]; appends
//! come from the ingestion path, possibly on another thread.
use std::sync::RwLock;

use crate::errors::StoreError;
use crate::frame::{CsiFrame, ReceiptTime};

mod sqlite;

pub use sqlite::SqliteStore;

/// A store of CSI frames shared between ingestion and estimation.
pub trait FrameStore: Send + Sync {
    /// Frames received within `[start, end]`, ascending by receipt time.
    fn fetch_frames(&self, start: ReceiptTime, end: ReceiptTime)
        -> Result<Vec<CsiFrame>, StoreError>;

    /// Appends frames, returning how many were written.
    fn append_frames(&self, frames: &[CsiFrame]) -> Result<usize, StoreError>;

    /// Receipt times of the oldest and newest stored frame, if any.
    fn time_span(&self) -> Result<Option<(ReceiptTime, ReceiptTime)>, StoreError>;
}

impl<S: FrameStore + ?Sized> FrameStore for std::sync::Arc<S> {
    fn fetch_frames(
        &self,
        start: ReceiptTime,
        end: ReceiptTime,
    ) -> Result<Vec<CsiFrame>, StoreError> {
        (**self).fetch_frames(start, end)
    }

    fn append_frames(&self, frames: &[CsiFrame]) -> Result<usize, StoreError> {
        (**self).append_frames(frames)
    }

    fn time_span(&self) -> Result<Option<(ReceiptTime, ReceiptTime)>, StoreError> {
        (**self).time_span()
    }
}

/// In-process frame store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    frames: RwLock<Vec<CsiFrame>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames(frames: Vec<CsiFrame>) -> Self {
        Self {
            frames: RwLock::new(frames),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameStore for MemoryStore {
    fn fetch_frames(
        &self,
        start: ReceiptTime,
        end: ReceiptTime,
    ) -> Result<Vec<CsiFrame>, StoreError> {
        let frames = self.frames.read().map_err(|_| StoreError::Poisoned)?;
        let mut window: Vec<CsiFrame> = frames
            .iter()
            .filter(|f| f.received_at >= start && f.received_at <= end)
            .cloned()
            .collect();
        // Stable, so frames sharing a receipt time keep insertion order
        window.sort_by_key(|f| f.received_at);
        Ok(window)
    }

    fn append_frames(&self, frames: &[CsiFrame]) -> Result<usize, StoreError> {
        let mut stored = self.frames.write().map_err(|_| StoreError::Poisoned)?;
        stored.extend_from_slice(frames);
        Ok(frames.len())
    }

    fn time_span(&self) -> Result<Option<(ReceiptTime, ReceiptTime)>, StoreError> {
        let frames = self.frames.read().map_err(|_| StoreError::Poisoned)?;
        let first = frames.iter().map(|f| f.received_at).min();
        let last = frames.iter().map(|f| f.received_at).max();
        Ok(first.zip(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(secs: i64) -> ReceiptTime {
        NaiveDate::from_ymd_opt(2025, 4, 10)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            + Duration::seconds(secs)
    }

    #[test]
    fn fetch_is_inclusive_and_ordered() {
        let store = MemoryStore::new();
        store
            .append_frames(&[
                CsiFrame::new(at(5), "b", vec![5]),
                CsiFrame::new(at(1), "a", vec![1]),
                CsiFrame::new(at(10), "c", vec![10]),
                CsiFrame::new(at(11), "d", vec![11]),
            ])
            .unwrap();

        let frames = store.fetch_frames(at(1), at(10)).unwrap();
        let order: Vec<&str> = frames.iter().map(|f| f.station.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_store_yields_nothing() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(store.fetch_frames(at(0), at(100)).unwrap().is_empty());
        assert_eq!(store.time_span().unwrap(), None);
    }

    #[test]
    fn time_span_covers_all_frames() {
        let store = MemoryStore::with_frames(vec![
            CsiFrame::new(at(3), "a", vec![]),
            CsiFrame::new(at(-2), "a", vec![]),
            CsiFrame::new(at(7), "a", vec![]),
        ]);
        assert_eq!(store.time_span().unwrap(), Some((at(-2), at(7))));
        assert_eq!(store.len(), 3);
    }
}
