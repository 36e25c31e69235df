//! In-process record store.
//!
//! Keeps rows in a map keyed by id with the same all-or-nothing batch
//! semantics as the PostgreSQL store. Backs `teddy run --dry-run`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::database::{DatabaseError, RecordStore, RecordStoreFactory};
use super::schema::Teddy360;

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<i32, Teddy360>,
    fail_on: Option<i32>,
    commits: usize,
}

/// Map-backed store. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every batch containing `id` fail, leaving the rows untouched.
    pub fn failing_on(self, id: i32) -> Self {
        self.lock().fail_on = Some(id);
        self
    }

    /// Inserts a row directly, bypassing batch semantics.
    pub fn seed(&self, record: Teddy360) {
        self.lock().rows.insert(record.id, record);
    }

    /// All rows ordered by id.
    pub fn rows(&self) -> Vec<Teddy360> {
        self.lock().rows.values().cloned().collect()
    }

    /// The row stored under `id`.
    pub fn get(&self, id: i32) -> Option<Teddy360> {
        self.lock().rows.get(&id).cloned()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    /// Whether the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of committed batches.
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked mid-merge;
        // the map itself is always left consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn merge_batch(&self, records: &[Teddy360]) -> Result<usize, DatabaseError> {
        let mut inner = self.lock();

        let mut staged = inner.rows.clone();
        for record in records {
            if inner.fail_on == Some(record.id) {
                return Err(DatabaseError::Rejected {
                    id: record.id,
                    reason: "injected failure".to_string(),
                });
            }
            staged.insert(record.id, record.clone());
        }

        inner.rows = staged;
        inner.commits += 1;
        Ok(records.len())
    }

    fn target(&self) -> String {
        "memory".to_string()
    }
}

impl RecordStoreFactory for MemoryRecordStore {
    fn store_for(&self, _conn_id: &str) -> Result<Arc<dyn RecordStore>, DatabaseError> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i32, title: &str) -> Teddy360 {
        Teddy360 {
            id,
            user_id: id * 10,
            title: title.to_string(),
            completed: true,
        }
    }

    #[tokio::test]
    async fn test_merge_inserts_and_overwrites() {
        let store = MemoryRecordStore::new();
        store.seed(Teddy360 {
            id: 1,
            user_id: 99,
            title: "stale".to_string(),
            completed: false,
        });

        let written = store
            .merge_batch(&[record(1, "fresh"), record(2, "new")])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(store.get(1), Some(record(1, "fresh")));
        assert_eq!(store.get(2), Some(record(2, "new")));
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn test_later_duplicate_wins() {
        let store = MemoryRecordStore::new();
        store
            .merge_batch(&[record(1, "first"), record(1, "second")])
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1).unwrap().title, "second");
    }

    #[tokio::test]
    async fn test_failure_discards_whole_batch() {
        let store = MemoryRecordStore::new().failing_on(3);
        store.seed(record(1, "original"));

        let err = store
            .merge_batch(&[record(1, "changed"), record(2, "b"), record(3, "c")])
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::Rejected { id: 3, .. }));
        assert_eq!(store.rows(), vec![record(1, "original")]);
        assert_eq!(store.commits(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_rows() {
        let store = MemoryRecordStore::new();
        let handle = store.store_for("anything").unwrap();
        handle.merge_batch(&[record(5, "x")]).await.unwrap();
        assert!(!store.is_empty());
        assert_eq!(handle.target(), "memory");
    }
}
