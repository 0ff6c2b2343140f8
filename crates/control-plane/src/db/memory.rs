//! In-process execution store.
//!
//! Every `find_one_and_update` holds the write lock for its whole
//! read-modify-write, which gives the same atomicity as the database backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::filter::Filter;
use super::store::{
    ExecutionCursor, ExecutionStore, ReturnDocument, Sort, StoreError, StoreResult,
};
use super::update::Update;
use crate::model::Execution;

#[derive(Debug, Default)]
pub struct MemoryExecutionStore {
    executions: RwLock<HashMap<String, Execution>>,
    open_cursors: Arc<AtomicUsize>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cursors returned by `find` that have not been dropped yet.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }
}

struct CursorGuard(Arc<AtomicUsize>);

impl CursorGuard {
    fn open(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        sort: Option<Sort>,
        return_document: ReturnDocument,
    ) -> StoreResult<Option<Execution>> {
        filter.validate()?;
        update.validate()?;

        let mut executions = self.executions.write().await;
        let candidates = executions.values().filter(|e| filter.matches(e));
        let chosen = match sort {
            Some(Sort::ScheduledAtAsc) => {
                candidates.min_by(|a, b| (a.scheduled_at, &a.id).cmp(&(b.scheduled_at, &b.id)))
            }
            None => candidates.min_by(|a, b| a.id.cmp(&b.id)),
        };
        let Some(id) = chosen.map(|e| e.id.clone()) else {
            return Ok(None);
        };
        let Some(execution) = executions.get_mut(&id) else {
            return Ok(None);
        };

        let before = execution.clone();
        update.apply(execution);
        Ok(Some(match return_document {
            ReturnDocument::Before => before,
            ReturnDocument::After => execution.clone(),
        }))
    }

    async fn find(&self, filter: &Filter) -> StoreResult<ExecutionCursor> {
        filter.validate()?;

        let mut matched: Vec<Execution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| (a.scheduled_at, &a.id).cmp(&(b.scheduled_at, &b.id)));

        let guard = CursorGuard::open(&self.open_cursors);
        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            for execution in matched {
                yield Ok::<_, StoreError>(execution);
            }
        }))
    }

    async fn insert(&self, execution: &Execution) -> StoreResult<()> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&execution.id) {
            return Err(StoreError::Conflict(format!(
                "execution '{}' already exists",
                execution.id
            )));
        }
        executions.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Execution>> {
        Ok(self.executions.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::update::Assignment;
    use crate::model::ExecutionStatus;
    use chrono::{Duration, Utc};
    use futures::StreamExt;

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = MemoryExecutionStore::new();
        let execution = Execution::queued("e1", Utc::now());
        store.insert(&execution).await.unwrap();
        assert!(matches!(
            store.insert(&execution).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_find_one_and_update_picks_oldest() {
        let store = MemoryExecutionStore::new();
        let now = Utc::now();
        store.insert(&Execution::queued("late", now)).await.unwrap();
        store
            .insert(&Execution::queued("early", now - Duration::seconds(10)))
            .await
            .unwrap();

        let update = Update::new().set(Assignment::Status(ExecutionStatus::Assigned));
        let before = store
            .find_one_and_update(
                &Filter::status(ExecutionStatus::Queued),
                &update,
                Some(Sort::ScheduledAtAsc),
                ReturnDocument::Before,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.id, "early");
        assert_eq!(before.status(), ExecutionStatus::Queued);

        let stored = store.get("early").await.unwrap().unwrap();
        assert_eq!(stored.status(), ExecutionStatus::Assigned);
    }

    #[tokio::test]
    async fn test_invalid_filter_is_rejected_before_lookup() {
        let store = MemoryExecutionStore::new();
        let result = store
            .find(&Filter::Eq(crate::db::filter::Field::Status, "bogus".into()))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidFilter(_))));
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_dropping_cursor_releases_it() {
        let store = MemoryExecutionStore::new();
        let now = Utc::now();
        for i in 0..3 {
            store
                .insert(&Execution::queued(format!("e{}", i), now))
                .await
                .unwrap();
        }

        let mut cursor = store
            .find(&Filter::status(ExecutionStatus::Queued))
            .await
            .unwrap();
        assert_eq!(store.open_cursors(), 1);
        assert!(cursor.next().await.is_some());
        drop(cursor);
        assert_eq!(store.open_cursors(), 0);
    }
}
