//! Read-only views of executions awaiting a runner-side action.
//!
//! Each query returns a lazy stream. The stream ends after the first error,
//! and dropping it early releases the underlying cursor.

use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::db::{ExecutionStore, Filter};
use crate::error::{AppError, AppResult};
use crate::model::{Execution, ExecutionStatus};

pub type ExecutionStream = BoxStream<'static, AppResult<Execution>>;

/// The pending actions a runner polls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingKind {
    Pausing,
    Resuming,
    Aborting,
    Cancelling,
    Starting,
    Assigned,
}

impl PendingKind {
    fn filter(&self) -> Filter {
        match self {
            PendingKind::Pausing => Filter::status(ExecutionStatus::Pausing),
            PendingKind::Resuming => Filter::status(ExecutionStatus::Resuming),
            PendingKind::Aborting => Filter::status(ExecutionStatus::Stopping)
                .and(!Filter::predicted(ExecutionStatus::Canceled)),
            PendingKind::Cancelling => Filter::status(ExecutionStatus::Stopping)
                .and(Filter::predicted(ExecutionStatus::Canceled)),
            PendingKind::Starting => Filter::status(ExecutionStatus::Starting),
            PendingKind::Assigned => Filter::status(ExecutionStatus::Assigned),
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            PendingKind::Pausing => "pausing",
            PendingKind::Resuming => "resuming",
            PendingKind::Aborting => "aborting",
            PendingKind::Cancelling => "cancelling",
            PendingKind::Starting => "starting",
            PendingKind::Assigned => "assigned",
        }
    }
}

/// Read side of the runner protocol: which executions need the runner to act.
///
/// Every method returns a lazy stream ordered by `scheduled_at`; dropping it
/// early releases the underlying cursor.
#[derive(Clone)]
pub struct Querier {
    store: Arc<dyn ExecutionStore>,
}

impl Querier {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    /// Executions waiting on the runner action named by `kind`.
    pub fn pending(&self, kind: PendingKind) -> ExecutionStream {
        self.stream(kind.operation(), kind.filter())
    }

    /// Executions in `pausing`, waiting for the runner to pause.
    pub fn pausing(&self) -> ExecutionStream {
        self.pending(PendingKind::Pausing)
    }

    /// Executions in `resuming`, waiting for the runner to resume.
    pub fn resuming(&self) -> ExecutionStream {
        self.pending(PendingKind::Resuming)
    }

    /// Stopping executions that are not being canceled.
    pub fn aborting(&self) -> ExecutionStream {
        self.pending(PendingKind::Aborting)
    }

    /// Stopping executions whose predicted status is `canceled`.
    pub fn cancelling(&self) -> ExecutionStream {
        self.pending(PendingKind::Cancelling)
    }

    /// Executions in `starting`, waiting for the runner to launch them.
    pub fn starting(&self) -> ExecutionStream {
        self.pending(PendingKind::Starting)
    }

    /// Executions claimed by a runner but not started yet.
    pub fn assigned(&self) -> ExecutionStream {
        self.pending(PendingKind::Assigned)
    }

    /// Executions in any of `statuses`.
    pub fn by_status(&self, statuses: &[ExecutionStatus]) -> ExecutionStream {
        self.stream("by_status", Filter::status_in(statuses))
    }

    fn stream(&self, operation: &'static str, filter: Filter) -> ExecutionStream {
        let store = self.store.clone();
        Box::pin(stream! {
            let mut cursor = match store.find(&filter).await {
                Ok(cursor) => cursor,
                Err(e) => {
                    yield Err(AppError::query(operation, e));
                    return;
                }
            };
            while let Some(next) = cursor.next().await {
                match next {
                    Ok(execution) => yield Ok(execution),
                    Err(e) => {
                        yield Err(AppError::query(operation, e));
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        ExecutionCursor, MemoryExecutionStore, ReturnDocument, Sort, StoreError, StoreResult,
        Update,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use futures::TryStreamExt;

    async fn seed(store: &MemoryExecutionStore, id: &str, status: ExecutionStatus, predicted: ExecutionStatus) {
        let mut execution = Execution::queued(id, Utc::now());
        execution.result.status = Some(status);
        execution.result.predicted_status = Some(predicted);
        store.insert(&execution).await.unwrap();
    }

    async fn ids(stream: ExecutionStream) -> Vec<String> {
        stream
            .map_ok(|e| e.id)
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_aborting_and_cancelling_split_on_prediction() {
        let store = Arc::new(MemoryExecutionStore::new());
        seed(&store, "abort", ExecutionStatus::Stopping, ExecutionStatus::Aborted).await;
        seed(&store, "cancel", ExecutionStatus::Stopping, ExecutionStatus::Canceled).await;
        seed(&store, "run", ExecutionStatus::Running, ExecutionStatus::Passed).await;
        let querier = Querier::new(store.clone());

        assert_eq!(ids(querier.aborting()).await, vec!["abort"]);
        assert_eq!(ids(querier.cancelling()).await, vec!["cancel"]);
        assert!(ids(querier.pausing()).await.is_empty());
    }

    #[tokio::test]
    async fn test_simple_status_queries() {
        let store = Arc::new(MemoryExecutionStore::new());
        seed(&store, "p", ExecutionStatus::Pausing, ExecutionStatus::Passed).await;
        seed(&store, "r", ExecutionStatus::Resuming, ExecutionStatus::Passed).await;
        seed(&store, "s", ExecutionStatus::Starting, ExecutionStatus::Passed).await;
        seed(&store, "a", ExecutionStatus::Assigned, ExecutionStatus::Passed).await;
        let querier = Querier::new(store.clone());

        assert_eq!(ids(querier.pausing()).await, vec!["p"]);
        assert_eq!(ids(querier.resuming()).await, vec!["r"]);
        assert_eq!(ids(querier.starting()).await, vec!["s"]);
        assert_eq!(ids(querier.assigned()).await, vec!["a"]);

        let mut both = ids(querier.by_status(&[ExecutionStatus::Pausing, ExecutionStatus::Resuming])).await;
        both.sort();
        assert_eq!(both, vec!["p", "r"]);
    }

    #[tokio::test]
    async fn test_early_drop_releases_cursor() {
        let store = Arc::new(MemoryExecutionStore::new());
        for i in 0..5 {
            seed(&store, &format!("e{}", i), ExecutionStatus::Pausing, ExecutionStatus::Passed).await;
        }
        let querier = Querier::new(store.clone());

        let mut stream = querier.pausing();
        assert!(stream.next().await.is_some());
        assert_eq!(store.open_cursors(), 1);
        drop(stream);
        assert_eq!(store.open_cursors(), 0);

        // exhausting the stream releases it as well
        assert_eq!(ids(querier.pausing()).await.len(), 5);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_invalid_status_list_surfaces_error() {
        let querier = Querier::new(Arc::new(MemoryExecutionStore::new()));
        let mut stream = querier.by_status(&[]);
        assert!(matches!(
            stream.next().await,
            Some(Err(AppError::Query {
                source: StoreError::InvalidFilter(_),
                ..
            }))
        ));
        assert!(stream.next().await.is_none());
    }

    /// Yields one execution, then fails.
    struct FlakyStore;

    #[async_trait]
    impl ExecutionStore for FlakyStore {
        async fn find_one_and_update(
            &self,
            _filter: &Filter,
            _update: &Update,
            _sort: Option<Sort>,
            _return_document: ReturnDocument,
        ) -> StoreResult<Option<Execution>> {
            Ok(None)
        }

        async fn find(&self, _filter: &Filter) -> StoreResult<ExecutionCursor> {
            let items = vec![
                Ok(Execution::queued("first", Utc::now())),
                Err(StoreError::Conflict("cursor lost".into())),
                Ok(Execution::queued("never", Utc::now())),
            ];
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn insert(&self, _execution: &Execution) -> StoreResult<()> {
            Ok(())
        }

        async fn get(&self, _id: &str) -> StoreResult<Option<Execution>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_stream_stops_at_first_error() {
        let querier = Querier::new(Arc::new(FlakyStore));
        let items: Vec<AppResult<Execution>> = querier.pausing().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().id, "first");
        assert!(items[1].is_err());
    }
}
