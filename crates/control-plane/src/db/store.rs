//! Persistence collaborator shared by the scheduling components.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use super::filter::Filter;
use super::update::Update;
use crate::model::Execution;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lazily produced query results. Dropping the stream releases the cursor.
pub type ExecutionCursor = BoxStream<'static, StoreResult<Execution>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    ScheduledAtAsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDocument {
    Before,
    After,
}

/// Document store for executions.
///
/// `find_one_and_update` is atomic with respect to concurrent callers: the
/// matched document is read, modified and written back without another caller
/// observing or modifying it in between.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Apply `update` to the first document matching `filter` (by `sort`, or any
    /// when unsorted). `Ok(None)` when nothing matches.
    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        sort: Option<Sort>,
        return_document: ReturnDocument,
    ) -> StoreResult<Option<Execution>>;

    /// Stream every document matching `filter`, oldest `scheduled_at` first.
    async fn find(&self, filter: &Filter) -> StoreResult<ExecutionCursor>;

    /// Store a new document; an existing id is a [`StoreError::Conflict`].
    async fn insert(&self, execution: &Execution) -> StoreResult<()>;

    async fn get(&self, id: &str) -> StoreResult<Option<Execution>>;

    /// Whether the backend is reachable.
    async fn ping(&self) -> bool {
        true
    }
}
