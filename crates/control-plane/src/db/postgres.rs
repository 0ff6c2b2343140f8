//! PostgreSQL execution store.
//!
//! Executions are kept as JSONB documents. Filters compile to SQL over the
//! document; updates are applied in process between a `SELECT ... FOR UPDATE`
//! and the write-back, inside one transaction.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::types::Json;
use sqlx::{FromRow, Postgres};

use super::filter::{Field, Filter};
use super::pool::DbPool;
use super::store::{
    ExecutionCursor, ExecutionStore, ReturnDocument, Sort, StoreError, StoreResult,
};
use super::update::Update;
use crate::model::Execution;

const TABLE: &str = "testflow_executions";

/// Positional parameter of a compiled filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(String),
    TextArray(Vec<String>),
}

/// WHERE clause and its parameters, numbered from `$1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub binds: Vec<Bind>,
}

impl SqlFilter {
    pub fn compile(filter: &Filter) -> StoreResult<Self> {
        filter.validate()?;
        let mut binds = Vec::new();
        let clause = compile(filter, &mut binds);
        Ok(Self { clause, binds })
    }
}

fn column(field: Field) -> &'static str {
    match field {
        Field::Id => "id",
        Field::RunnerId => "(document->>'runner_id')",
        Field::Status => "(document->'result'->>'status')",
        Field::PredictedStatus => "(document->'result'->>'predicted_status')",
    }
}

// Every branch yields true or false, never NULL, so NOT keeps in-process semantics.
fn compile(filter: &Filter, binds: &mut Vec<Bind>) -> String {
    match filter {
        Filter::Eq(field, value) => {
            binds.push(Bind::Text(value.clone()));
            format!("{} IS NOT DISTINCT FROM ${}", column(*field), binds.len())
        }
        Filter::In(field, values) => {
            binds.push(Bind::TextArray(values.clone()));
            format!("COALESCE({} = ANY(${}), FALSE)", column(*field), binds.len())
        }
        Filter::MissingOrEmpty(field) => format!("COALESCE({}, '') = ''", column(*field)),
        Filter::Not(inner) => format!("NOT ({})", compile(inner, binds)),
        Filter::And(filters) => join(filters, " AND ", binds),
        Filter::Or(filters) => join(filters, " OR ", binds),
    }
}

fn join(filters: &[Filter], separator: &str, binds: &mut Vec<Bind>) -> String {
    let parts: Vec<String> = filters.iter().map(|f| compile(f, binds)).collect();
    format!("({})", parts.join(separator))
}

fn bind_all<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    binds: &[Bind],
) -> QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, PgRow>,
{
    for bind in binds {
        query = match bind {
            Bind::Text(value) => query.bind(value.clone()),
            Bind::TextArray(values) => query.bind(values.clone()),
        };
    }
    query
}

#[derive(Debug, Clone)]
pub struct PostgresExecutionStore {
    pool: DbPool,
}

impl PostgresExecutionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the executions table and its indexes if they do not exist.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {TABLE} (
                id TEXT PRIMARY KEY,
                scheduled_at TIMESTAMPTZ NOT NULL,
                document JSONB NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {TABLE}_scheduled_at_idx ON {TABLE} (scheduled_at)"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {TABLE}_status_idx ON {TABLE} ((document->'result'->>'status'))"
        ))
        .execute(&self.pool)
        .await?;

        tracing::info!(table = TABLE, "Execution store schema ready");
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for PostgresExecutionStore {
    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        sort: Option<Sort>,
        return_document: ReturnDocument,
    ) -> StoreResult<Option<Execution>> {
        let compiled = SqlFilter::compile(filter)?;
        update.validate()?;

        // Competing claimers skip rows another transaction is already updating.
        let (order, lock) = match sort {
            Some(Sort::ScheduledAtAsc) => ("ORDER BY scheduled_at ASC, id ASC", "FOR UPDATE SKIP LOCKED"),
            None => ("", "FOR UPDATE"),
        };
        let query = format!(
            "SELECT document FROM {TABLE} WHERE {} {order} LIMIT 1 {lock}",
            compiled.clause
        );

        let mut tx = self.pool.begin().await?;
        let row: Option<(Json<Execution>,)> =
            bind_all(sqlx::query_as(&query), &compiled.binds)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((Json(before),)) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let mut after = before.clone();
        update.apply(&mut after);

        sqlx::query(&format!(
            "UPDATE {TABLE} SET document = $1, scheduled_at = $2 WHERE id = $3"
        ))
        .bind(Json(&after))
        .bind(after.scheduled_at)
        .bind(&after.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(match return_document {
            ReturnDocument::Before => before,
            ReturnDocument::After => after,
        }))
    }

    async fn find(&self, filter: &Filter) -> StoreResult<ExecutionCursor> {
        let compiled = SqlFilter::compile(filter)?;
        let query = format!(
            "SELECT document FROM {TABLE} WHERE {} ORDER BY scheduled_at ASC, id ASC",
            compiled.clause
        );
        let pool = self.pool.clone();

        Ok(Box::pin(async_stream::stream! {
            let mut rows = bind_all(sqlx::query_as::<_, (Json<Execution>,)>(&query), &compiled.binds)
                .fetch(&pool);
            loop {
                match rows.try_next().await {
                    Ok(Some((Json(execution),))) => yield Ok(execution),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(StoreError::from(e));
                        break;
                    }
                }
            }
        }))
    }

    async fn insert(&self, execution: &Execution) -> StoreResult<()> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO {TABLE} (id, scheduled_at, document) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING"
        ))
        .bind(&execution.id)
        .bind(execution.scheduled_at)
        .bind(Json(execution))
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "execution '{}' already exists",
                execution.id
            )));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Execution>> {
        let row: Option<(Json<Execution>,)> =
            sqlx::query_as(&format!("SELECT document FROM {TABLE} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(execution),)| execution))
    }

    async fn ping(&self) -> bool {
        super::pool::ping(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutionStatus;

    #[test]
    fn test_compile_scheduler_filter() {
        let filter = Filter::status_in_or_missing(&[ExecutionStatus::Queued, ExecutionStatus::Assigned])
            .and(Filter::Or(vec![
                Filter::MissingOrEmpty(Field::RunnerId),
                Filter::runner("r1"),
            ]));
        let compiled = SqlFilter::compile(&filter).unwrap();

        assert_eq!(
            compiled.clause,
            "((COALESCE((document->'result'->>'status') = ANY($1), FALSE) OR COALESCE((document->'result'->>'status'), '') = '') AND (COALESCE((document->>'runner_id'), '') = '' OR (document->>'runner_id') IS NOT DISTINCT FROM $2))"
        );
        assert_eq!(
            compiled.binds,
            vec![
                Bind::TextArray(vec!["queued".into(), "assigned".into()]),
                Bind::Text("r1".into()),
            ]
        );
    }

    #[test]
    fn test_compile_negation() {
        let filter = Filter::status(ExecutionStatus::Stopping)
            .and(!Filter::predicted(ExecutionStatus::Canceled));
        let compiled = SqlFilter::compile(&filter).unwrap();
        assert_eq!(
            compiled.clause,
            "((document->'result'->>'status') IS NOT DISTINCT FROM $1 AND NOT ((document->'result'->>'predicted_status') IS NOT DISTINCT FROM $2))"
        );
    }

    #[test]
    fn test_compile_rejects_invalid_filter() {
        let result = SqlFilter::compile(&Filter::In(Field::RunnerId, vec![]));
        assert!(matches!(result, Err(StoreError::InvalidFilter(_))));
    }
}
