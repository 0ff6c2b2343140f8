//! Runner report ingestion.
//!
//! Every report is a read-modify-write: load the execution, run it through the
//! [`ResultEngine`], and write the result back only if the status is still the
//! one that was read. A lost race (say, an abort landing in between) reloads
//! and tries again. Reports for the same execution are serialised in process.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::listener::StatusListeners;
use crate::db::{Assignment, ExecutionStore, Field, Filter, ReturnDocument, Update};
use crate::engine::ResultEngine;
use crate::error::{AppError, AppResult};
use crate::model::{Execution, ExecutionResult, StepReport};
use crate::result_ext::{OptionResultExt, ResultExt};

type ExecutionLocks = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

#[derive(Clone)]
pub struct ResultIngestor {
    store: Arc<dyn ExecutionStore>,
    listeners: StatusListeners,
    retry_limit: u32,
    locks: ExecutionLocks,
}

impl ResultIngestor {
    pub fn new(store: Arc<dyn ExecutionStore>, listeners: StatusListeners, retry_limit: u32) -> Self {
        Self {
            store,
            listeners,
            retry_limit,
            locks: Arc::default(),
        }
    }

    /// Merge a step (or initialization) report and recompute.
    pub async fn report_step(&self, execution_id: &str, report: StepReport) -> AppResult<Execution> {
        self.apply("report_step", execution_id, move |engine, result| {
            if !engine.apply_report(result, &report) {
                tracing::debug!(
                    reference = %report.reference,
                    "Ignoring report for a step outside the signature"
                );
            }
            engine.recompute(result);
        })
        .await
    }

    pub async fn pause(&self, execution_id: &str, reference: &str, at: DateTime<Utc>) -> AppResult<Execution> {
        self.apply("pause", execution_id, |engine, result| {
            engine.pause_start(result, reference, at);
            engine.recompute(result);
        })
        .await
    }

    pub async fn resume(&self, execution_id: &str, reference: &str, at: DateTime<Utc>) -> AppResult<Execution> {
        self.apply("resume", execution_id, |engine, result| {
            engine.pause_end(result, reference, at);
            engine.recompute(result);
        })
        .await
    }

    /// Terminal report: the runner is done with the execution.
    pub async fn finish(&self, execution_id: &str, at: DateTime<Utc>) -> AppResult<Execution> {
        self.apply("finish", execution_id, |engine, result| {
            engine.finish(result, at);
        })
        .await
    }

    /// Infrastructure failure; drives the execution to `failed`, or `aborted`.
    pub async fn fatal(
        &self,
        execution_id: &str,
        message: &str,
        aborted: bool,
        at: DateTime<Utc>,
    ) -> AppResult<Execution> {
        self.apply("fatal", execution_id, |engine, result| {
            engine.fatal(result, message, aborted, at);
        })
        .await
    }

    async fn lock_for(&self, execution_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(execution_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry unless another report is holding or waiting on it.
    async fn release(&self, execution_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // entries are only cloned under the map lock, so the count is stable here
        let idle = locks
            .get(execution_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(execution_id);
        }
    }

    async fn apply<F>(&self, operation: &'static str, execution_id: &str, mutate: F) -> AppResult<Execution>
    where
        F: Fn(&ResultEngine, &mut ExecutionResult) + Send + Sync,
    {
        let lock = self.lock_for(execution_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.apply_locked(operation, execution_id, mutate).await
        };
        self.release(execution_id, lock).await;
        outcome
    }

    async fn apply_locked<F>(
        &self,
        operation: &'static str,
        execution_id: &str,
        mutate: F,
    ) -> AppResult<Execution>
    where
        F: Fn(&ResultEngine, &mut ExecutionResult) + Send + Sync,
    {
        let mut retries = 0;
        loop {
            let current = self
                .store
                .get(execution_id)
                .await
                .log(operation)
                .map_err(|e| AppError::store(operation, execution_id, e))?
                .log_none(operation)
                .ok_or_else(|| AppError::NotFound(format!("execution '{}'", execution_id)))?;

            if current.result.is_finished() {
                tracing::debug!(execution_id = %execution_id, operation, "Execution already finished, report ignored");
                return Ok(current);
            }

            let observed = current.result.status;
            let engine = ResultEngine::for_execution(&current);
            let mut result = current.result.clone();
            mutate(&engine, &mut result);

            let changed = result.status != observed;
            let mut update = Update::new().replace_result(result);
            if changed {
                update = update.set(Assignment::StatusAt(Utc::now()));
            }
            let guard = match observed {
                Some(status) => Filter::status(status),
                None => Filter::MissingOrEmpty(Field::Status),
            };

            let written = self
                .store
                .find_one_and_update(
                    &Filter::id(execution_id).and(guard),
                    &update,
                    None,
                    ReturnDocument::After,
                )
                .await
                .map_err(|e| AppError::store(operation, execution_id, e))?;

            match written {
                Some(updated) => {
                    if changed {
                        self.listeners.notify(&updated, observed).await;
                    }
                    return Ok(updated);
                }
                None if retries < self.retry_limit => {
                    retries += 1;
                    tracing::debug!(
                        execution_id = %execution_id,
                        operation,
                        attempt = retries,
                        "Status changed during report, retrying"
                    );
                }
                None => {
                    return Err(AppError::Conflict(format!(
                        "{} for execution '{}' kept losing to concurrent status changes",
                        operation, execution_id
                    )));
                }
            }
        }
    }
}
