//! Execution persistence.
//!
//! The scheduling components talk to an [`ExecutionStore`]; the backend is
//! picked once at startup and shared as `Arc<dyn ExecutionStore>`.

pub mod filter;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod store;
pub mod update;

pub use filter::{Field, Filter};
pub use memory::MemoryExecutionStore;
pub use pool::{create_pool, DbPool};
pub use postgres::PostgresExecutionStore;
pub use store::{ExecutionCursor, ExecutionStore, ReturnDocument, Sort, StoreError, StoreResult};
pub use update::{Assignment, Update, UpdateOp};
