//! Result engine.
//!
//! Turns the raw step reports of one execution into a consistent result:
//!
//! - **Tree**: arena view of the step signature
//! - **Status**: group and execution status derivation
//! - **Timeline**: monotonic timestamp calibration
//! - **Pauses**: pause intervals and duration accounting
//! - **Result**: the recompute pipeline tying the above together

pub mod pauses;
pub mod result;
pub mod status;
pub mod timeline;
pub mod tree;

pub use result::ResultEngine;
pub use tree::{NodeId, SignatureNode, SignatureTree};
