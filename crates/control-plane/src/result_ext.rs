//! Pass-through logging for `Result` and `Option`.

use std::fmt::Display;
use tracing::error;

/// Logs an `Err` with the caller's location and a context message.
pub trait ResultExt<T, E> {
    /// ```ignore
    /// use testflow_control_plane::result_ext::ResultExt;
    ///
    /// store.get(id).await.log("loading execution for report")?;
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            error!(
                target: "testflow_control_plane",
                error = %e,
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Execution operation failed"
            );
        }
        self
    }
}

/// Logs a warning when an expected value is missing.
pub trait OptionResultExt<T> {
    fn log_none<S: ToString>(self, context: S) -> Option<T>;
}

impl<T> OptionResultExt<T> for Option<T> {
    #[track_caller]
    fn log_none<S: ToString>(self, context: S) -> Option<T> {
        if self.is_none() {
            let caller_location = std::panic::Location::caller();
            tracing::warn!(
                target: "testflow_control_plane",
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Expected execution was missing"
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::db::StoreError;

    #[test]
    fn test_log_passes_store_errors_through() {
        let result: Result<(), StoreError> = Err(StoreError::Conflict("dup".into()));
        assert!(matches!(
            result.log("inserting execution"),
            Err(StoreError::Conflict(_))
        ));
        let ok: Result<u32, StoreError> = Ok(3);
        assert_eq!(ok.log("counting").unwrap(), 3);
    }

    #[test]
    fn test_log_none_passes_value_through() {
        assert_eq!(Some("e1").log_none("lookup"), Some("e1"));
        assert!(None::<&str>.log_none("lookup").is_none());
    }
}
