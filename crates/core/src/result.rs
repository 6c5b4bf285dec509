//! Result type definition and extension traits.
//!
//! Provides combinators for the skip-and-warn recoveries without
//! unwrap/expect/panic.

use crate::error::Error;

/// The standard Result type for badgesync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing logged recoveries for Results.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error as a warning.
    fn into_option_logged(self) -> Option<T>;

    /// Turn a skippable error (`NotFound`, `MalformedSnapshot`) into `Ok(None)`
    /// after logging it; every other error is passed through.
    ///
    /// # Errors
    ///
    /// Returns the original error when it is not skippable.
    fn skip_recoverable(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn into_option_logged(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Operation failed, skipping");
                None
            }
        }
    }

    fn skip_recoverable(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_skippable() => {
                tracing::warn!(error = %e, "Skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
