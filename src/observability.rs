//! Logging infrastructure for pipeline observability.
//!
//! The pipeline uses `tracing` for structured logging. All events use the
//! target "logpipe" and include an `event` field for filtering.
//!
//! The crate never installs a global subscriber; embedding applications
//! configure one via `tracing_subscriber` or similar.
//!
//! Conventions:
//! - `event`: snake_case event name (required)
//! - `%` for Display, `?` for Debug formatting

/// Target for all pipeline log events.
pub(crate) const LOGPIPE_TARGET: &str = "logpipe";

/// Macro for debug-level log events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::LOGPIPE_TARGET, $($field)*)
    };
}

/// Macro for info-level log events.
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::LOGPIPE_TARGET, $($field)*)
    };
}

/// Macro for warn-level log events.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::LOGPIPE_TARGET, $($field)*)
    };
}

/// Macro for error-level log events.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::LOGPIPE_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
