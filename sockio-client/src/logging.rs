//! Logging macros for the client
//!
//! With the `logging` feature the macros forward to `tracing`; without it
//! they only type-check their arguments. No output appears until the
//! application installs a subscriber.

/// Log an error message
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            tracing::error!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

/// Log a debug message
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            tracing::debug!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

/// Log a trace message
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            tracing::trace!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}
