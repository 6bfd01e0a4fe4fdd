/// Centralized logging macros for the TTY layer
///
/// These macros forward to `tracing`, so output, filtering and formatting
/// are decided by whichever subscriber the host installs. Without a
/// subscriber they cost a level check and nothing else.
///
/// Log debug-level message
///
/// # Example
/// ```
/// use tty_runtime::tty_debug;
/// tty_debug!("rfcomm{}: {:?} → {:?}", 0, "Unattached", "Connecting");
/// ```
#[macro_export]
macro_rules! tty_debug {
    ($($arg:tt)*) => {
        $crate::__private::tracing::debug!($($arg)*)
    };
}

/// Log info-level message
///
/// Use for device lifecycle milestones (created, attached, released)
#[macro_export]
macro_rules! tty_info {
    ($($arg:tt)*) => {
        $crate::__private::tracing::info!($($arg)*)
    };
}

/// Log warning-level message
///
/// Use for recoverable errors and unexpected conditions
#[macro_export]
macro_rules! tty_warn {
    ($($arg:tt)*) => {
        $crate::__private::tracing::warn!($($arg)*)
    };
}

/// Log error-level message
///
/// Use for failures nobody else will report, such as a lost hangup request
#[macro_export]
macro_rules! tty_error {
    ($($arg:tt)*) => {
        $crate::__private::tracing::error!($($arg)*)
    };
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    #[test]
    fn test_logging_macros_compile() {
        tty_debug!("test debug");
        tty_info!("test info");
        tty_warn!("test warn");
        tty_error!("test error");
    }

    #[test]
    fn test_logging_with_format_args() {
        tty_debug!("rfcomm{}: {} → {}", 0, "Connecting", "Connected");
        tty_info!("Device {} created on channel {}", 3, 5);
        tty_warn!("Write room {}/{}", 0, 200);
        tty_error!("Failed to release device: {}", "reaper stopped");
    }

    #[test]
    fn test_logging_with_fields() {
        tty_debug!(id = 2, open_count = 1, "port attached");
    }
}
