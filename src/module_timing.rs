use embassy_time::Duration;

/// Settle time after waking the modem out of logical sleep, before the
/// caller's command may be transmitted.
pub fn wake_settle_time() -> Duration {
    Duration::from_millis(100)
}

/// Retry delay for a timer-driven sleep command that found the command
/// channel busy.
pub fn sleep_retry_time() -> Duration {
    Duration::from_millis(500)
}

/// Default inactivity window before an automatically enabled DTR/UART wake
/// line is dropped again.
pub fn default_uart_inactivity() -> Duration {
    Duration::from_secs(10)
}

/// Response timeout used for internally generated commands (the logical
/// sleep request), which have no caller to pick a timeout for them.
pub fn internal_cmd_timeout() -> Duration {
    Duration::from_secs(10)
}
