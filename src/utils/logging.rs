//! Logger setup and a conditional debug macro for hot loops.

/// Install the global `env_logger`, honouring `RUST_LOG` and falling back to
/// `default_level`. Safe to call more than once.
pub fn init_logging(default_level: log::LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Debug logging gated by the calling module's `ENABLE_LOGS` const.
///
/// Each module that uses this macro must define:
/// ```ignore
/// const ENABLE_LOGS: bool = true; // or false
/// ```
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
