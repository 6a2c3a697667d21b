//! Bridge from the `log` facade to a host-provided logger.
//!
//! Library code logs through `log` macros. A host application (a mobile or
//! desktop wallet embedding the engine) implements [`Logger`] and installs it
//! once with [`set_logger`]. Binaries that own their subscriber (such as the
//! CLI) skip this and capture `log` records directly.

use std::sync::{Arc, OnceLock};

/// A logger that receives the engine's log records.
///
/// # Examples
///
/// ```rust
/// use recoverykit_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Swift
///
/// ```swift
/// class RecoveryLoggerBridge: RecoveryKit.Logger {
///     func log(level: RecoveryKit.LogLevel, message: String) {
///         Log.log(level.toCoreLevel(), message)
///     }
/// }
///
/// RecoveryKit.setLogger(logger: RecoveryLoggerBridge()) // once, at startup
/// ```
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum LogLevel {
    /// Very detailed messages.
    Trace,
    /// Debugging information, such as individual credential lookups.
    Debug,
    /// Progress of the recovery, such as finished identities.
    Info,
    /// Checkpoints, aborts and retried requests.
    Warn,
    /// Failures that end a recovery session.
    Error,
}

/// Forwards `log` records to the installed [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        // Debug and trace records of dependencies (reqwest, hyper, ...) are noise to the host.
        let is_record_from_recoverykit = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("recoverykit"));
        let is_debug_or_trace_level =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;
        if is_debug_or_trace_level && !is_record_from_recoverykit {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs the host logger. Only the first call has an effect.
#[cfg_attr(feature = "ffi", uniffi::export)]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct CapturingLogger {
        records: Mutex<Vec<(LogLevel, String)>>,
    }

    impl Logger for CapturingLogger {
        fn log(&self, level: LogLevel, message: String) {
            self.records.lock().unwrap().push((level, message));
        }
    }

    #[test]
    fn test_forwards_own_records_and_filters_dependency_noise() {
        let logger = Arc::new(CapturingLogger::default());
        set_logger(logger.clone());

        log::info!("identity 3 done");
        log::logger().log(
            &log::Record::builder()
                .args(format_args!("connection pool idle"))
                .level(log::Level::Debug)
                .module_path(Some("hyper::client"))
                .build(),
        );
        log::logger().log(
            &log::Record::builder()
                .args(format_args!("server closed connection"))
                .level(log::Level::Warn)
                .module_path(Some("hyper::client"))
                .build(),
        );

        let records = logger.records.lock().unwrap();
        assert!(records.contains(&(LogLevel::Info, "identity 3 done".to_string())));
        assert!(records.contains(&(LogLevel::Warn, "server closed connection".to_string())));
        assert!(!records
            .iter()
            .any(|(_, message)| message == "connection pool idle"));
    }
}
