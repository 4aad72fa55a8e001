use std::sync::{Arc, OnceLock};

/// Receiver for log records emitted by the bridge core.
///
/// Implemented on the host side (Swift / Kotlin) and registered once with
/// [`set_logger`]. Records are forwarded as plain strings; the core never
/// includes session tokens or pass payload bytes in a message.
///
/// ## Swift
///
/// ```swift
/// final class BridgeLogger: WalletBridge.Logger {
///     func log(level: WalletBridge.LogLevel, message: String) {
///         os_log("%{public}@", message)
///     }
/// }
///
/// WalletBridge.setLogger(logger: BridgeLogger()) // once, at plugin init
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing output.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of provisioning sessions and commands.
    Info,
    /// Recoverable problems, e.g. a late platform callback.
    Warn,
    /// Failed commands and sessions.
    Error,
}

/// Bridges the `log` facade to the registered foreign [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let is_record_from_walletbridge = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("walletbridge"));

        let is_debug_or_trace_level =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;

        // Dependencies (reqwest, rustls, ...) are only forwarded from Info up.
        if is_debug_or_trace_level && !is_record_from_walletbridge {
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

/// Registers the host logger and installs the `log` bridge.
///
/// Only the first registration takes effect; later calls are reported and
/// ignored.
#[uniffi::export]
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
