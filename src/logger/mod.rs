// Local time formatting for log records.
use chrono::Local;

// Global log level filter (e.g., Debug, Info, Warn, Error).
use log::LevelFilter;

// Dispatch builder for combining logger outputs.
use fern::Dispatch;

// JSON envelope for structured file output.
use serde_json::Value as JsonValue;

// Standard I/O and filesystem operations (stdout, log file creation).
use std::{fs, io};

// Used to initialize a static value only once in a thread-safe way.
use std::sync::OnceLock;

use crate::config::LoggerConfig;

/// A simple Logger struct that wraps logging functions.
/// Clonable to allow use across multiple threads/tasks.
#[derive(Clone)]
pub struct Logger;

impl Logger {
    /// Logs a message at DEBUG level
    pub fn debug(&self, msg: &str) {
        log::debug!("{}", msg);
    }

    /// Logs a message at INFO level
    pub fn info(&self, msg: &str) {
        log::info!("{}", msg);
    }

    /// Logs a message at WARN level
    pub fn warn(&self, msg: &str) {
        log::warn!("{}", msg);
    }

    /// Logs a message at ERROR level
    pub fn error(&self, msg: &str) {
        log::error!("{}", msg);
    }
}

/// Static global LOGGER instance, initialized once
static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Initialize the global logger exactly once, according to the provided settings.
/// After this call, all calls to `log::debug!(), info!(), warn!(), error!()` (and the
/// `Logger` methods) go through the configured fern dispatcher.
pub fn init_logger(name: &str, cfg: &LoggerConfig) -> Logger {
    LOGGER
        .get_or_init(|| {
            // ────────────────────────────────────────────────────────────────
            // 1) Parse the configured level string into a log::LevelFilter
            //    If parsing fails, we default to Debug (most verbose).
            // ────────────────────────────────────────────────────────────────
            let level = cfg
                .log_level
                .parse::<LevelFilter>()
                .unwrap_or(LevelFilter::Debug);

            let mut base = Dispatch::new().level(level);

            // ────────────────────────────────────────────────────────────────
            // 2) Console branch: timestamp, name, level, message with ANSI
            //    colors, piped to stdout.
            // ────────────────────────────────────────────────────────────────
            if cfg.enable_console_log {
                let nm = name.to_string();
                let datefmt = cfg.date_format.clone();

                let log_format_console = move |out: fern::FormatCallback,
                                               message: &std::fmt::Arguments,
                                               record: &log::Record| {
                    out.finish(format_args!(
                        "\x1b[92m{}\x1b[0m - \x1b[94m{}\x1b[0m - {} - {}",
                        Local::now().format(&datefmt),
                        nm,
                        record.level(),
                        message
                    ))
                };

                base = base.chain(
                    Dispatch::new()
                        .format(log_format_console)
                        .chain(io::stdout()),
                );
            }

            // ────────────────────────────────────────────────────────────────
            // 3) File branch: plain text lines or a JSON envelope, written to
            //    "<log_file_path>/<name>.log".
            // ────────────────────────────────────────────────────────────────
            if cfg.enable_file_log {
                // Ensure the directory exists (no-op if empty or already present)
                if !cfg.log_file_path.is_empty() {
                    let _ = fs::create_dir_all(&cfg.log_file_path);
                }

                let nm = name.to_string();
                let datefmt = cfg.date_format.clone();
                let enable_json = cfg.enable_json_log;

                let filepath = if cfg.log_file_path.is_empty() {
                    format!("{}.log", nm.replace('.', "_"))
                } else {
                    format!("{}/{}.log", cfg.log_file_path, nm.replace('.', "_"))
                };

                let log_format_file = move |out: fern::FormatCallback,
                                            message: &std::fmt::Arguments,
                                            record: &log::Record| {
                    if enable_json {
                        // Keep the message as a JSON object when it already is one
                        let raw = message.to_string();
                        let message_json: JsonValue =
                            serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw.clone()));

                        let envelope = serde_json::json!({
                            "timestamp": Local::now().format(&datefmt).to_string(),
                            "name":      nm,
                            "level":     record.level().to_string(),
                            "message":   message_json
                        });

                        out.finish(format_args!("{}", envelope))
                    } else {
                        out.finish(format_args!(
                            "{} - {} - {} - {}",
                            Local::now().format(&datefmt),
                            nm,
                            record.level(),
                            message
                        ))
                    }
                };

                // Attempt to open the logfile, but don't panic; fall back to a sink on error
                let file_output: Box<dyn io::Write + Send> = match fern::log_file(&filepath) {
                    Ok(fh) => Box::new(fh),
                    Err(err) => {
                        eprintln!("Warning: could not open log file {}: {}", filepath, err);
                        Box::new(io::sink())
                    }
                };

                base = base.chain(Dispatch::new().format(log_format_file).chain(file_output));
            }

            // ────────────────────────────────────────────────────────────────
            // 4) Apply the composed dispatcher as the global logger
            // ────────────────────────────────────────────────────────────────
            base.apply().unwrap();

            Logger
        })
        .clone()
}
