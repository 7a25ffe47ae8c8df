// Serde derive for reading settings from a JSON config file.
use serde::Deserialize;

// This helper tells us how many CPU cores are available.
use num_cpus;

//////////////////////
// ServerConfig     //
//////////////////////

/// All the settings the relay server needs. Every field has a default so the
/// binary runs with no config file at all; a JSON file given as the first
/// CLI argument overrides any subset of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP or hostname to listen on (e.g. `"127.0.0.1"`)
    pub host: String,

    /// Port number (e.g. `8000`)
    pub port: u16,

    /// How many Tokio worker threads to run
    pub worker_threads: usize,

    /// Milliseconds to sleep after a failed accept
    pub accept_error_backoff_ms: u64,

    /// Seconds before an in-flight translation request is abandoned by the
    /// HTTP client (surfaces as an ordinary provider failure)
    pub translate_timeout_secs: u64,

    /// Logging settings
    pub logger: LoggerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            worker_threads: num_cpus::get(),
            accept_error_backoff_ms: 100,
            translate_timeout_secs: 120,
            logger: LoggerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load settings from a JSON file, filling anything missing with defaults.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

//////////////////////
// LoggerConfig     //
//////////////////////

/// Settings consumed by `logger::init_logger`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Minimum level to record ("trace", "debug", "info", "warn", "error")
    pub log_level: String,

    /// Mirror log records to stdout with ANSI colors
    pub enable_console_log: bool,

    /// Also write log records to a file
    pub enable_file_log: bool,

    /// Emit file records as a JSON envelope instead of plain lines
    pub enable_json_log: bool,

    /// Directory for the log file; empty means the working directory
    pub log_file_path: String,

    /// Timestamp format for log records
    pub date_format: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            enable_console_log: true,
            enable_file_log: false,
            enable_json_log: false,
            log_file_path: String::new(),
            date_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        }
    }
}
