use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, Metadata, Record};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

const CRATE_TARGET: &str = "orau";

static STUDIO_LOGGER: Lazy<StudioLogger> = Lazy::new(StudioLogger::new);

pub fn init() -> Result<(), String> {
    init_with_config(LoggerConfig::default())
}

pub fn init_with_config(config: LoggerConfig) -> Result<(), String> {
    STUDIO_LOGGER.update_config(config.clone());

    if let Err(e) = log::set_logger(&*STUDIO_LOGGER) {
        return Err(format!("Failed to set logger: {:?}", e));
    }

    log::set_max_level(config.min_level.to_log_level_filter());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::Cyan,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            LogLevel::Trace => "🔍",
            LogLevel::Debug => "🐛",
            LogLevel::Info => "💡",
            LogLevel::Warn => "⚠️",
            LogLevel::Error => "❌",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Parses `RUST_LOG`-style level names, case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn to_log_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::Trace,
            LogLevel::Debug => Level::Debug,
            LogLevel::Info => Level::Info,
            LogLevel::Warn => Level::Warn,
            LogLevel::Error => Level::Error,
        }
    }

    pub fn to_log_level_filter(&self) -> log::LevelFilter {
        self.to_log_level().to_level_filter()
    }

    pub fn from_log_level(level: Level) -> Self {
        match level {
            Level::Trace => LogLevel::Trace,
            Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }
}

/// One emitted record, as written to the JSON sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub target: String,
    pub file: String,
    pub line: u32,
    pub thread_id: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: String, target: String, file: String, line: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message,
            target,
            file,
            line,
            thread_id: format!("{:?}", std::thread::current().id()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub show_colors: bool,
    pub show_emojis: bool,
    pub show_thread_id: bool,
    pub show_file_location: bool,
    pub show_target: bool,
    pub include_timestamp: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_to_file: bool,
    pub log_file_path: String,
    pub custom_prefix: Option<String>,
    /// Threshold for records from other crates (actix, hyper, reqwest).
    pub dependency_level: LogLevel,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: true,
            show_emojis: true,
            show_thread_id: false,
            show_file_location: false,
            show_target: true,
            include_timestamp: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            log_to_file: false,
            log_file_path: "orau.log".to_string(),
            custom_prefix: None,
            dependency_level: LogLevel::Warn,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_file_output(mut self, path: &str) -> Self {
        self.log_to_file = true;
        self.log_file_path = path.to_string();
        self
    }

    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.output_json = enabled;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.custom_prefix = Some(prefix.into());
        self
    }

    fn threshold_for(&self, target: &str) -> LogLevel {
        if target == CRATE_TARGET || target.starts_with("orau::") {
            self.min_level
        } else {
            self.min_level.max(self.dependency_level)
        }
    }

    /// `ORAU_LOG` picks the level, `ORAU_LOG_JSON=true` switches to JSON lines.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(level) = std::env::var("ORAU_LOG").ok().and_then(|l| LogLevel::parse(&l)) {
            config.min_level = level;
        }
        if std::env::var("ORAU_LOG_JSON").map_or(false, |v| v == "true") {
            config.output_json = true;
            config.show_colors = false;
            config.show_emojis = false;
        }
        config
    }

    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: false,
            show_emojis: false,
            output_json: true,
            log_to_file: true,
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_colors: true,
            show_emojis: true,
            output_json: false,
            show_file_location: true,
            ..Default::default()
        }
    }
}

pub struct StudioLogger {
    config: Mutex<LoggerConfig>,
    log_file: Mutex<Option<File>>,
}

impl StudioLogger {
    pub fn new() -> Self {
        Self {
            config: Mutex::new(LoggerConfig::default()),
            log_file: Mutex::new(None),
        }
    }

    pub fn update_config(&self, new_config: LoggerConfig) {
        if new_config.log_to_file {
            if let Ok(file) = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&new_config.log_file_path)
            {
                if let Ok(mut log_file) = self.log_file.lock() {
                    *log_file = Some(file);
                }
            }
        }

        if let Ok(mut config) = self.config.lock() {
            *config = new_config;
        }
    }

    fn format_line(&self, entry: &LogEntry, config: &LoggerConfig) -> String {
        let style = |text: &str, paint: fn(&str) -> ColoredString| {
            if config.show_colors {
                paint(text).to_string()
            } else {
                text.to_string()
            }
        };

        let mut parts: Vec<String> = Vec::with_capacity(4);
        if let Some(prefix) = &config.custom_prefix {
            parts.push(format!("[{}]", style(prefix, |t| t.bright_white().bold())));
        }
        if config.include_timestamp {
            let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
            parts.push(style(&timestamp, |t| t.bright_black()));
        }

        let level = if config.show_emojis {
            format!("{} {}", entry.level.emoji(), entry.level.as_str())
        } else {
            entry.level.as_str().to_string()
        };
        parts.push(if config.show_colors {
            format!("[{}]", level.color(entry.level.color()).bold())
        } else {
            format!("[{}]", level)
        });

        let mut line = parts.join(" ");
        line.push(' ');
        if config.show_target && !entry.target.is_empty() {
            line.push_str(&style(&entry.target, |t| t.bright_blue()));
            line.push_str(": ");
        }
        line.push_str(&entry.message);

        if config.show_thread_id {
            line.push_str(&format!(" [thread:{}]", entry.thread_id));
        }
        if config.show_file_location {
            let location = format!("{}:{}", entry.file, entry.line);
            line.push_str(&format!(" ({})", style(&location, |t| t.bright_black())));
        }
        line
    }

    fn write_to_file(&self, entry: &LogEntry, config: &LoggerConfig) {
        if let Ok(mut guard) = self.log_file.lock() {
            if let Some(ref mut file) = *guard {
                // file sinks never carry ANSI colour codes
                let content = if config.output_json {
                    serde_json::to_string(entry).unwrap_or_default()
                } else {
                    let plain = LoggerConfig {
                        show_colors: false,
                        ..config.clone()
                    };
                    self.format_line(entry, &plain)
                };
                let _ = writeln!(file, "{}", content);
            }
        }
    }

    fn create_log_entry(&self, record: &Record) -> LogEntry {
        LogEntry::new(
            LogLevel::from_log_level(record.level()),
            record.args().to_string(),
            record.target().to_string(),
            record.file().unwrap_or("unknown").to_string(),
            record.line().unwrap_or(0),
        )
    }
}

impl Default for StudioLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl log::Log for StudioLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.config.lock() {
            Ok(config) => metadata.level() <= config.threshold_for(metadata.target()).to_log_level(),
            Err(_) => true,
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let entry = self.create_log_entry(record);
        if let Ok(config) = self.config.lock() {
            if config.output_json {
                eprintln!("{}", serde_json::to_string(&entry).unwrap_or_default());
            } else {
                eprintln!("{}", self.format_line(&entry, &config));
            }

            if config.log_to_file {
                self.write_to_file(&entry, &config);
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
        if let Ok(mut guard) = self.log_file.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.flush();
            }
        }
    }
}

/// Logs how long a named operation took when dropped.
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("⏱️  Starting timer: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        log::info!("⏱️  {} completed in {}ms", self.name, self.elapsed().as_millis());
    }
}

pub fn timer(name: &str) -> Timer {
    Timer::new(name)
}

pub fn log_startup_info(app_name: &str, version: &str, port: u16) {
    log::info!("🚀 Starting {} v{}", app_name, version);
    log::info!("🌐 Server will run on http://0.0.0.0:{}", port);
}

pub fn log_config_info(config: &crate::config::Config) {
    log::info!("⚙️  Configuration loaded:");
    log::info!("   Port: {}", config.port.unwrap_or(8080));
    log::info!(
        "   Replicate key: {}",
        if config.replicate.as_ref().map_or(false, |r| r.api_key.is_some()) {
            "✅"
        } else {
            "❌"
        }
    );
    log::info!(
        "   Supabase: {}",
        if config.supabase.as_ref().map_or(false, |s| s.is_configured()) {
            "✅"
        } else {
            "❌"
        }
    );
    log::info!("   Bucket: {}", config.bucket());
    log::info!(
        "   In-memory storage: {}",
        if config.use_memory_storage { "✅" } else { "❌" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert_eq!(LogLevel::Info.as_str(), "INFO");
        assert_eq!(LogLevel::Error.emoji(), "❌");
        assert_eq!(LogLevel::Debug.color(), Color::Blue);
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
        assert!(LogLevel::Trace < LogLevel::Error);
    }

    #[test]
    fn test_logger_config() {
        let config = LoggerConfig::development();
        assert_eq!(config.min_level, LogLevel::Debug);
        assert!(config.show_colors);

        let prod_config = LoggerConfig::production();
        assert!(!prod_config.show_colors);
        assert!(prod_config.output_json);
    }

    #[test]
    fn test_plain_line_format() {
        let logger = StudioLogger::new();
        let config = LoggerConfig::new()
            .with_colors(false)
            .with_prefix("orau");
        let config = LoggerConfig {
            show_emojis: false,
            include_timestamp: false,
            ..config
        };
        let entry = LogEntry::new(
            LogLevel::Warn,
            "upload slow".to_string(),
            "orau::storage".to_string(),
            "src/storage/supabase.rs".to_string(),
            10,
        );
        assert_eq!(
            logger.format_line(&entry, &config),
            "[orau] [WARN] orau::storage: upload slow"
        );
    }

    #[test]
    fn test_dependency_records_are_quieter() {
        let config = LoggerConfig::development();
        assert_eq!(config.threshold_for("orau::studio::service"), LogLevel::Debug);
        assert_eq!(config.threshold_for("actix_server::builder"), LogLevel::Warn);
        let config = config.with_level(LogLevel::Error);
        assert_eq!(config.threshold_for("hyper::proto"), LogLevel::Error);
    }

    #[test]
    fn test_logger_initialization() {
        let config = LoggerConfig::development();
        assert!(init_with_config(config).is_ok());
    }
}
