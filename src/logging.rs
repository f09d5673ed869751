//! Process-wide log sink
//!
//! Every `tracing` event emitted by the bot ends up here. A record is written
//! as one colored line on the console and appended to a per-day log file named
//! after the current UTC date.

use chrono::{SecondsFormat, Utc};
use colored::Colorize;
use serde_json::{Map, Value};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Severity of a log record. Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

impl From<&Level> for LogLevel {
    fn from(level: &Level) -> Self {
        match *level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warn,
            Level::INFO => LogLevel::Info,
            // Only four levels are recognized, trace folds into debug
            _ => LogLevel::Debug,
        }
    }
}

/// Level-filtered writer to the console and a daily log file
pub struct Logger {
    min_level: LogLevel,
    log_dir: PathBuf,
    console: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    /// Create a logger that writes to stdout and to files under `log_dir`
    ///
    /// # Arguments
    /// * `min_level` - Records less severe than this are dropped
    /// * `log_dir` - Directory for the daily log files, created if missing
    pub fn new(min_level: LogLevel, log_dir: impl Into<PathBuf>) -> Self {
        Self::with_console(min_level, log_dir, Box::new(io::stdout()))
    }

    /// Create a logger with an explicit console writer
    pub fn with_console(
        min_level: LogLevel,
        log_dir: impl Into<PathBuf>,
        console: Box<dyn Write + Send>,
    ) -> Self {
        let log_dir = log_dir.into();
        if let Err(e) = fs::create_dir_all(&log_dir) {
            eprintln!(
                "{}",
                format!("Failed to create log directory {}: {}", log_dir.display(), e).red()
            );
        }

        Logger {
            min_level,
            log_dir,
            console: Mutex::new(console),
        }
    }

    /// Check whether a record at `level` passes the configured minimum
    pub fn should_log(&self, level: LogLevel) -> bool {
        level <= self.min_level
    }

    /// Path of the log file for the current UTC day
    pub fn current_log_file(&self) -> PathBuf {
        log_file_for(&self.log_dir, &Utc::now().format("%Y-%m-%d").to_string())
    }

    /// Write one record
    ///
    /// # Arguments
    /// * `level` - Severity of the record
    /// * `message` - The log message
    /// * `extra` - Optional structured payload, pretty-printed into the file
    pub fn log(&self, level: LogLevel, message: &str, extra: Option<&Value>) {
        if !self.should_log(level) {
            return;
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format_line(&timestamp, level, message);

        let mut record = line.clone();
        if let Some(extra) = extra {
            let pretty = serde_json::to_string_pretty(extra).unwrap_or_else(|_| extra.to_string());
            record.push('\n');
            record.push_str(&pretty);
        }
        record.push('\n');

        if let Err(e) = self.append(&record) {
            self.write_console(
                &format!("Failed to write to log file: {}", e)
                    .red()
                    .to_string(),
            );
        }

        let console_line = match extra {
            Some(extra) => format!("{} {}", line, extra),
            None => line,
        };
        let colored = match level {
            LogLevel::Error => console_line.red(),
            LogLevel::Warn => console_line.yellow(),
            LogLevel::Info => console_line.cyan(),
            LogLevel::Debug => console_line.magenta(),
        };
        self.write_console(&colored.to_string());
    }

    fn append(&self, record: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_log_file())?;
        file.write_all(record.as_bytes())
    }

    fn write_console(&self, line: &str) {
        // A poisoned console lock still holds a usable writer
        let mut console = match self.console.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(console, "{}", line);
        let _ = console.flush();
    }
}

/// Format the first line of a log record
pub fn format_line(timestamp: &str, level: LogLevel, message: &str) -> String {
    format!("[{}] [{}] {}", timestamp, level, message)
}

fn log_file_for(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("bot-{}.log", date))
}

/// Bridges `tracing` events into the [`Logger`]
pub struct LoggerLayer {
    logger: Logger,
}

impl LoggerLayer {
    pub fn new(logger: Logger) -> Self {
        LoggerLayer { logger }
    }
}

impl<S: Subscriber> Layer<S> for LoggerLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = LogLevel::from(event.metadata().level());
        if !self.logger.should_log(level) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let extra = if visitor.fields.is_empty() {
            None
        } else {
            Some(Value::Object(visitor.fields))
        };
        self.logger.log(level, &visitor.message, extra.as_ref());
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}

/// Install the logger as the global `tracing` subscriber
///
/// Events from this crate pass at every level; dependencies only reach the
/// logger at `warn` and above.
pub fn init(logger: Logger) -> anyhow::Result<()> {
    let targets = Targets::new()
        .with_target(env!("CARGO_CRATE_NAME"), Level::TRACE)
        .with_default(Level::WARN);

    tracing_subscriber::registry()
        .with(LoggerLayer::new(logger).with_filter(targets))
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn test_logger(level: LogLevel) -> (Logger, SharedBuffer, TempDir) {
        let dir = TempDir::new().unwrap();
        let console = SharedBuffer::default();
        let logger = Logger::with_console(level, dir.path(), Box::new(console.clone()));
        (logger, console, dir)
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" info ".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_debug_suppressed_under_warn() {
        let (logger, console, _dir) = test_logger(LogLevel::Warn);

        logger.log(LogLevel::Debug, "should not appear", None);
        logger.log(LogLevel::Info, "nor this", None);

        assert!(console.lines().is_empty());
        assert!(!logger.current_log_file().exists());
    }

    #[test]
    fn test_error_always_written() {
        for min in [LogLevel::Error, LogLevel::Warn, LogLevel::Info, LogLevel::Debug] {
            let (logger, console, _dir) = test_logger(min);

            logger.log(LogLevel::Error, "boom", None);

            assert_eq!(console.lines().len(), 1);
            let contents = fs::read_to_string(logger.current_log_file()).unwrap();
            assert_eq!(contents.lines().count(), 1);
            assert!(contents.contains("[ERROR] boom"));
        }
    }

    #[test]
    fn test_extra_is_pretty_printed_in_file() {
        let (logger, console, _dir) = test_logger(LogLevel::Info);

        logger.log(LogLevel::Warn, "Rate limit hit", Some(&json!({"path": "/channels", "global": false})));

        assert_eq!(console.lines().len(), 1);
        let contents = fs::read_to_string(logger.current_log_file()).unwrap();
        let mut lines = contents.lines();
        assert!(lines.next().unwrap().ends_with("[WARN] Rate limit hit"));
        assert_eq!(lines.next(), Some("{"));
        assert!(contents.contains("  \"path\": \"/channels\""));
    }

    #[test]
    fn test_file_named_by_utc_date() {
        let (logger, _console, dir) = test_logger(LogLevel::Info);
        let expected = dir
            .path()
            .join(format!("bot-{}.log", Utc::now().format("%Y-%m-%d")));
        assert_eq!(logger.current_log_file(), expected);
    }

    #[test]
    fn test_unwritable_file_reports_to_console() {
        let dir = TempDir::new().unwrap();
        // A regular file where the log directory should be
        let bogus = dir.path().join("not_a_dir");
        fs::write(&bogus, "x").unwrap();
        let console = SharedBuffer::default();
        let logger = Logger::with_console(LogLevel::Info, &bogus, Box::new(console.clone()));

        logger.log(LogLevel::Info, "still fine", None);

        let lines = console.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Failed to write to log file"));
        assert!(lines[1].contains("still fine"));
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line("2024-01-01T00:00:00.000Z", LogLevel::Info, "hello"),
            "[2024-01-01T00:00:00.000Z] [INFO] hello"
        );
    }
}
