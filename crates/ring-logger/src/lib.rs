//! Ring Logger
//!
//! Keeps the most recent log records in a fixed-size circular buffer so the
//! tracker page and the offline agent can surface diagnostics without a
//! file system. Accepts records from both the `log` facade and `tracing`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{Level, LevelFilter, Metadata, Record};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Default number of records retained
pub const DEFAULT_CAPACITY: usize = 256;

/// One captured log record
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: Level,
    pub target: String,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:<5} {}: {}", self.timestamp, self.level, self.target, self.message)
    }
}

/// Shared circular buffer of log entries
#[derive(Debug, Clone)]
pub struct RingBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // A panic while holding the lock leaves a usable buffer behind
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry, evicting the oldest when full
    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Copy of the buffered entries, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn record(&self, level: Level, target: &str, message: String) {
        let entry = LogEntry {
            timestamp: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
            level,
            target: target.to_string(),
            message,
        };
        mirror_to_console(&entry);
        self.push(entry);
    }
}

#[cfg(target_arch = "wasm32")]
fn mirror_to_console(entry: &LogEntry) {
    let line = entry.to_string();
    match entry.level {
        Level::Error => web_sys::console::error_1(&line.into()),
        Level::Warn => web_sys::console::warn_1(&line.into()),
        _ => web_sys::console::log_1(&line.into()),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn mirror_to_console(_entry: &LogEntry) {}

// ========================
// `log` facade
// ========================

/// `log::Log` implementation writing into a [`RingBuffer`]
pub struct RingLogger {
    buffer: RingBuffer,
    level: LevelFilter,
}

impl RingLogger {
    pub fn new(buffer: RingBuffer, level: LevelFilter) -> Self {
        Self { buffer, level }
    }
}

impl log::Log for RingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.buffer.record(record.level(), record.target(), record.args().to_string());
    }

    fn flush(&self) {}
}

/// Install a global `log` logger and return its buffer
pub fn init_logger(capacity: usize, level: LevelFilter) -> Result<RingBuffer, log::SetLoggerError> {
    let buffer = RingBuffer::new(capacity);
    log::set_boxed_logger(Box::new(RingLogger::new(buffer.clone(), level)))?;
    log::set_max_level(level);
    Ok(buffer)
}

// ========================
// `tracing` layer
// ========================

/// `tracing_subscriber` layer writing events into a [`RingBuffer`]
pub struct RingLayer {
    buffer: RingBuffer,
}

impl RingLayer {
    pub fn new(buffer: RingBuffer) -> Self {
        Self { buffer }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.join(" ")
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

fn level_of(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::ERROR => Level::Error,
        tracing::Level::WARN => Level::Warn,
        tracing::Level::INFO => Level::Info,
        tracing::Level::DEBUG => Level::Debug,
        tracing::Level::TRACE => Level::Trace,
    }
}

impl<S: tracing::Subscriber> Layer<S> for RingLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.buffer.record(level_of(metadata.level()), metadata.target(), visitor.finish());
    }
}

/// Install a global `tracing` subscriber backed by `buffer`
pub fn init_tracing(buffer: RingBuffer) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::registry().with(RingLayer::new(buffer));
    tracing::subscriber::set_global_default(subscriber)
}
