//! Bounded windows of pipeline log entries and remote invocation metrics.
//!
//! Every entry is also emitted as a `tracing` event so it reaches the configured subscriber.

use chrono::DateTime;
use chrono::Local;
use chrono::Utc;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::PoisonError;
use tracing::error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Logical service an entry belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceTag {
    Tagging,
    InputStore,
    OutputStore,
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tagging => write!(f, "tagging"),
            Self::InputStore => write!(f, "input-store"),
            Self::OutputStore => write!(f, "output-store"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub service: ServiceTag,
}

/// Remote invocations aggregated per minute
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricPoint {
    /// `H:MM` local time
    pub time_bucket: String,
    pub invocations: u32,
    pub last_duration_ms: u64,
    pub errors: u32,
}

#[derive(Debug)]
pub struct Telemetry {
    logs: Mutex<VecDeque<LogEntry>>,
    metrics: Mutex<VecDeque<MetricPoint>>,
    log_capacity: usize,
    metric_capacity: usize,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_LOG_CAPACITY, Self::DEFAULT_METRIC_CAPACITY)
    }
}

impl Telemetry {
    pub const DEFAULT_LOG_CAPACITY: usize = 50;
    pub const DEFAULT_METRIC_CAPACITY: usize = 20;

    #[must_use]
    pub fn with_capacity(log_capacity: usize, metric_capacity: usize) -> Self {
        Self {
            logs: Mutex::new(VecDeque::with_capacity(log_capacity)),
            metrics: Mutex::new(VecDeque::with_capacity(metric_capacity)),
            log_capacity: log_capacity.max(1),
            metric_capacity: metric_capacity.max(1),
        }
    }

    pub fn log(&self, level: LogLevel, service: ServiceTag, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => info!(service = %service, "{}", message),
            LogLevel::Warn => warn!(service = %service, "{}", message),
            LogLevel::Error => error!(service = %service, "{}", message),
        }
        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            message,
            service,
        };
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.push_front(entry);
        logs.truncate(self.log_capacity);
    }

    /// Record one remote invocation in the current minute bucket.
    pub fn record_invocation(&self, duration_ms: u64, error: bool) {
        let bucket = Local::now().format("%-H:%M").to_string();
        self.record_invocation_in(bucket, duration_ms, error);
    }

    /// Same bucket as the newest point accumulates; a new bucket evicts the oldest when full.
    pub fn record_invocation_in(&self, time_bucket: String, duration_ms: u64, error: bool) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = metrics.back_mut()
            && last.time_bucket == time_bucket
        {
            last.invocations += 1;
            last.last_duration_ms = duration_ms;
            last.errors += u32::from(error);
            return;
        }
        if metrics.len() == self.metric_capacity {
            metrics.pop_front();
        }
        metrics.push_back(MetricPoint {
            time_bucket,
            invocations: 1,
            last_duration_ms: duration_ms,
            errors: u32::from(error),
        });
    }

    /// Newest first
    #[must_use]
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Oldest first
    #[must_use]
    pub fn metrics(&self) -> Vec<MetricPoint> {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
