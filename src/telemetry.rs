//! Fire-and-forget telemetry for engine decisions.

use serde::Serialize;
use serde_json::Value;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const RECOMMENDATION_COMPLETED: &str = "recommendation.completed";
pub const GENERATION_FAILED: &str = "generation.failed";
pub const QUALITY_REPAIRED: &str = "quality.repaired";
pub const CACHE_HIT: &str = "cache.hit";

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub timestamp_ms: i64,
    pub event: String,
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("telemetry worker failed: {0}")]
    Join(String),
}

/// Receives engine events. Implementations must never block the caller or fail it.
pub trait TelemetrySink: Send + Sync {
    fn log(&self, event: &str, payload: Value);
}

pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn log(&self, _event: &str, _payload: Value) {}
}

/// Emits each event as a `tracing` info record.
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn log(&self, event: &str, payload: Value) {
        tracing::info!(target: "sportsync_engine::telemetry", event, payload = %payload, "telemetry");
    }
}

// =============================================================================
// JSONL
// =============================================================================

/// Appends one JSON line per event from a background thread.
#[derive(Clone)]
pub struct JsonlTelemetrySink {
    sender: mpsc::Sender<TelemetryEvent>,
}

/// Owns the writer thread. The thread finishes once every sink clone is dropped.
pub struct TelemetryWorker {
    handle: Option<std::thread::JoinHandle<Result<usize, TelemetryError>>>,
}

impl TelemetryWorker {
    /// Wait for the writer to drain. Returns the number of events written.
    pub fn join(mut self) -> Result<usize, TelemetryError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(TelemetryError::Join("telemetry worker panicked".to_string())),
            },
            None => Ok(0),
        }
    }
}

impl JsonlTelemetrySink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TelemetryWorker), TelemetryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = mpsc::channel::<TelemetryEvent>();
        let handle = std::thread::spawn(move || write_event_loop(file, receiver));
        Ok((
            Self { sender },
            TelemetryWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl TelemetrySink for JsonlTelemetrySink {
    fn log(&self, event: &str, payload: Value) {
        let record = TelemetryEvent {
            timestamp_ms: now_epoch_ms(),
            event: event.to_string(),
            payload,
        };
        if self.sender.send(record).is_err() {
            tracing::debug!(event, "telemetry writer closed; event dropped");
        }
    }
}

fn write_event_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<TelemetryEvent>,
) -> Result<usize, TelemetryError> {
    let mut writer = BufWriter::new(file);
    let mut written = 0usize;
    for event in receiver {
        let line = serde_json::to_string(&event).map_err(|e| TelemetryError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
