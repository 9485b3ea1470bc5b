//! Audit trail for device events.
//!
//! Frequency changes, actuator failures, truncating opens and the daemon's
//! start and stop are appended to a JSONL file.

use chardev_io::DeviceEvent;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Daemon startup
    SystemStart,
    /// Daemon shutdown
    SystemShutdown,
    /// Actuation frequency accepted
    FrequencyChanged,
    /// Output line could not be acquired
    ActuatorUnavailable,
    /// Buffer truncated by an open
    BufferTruncated,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Microseconds since the logger was created
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    /// Additional event-specific details
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
    started: Instant,
}

impl AuditLogger {
    /// Create a new audit logger writing to the specified path.
    /// The file is opened in append mode to preserve existing logs.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
            started: Instant::now(),
        })
    }

    pub fn log(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("audit writer poisoned"))?;
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Log an event stamped with the current time.
    pub fn log_event(
        &self,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        let unix_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        self.log(&AuditEntry {
            timestamp_us: self.started.elapsed().as_micros() as u64,
            unix_us,
            event_type,
            details,
        })
    }

    pub fn log_device_event(&self, event: &DeviceEvent) -> std::io::Result<()> {
        let (event_type, details) = match event {
            DeviceEvent::BufferTruncated { minor } => (
                AuditEventType::BufferTruncated,
                serde_json::json!({ "minor": minor }),
            ),
            DeviceEvent::FrequencyChanged { frequency_hz } => (
                AuditEventType::FrequencyChanged,
                serde_json::json!({ "frequency_hz": frequency_hz }),
            ),
            DeviceEvent::ActuatorUnavailable { line_id } => (
                AuditEventType::ActuatorUnavailable,
                serde_json::json!({ "line_id": line_id }),
            ),
        };
        self.log_event(event_type, details)
    }
}
