//! File-style façade over one buffer device and one actuation controller.
//!
//! Minor numbers select what an open handle talks to:
//!
//! | minor | target                                   |
//! |-------|------------------------------------------|
//! | 0     | buffer, forward reads                    |
//! | 1     | the same buffer, byte-reversed reads     |
//! | 2     | actuation frequency (decimal text)       |

use crate::metrics::{
    ACTUATION_REQUESTS, BYTES_READ, BYTES_WRITTEN, OPEN_SESSIONS, OPERATIONS_REJECTED,
};
use chardev_core::{
    ActuationController, ActuationState, ActuationStats, BufferDevice, DeviceConfig, DeviceError,
    OpenFlags, OutputLine, Session, TransferIn, TransferOut, Whence,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MINOR_BUFFER: u32 = 0;
pub const MINOR_BUFFER_INVERTED: u32 = 1;
pub const MINOR_FREQUENCY: u32 = 2;

const EBADF: i32 = 9;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;
const ESPIPE: i32 = 29;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("No device registered at minor {0}")]
    UnknownMinor(u32),

    #[error("Handle {0} is not open")]
    BadHandle(u64),

    #[error("Invalid frequency payload {0:?}")]
    InvalidFrequency(String),

    #[error("Device does not support seeking")]
    NotSeekable,
}

impl EndpointError {
    pub fn errno(&self) -> i32 {
        match self {
            Self::Device(err) => err.errno(),
            Self::UnknownMinor(_) => -ENODEV,
            Self::BadHandle(_) => -EBADF,
            Self::InvalidFrequency(_) => -EINVAL,
            Self::NotSeekable => -ESPIPE,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Device(err) => err.kind(),
            Self::UnknownMinor(_) => "unknown_minor",
            Self::BadHandle(_) => "bad_handle",
            Self::InvalidFrequency(_) => "invalid_frequency",
            Self::NotSeekable => "not_seekable",
        }
    }

    /// Whether the same handle can succeed later with different arguments.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Device(err) => err.is_recoverable(),
            _ => true,
        }
    }
}

/// Something worth recording outside the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    BufferTruncated { minor: u32 },
    FrequencyChanged { frequency_hz: u32 },
    ActuatorUnavailable { line_id: u32 },
}

#[derive(Debug, Clone)]
pub struct EndpointStatus {
    pub capacity: usize,
    pub used_length: usize,
    pub sessions: usize,
    pub frequency_hz: u32,
    pub actuation_state: ActuationState,
    pub line_id: u32,
    pub actuator_failed: bool,
    pub live_tasks: usize,
    pub actuation: ActuationStats,
}

#[derive(Debug, Clone, Copy)]
enum OpenFile {
    Buffer { session: Session },
    Frequency { position: usize },
}

type EventSink = Box<dyn Fn(&DeviceEvent) + Send + Sync>;

pub struct DeviceEndpoint {
    buffer: Mutex<BufferDevice>,
    actuator: Mutex<ActuationController>,
    files: Mutex<HashMap<u64, OpenFile>>,
    next_handle: AtomicU64,
    events: Option<EventSink>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn rejected<T>(result: Result<T, EndpointError>) -> Result<T, EndpointError> {
    if let Err(err) = &result {
        OPERATIONS_REJECTED.with_label_values(&[err.kind()]).inc();
    }
    result
}

/// Render a frequency the way the frequency minor reports it.
pub fn format_frequency(frequency_hz: u32) -> Vec<u8> {
    format!("{frequency_hz}\n").into_bytes()
}

/// Parse an unsigned decimal, ignoring surrounding ASCII whitespace.
pub fn parse_frequency(raw: &[u8]) -> Result<u32, EndpointError> {
    let invalid = || EndpointError::InvalidFrequency(String::from_utf8_lossy(raw).into_owned());
    let text = std::str::from_utf8(raw).map_err(|_| invalid())?;
    text.trim_ascii().parse::<u32>().map_err(|_| invalid())
}

impl DeviceEndpoint {
    pub fn new(config: &DeviceConfig, line: Arc<dyn OutputLine>) -> Self {
        Self {
            buffer: Mutex::new(BufferDevice::new(config.capacity)),
            actuator: Mutex::new(ActuationController::new(line, config.actuation.clone())),
            files: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            events: None,
        }
    }

    /// Route device events to `sink` (audit trail, tests).
    pub fn with_events(mut self, sink: impl Fn(&DeviceEvent) + Send + Sync + 'static) -> Self {
        self.events = Some(Box::new(sink));
        self
    }

    fn emit(&self, event: DeviceEvent) {
        if let Some(sink) = &self.events {
            sink(&event);
        }
    }

    pub fn open(&self, minor: u32, flags: OpenFlags) -> Result<u64, EndpointError> {
        rejected(self.open_inner(minor, flags))
    }

    fn open_inner(&self, minor: u32, flags: OpenFlags) -> Result<u64, EndpointError> {
        let file = match minor {
            MINOR_BUFFER | MINOR_BUFFER_INVERTED => {
                let session = lock(&self.buffer).open(flags, minor == MINOR_BUFFER_INVERTED);
                if flags.truncate() {
                    self.emit(DeviceEvent::BufferTruncated { minor });
                }
                OpenFile::Buffer { session }
            }
            MINOR_FREQUENCY => OpenFile::Frequency { position: 0 },
            other => return Err(EndpointError::UnknownMinor(other)),
        };

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let mut files = lock(&self.files);
        files.insert(handle, file);
        OPEN_SESSIONS.set(files.len() as i64);
        debug!(handle, minor, ?flags, "Opened");
        Ok(handle)
    }

    pub fn release(&self, handle: u64) -> Result<(), EndpointError> {
        let mut files = lock(&self.files);
        let result = files
            .remove(&handle)
            .map(|_| ())
            .ok_or(EndpointError::BadHandle(handle));
        OPEN_SESSIONS.set(files.len() as i64);
        debug!(handle, ok = result.is_ok(), "Released");
        rejected(result)
    }

    pub fn read<O>(&self, handle: u64, len: usize, out: &mut O) -> Result<usize, EndpointError>
    where
        O: TransferOut + ?Sized,
    {
        rejected(self.read_inner(handle, len, out))
    }

    fn read_inner<O>(&self, handle: u64, len: usize, out: &mut O) -> Result<usize, EndpointError>
    where
        O: TransferOut + ?Sized,
    {
        let mut files = lock(&self.files);
        let file = files
            .get_mut(&handle)
            .ok_or(EndpointError::BadHandle(handle))?;

        let delivered = match file {
            OpenFile::Buffer { session } => lock(&self.buffer).read(session, len, out)?,
            OpenFile::Frequency { position } => {
                if *position > 0 {
                    return Ok(0);
                }
                let text = format_frequency(lock(&self.actuator).frequency());
                let chunk = &text[..text.len().min(len)];
                out.copy_from(chunk).map_err(DeviceError::from)?;
                *position += chunk.len();
                chunk.len()
            }
        };
        BYTES_READ.inc_by(delivered as u64);
        Ok(delivered)
    }

    pub fn write<I>(&self, handle: u64, input: &I) -> Result<usize, EndpointError>
    where
        I: TransferIn + ?Sized,
    {
        rejected(self.write_inner(handle, input))
    }

    fn write_inner<I>(&self, handle: u64, input: &I) -> Result<usize, EndpointError>
    where
        I: TransferIn + ?Sized,
    {
        let mut files = lock(&self.files);
        let file = files
            .get_mut(&handle)
            .ok_or(EndpointError::BadHandle(handle))?;

        match file {
            OpenFile::Buffer { session } => {
                let flags = session.flags();
                let stored = lock(&self.buffer).write(session, flags, input)?;
                BYTES_WRITTEN.inc_by(stored as u64);
                Ok(stored)
            }
            OpenFile::Frequency { position } => {
                let mut raw = vec![0u8; input.len()];
                input.copy_to(&mut raw).map_err(DeviceError::from)?;
                let frequency_hz = parse_frequency(&raw)?;
                self.apply_frequency(frequency_hz)?;
                *position += raw.len();
                Ok(raw.len())
            }
        }
    }

    pub fn seek(&self, handle: u64, offset: i64, whence: Whence) -> Result<usize, EndpointError> {
        rejected(self.seek_inner(handle, offset, whence))
    }

    fn seek_inner(&self, handle: u64, offset: i64, whence: Whence) -> Result<usize, EndpointError> {
        let mut files = lock(&self.files);
        match files.get_mut(&handle) {
            Some(OpenFile::Buffer { session }) => {
                Ok(lock(&self.buffer).seek(session, offset, whence)?)
            }
            Some(OpenFile::Frequency { .. }) => Err(EndpointError::NotSeekable),
            None => Err(EndpointError::BadHandle(handle)),
        }
    }

    /// Request a frequency directly, bypassing the text interface.
    pub fn request_frequency(&self, frequency_hz: u32) -> Result<(), EndpointError> {
        rejected(self.apply_frequency(frequency_hz))
    }

    /// Hand `frequency_hz` to the controller and report the outcome as an event.
    fn apply_frequency(&self, frequency_hz: u32) -> Result<(), EndpointError> {
        let result = lock(&self.actuator).request(frequency_hz);
        match result {
            Ok(()) => {
                ACTUATION_REQUESTS.inc();
                self.emit(DeviceEvent::FrequencyChanged { frequency_hz });
                Ok(())
            }
            Err(err) => {
                warn!(frequency_hz, error = %err, "Frequency request rejected");
                if let DeviceError::ActuatorUnavailable { line_id } = err {
                    self.emit(DeviceEvent::ActuatorUnavailable { line_id });
                }
                Err(err.into())
            }
        }
    }

    pub fn session_count(&self) -> usize {
        lock(&self.files).len()
    }

    pub fn status(&self) -> EndpointStatus {
        let (capacity, used_length) = {
            let buffer = lock(&self.buffer);
            (buffer.capacity(), buffer.used_length())
        };
        let sessions = self.session_count();
        let actuator = lock(&self.actuator);
        EndpointStatus {
            capacity,
            used_length,
            sessions,
            frequency_hz: actuator.frequency(),
            actuation_state: actuator.state(),
            line_id: actuator.line_id(),
            actuator_failed: actuator.is_failed(),
            live_tasks: actuator.live_tasks(),
            actuation: actuator.stats(),
        }
    }

    /// Stop actuation and release the output line.
    pub fn shutdown(&self) {
        lock(&self.actuator).shutdown();
        let mut files = lock(&self.files);
        let dropped = files.len();
        files.clear();
        OPEN_SESSIONS.set(0);
        info!(dropped_sessions = dropped, "Device endpoint shut down");
    }
}
