use crate::error::DeviceError;
use crate::flags::{OpenFlags, Whence};
use crate::transfer::{TransferIn, TransferOut};
use crate::window::Window;
use tracing::{debug, trace};

/// One open instance of a buffer device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    cursor: usize,
    invert: bool,
    flags: OpenFlags,
}

impl Session {
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Reads on this session come back byte-reversed.
    pub fn invert(&self) -> bool {
        self.invert
    }

    /// Flags the session was opened with.
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }
}

/// Fixed-capacity byte store with a high-water mark.
///
/// Bytes in `[0, used_length)` are the logical contents. The tail is kept
/// zeroed until written, so a write that starts past the high-water mark
/// exposes a zero-filled gap.
#[derive(Debug, Clone)]
pub struct BufferDevice {
    data: Box<[u8]>,
    used_length: usize,
}

impl BufferDevice {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be positive");
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            used_length: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn used_length(&self) -> usize {
        self.used_length
    }

    /// The logical contents, `[0, used_length)`.
    pub fn contents(&self) -> &[u8] {
        &self.data[..self.used_length]
    }

    /// Start a new session at offset 0. `TRUNCATE` drops the current contents.
    pub fn open(&mut self, flags: OpenFlags, invert: bool) -> Session {
        if flags.truncate() {
            self.data[..self.used_length].fill(0);
            self.used_length = 0;
            debug!(capacity = self.capacity(), "Buffer truncated on open");
        }
        Session {
            cursor: 0,
            invert,
            flags,
        }
    }

    /// Copy up to `len` bytes from the cursor out to `out`.
    ///
    /// Returns the number of bytes delivered; 0 at the end of the data.
    pub fn read<O>(
        &self,
        session: &mut Session,
        len: usize,
        out: &mut O,
    ) -> Result<usize, DeviceError>
    where
        O: TransferOut + ?Sized,
    {
        let window = Window::new(session.cursor, len).clamp_for_read(self.used_length)?;
        if window.is_empty() {
            return Ok(0);
        }

        let bytes = &self.data[window.range()];
        if session.invert {
            let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
            out.copy_from(&reversed)?;
        } else {
            out.copy_from(bytes)?;
        }

        session.cursor = window.end();
        trace!(
            requested = len,
            delivered = window.len(),
            cursor = session.cursor,
            invert = session.invert,
            "Buffer read"
        );
        Ok(window.len())
    }

    /// Copy the caller's bytes in at the cursor, or at the high-water mark
    /// when `flags` has `APPEND`.
    ///
    /// Returns the number of bytes stored, which may be fewer than offered
    /// when the write runs into the end of the buffer. On any error the
    /// cursor and contents are left as they were.
    pub fn write<I>(
        &mut self,
        session: &mut Session,
        flags: OpenFlags,
        input: &I,
    ) -> Result<usize, DeviceError>
    where
        I: TransferIn + ?Sized,
    {
        let original_cursor = session.cursor;
        if flags.append() {
            session.cursor = self.used_length;
        }

        let window = match Window::new(session.cursor, input.len())
            .clamp_for_write(self.used_length, self.capacity())
        {
            Ok(window) => window,
            Err(err) => {
                session.cursor = original_cursor;
                debug!(error = %err, offered = input.len(), "Buffer write rejected");
                return Err(err);
            }
        };

        let mut staged = vec![0u8; window.len()];
        if let Err(fault) = input.copy_to(&mut staged) {
            session.cursor = original_cursor;
            debug!("Buffer write faulted during transfer");
            return Err(fault.into());
        }
        self.data[window.range()].copy_from_slice(&staged);

        session.cursor = window.end();
        self.used_length = self.used_length.max(session.cursor);
        trace!(
            offered = input.len(),
            stored = window.len(),
            cursor = session.cursor,
            used_length = self.used_length,
            append = flags.append(),
            "Buffer write"
        );
        Ok(window.len())
    }

    /// Move the cursor. The target must satisfy `0 <= target < capacity`;
    /// a cursor equal to the capacity is never reachable through seek.
    pub fn seek(
        &self,
        session: &mut Session,
        offset: i64,
        whence: Whence,
    ) -> Result<usize, DeviceError> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => session.cursor as i64,
            Whence::End => self.used_length as i64,
        };
        let target = base.saturating_add(offset);
        if target < 0 || target >= self.capacity() as i64 {
            debug!(target, ?whence, capacity = self.capacity(), "Seek rejected");
            return Err(DeviceError::OutOfRange {
                position: target,
                limit: self.capacity(),
            });
        }
        session.cursor = target as usize;
        Ok(session.cursor)
    }
}
