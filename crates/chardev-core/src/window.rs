use crate::error::DeviceError;
use std::marker::PhantomData;
use std::ops::Range;

#[derive(Debug, Clone, Copy)]
pub struct Unchecked;

#[derive(Debug, Clone, Copy)]
pub struct Checked;

/// A run of buffer positions. Only a `Window<Checked>` can address buffer memory,
/// and the only way to get one is through the clamps below.
#[derive(Debug, Clone, Copy)]
pub struct Window<State = Unchecked> {
    start: usize,
    len: usize,
    _state: PhantomData<State>,
}

impl Window<Unchecked> {
    pub fn new(start: usize, len: usize) -> Self {
        Self {
            start,
            len,
            _state: PhantomData,
        }
    }

    /// Clamp a read request to the written region `[0, used_length)`.
    ///
    /// Starting past the high-water mark is an error; asking for more than is
    /// available is not, the window just shrinks (possibly to zero).
    pub fn clamp_for_read(self, used_length: usize) -> Result<Window<Checked>, DeviceError> {
        if self.start > used_length {
            return Err(DeviceError::OutOfRange {
                position: self.start as i64,
                limit: used_length,
            });
        }
        Ok(Window {
            start: self.start,
            len: self.len.min(used_length - self.start),
            _state: PhantomData,
        })
    }

    /// Clamp a write request to the buffer capacity.
    ///
    /// The comparison is `start + len >= capacity`; a window that would reach
    /// or pass the end is cut to `capacity - start`. A cut that leaves nothing
    /// is `OutOfSpace`.
    pub fn clamp_for_write(
        self,
        used_length: usize,
        capacity: usize,
    ) -> Result<Window<Checked>, DeviceError> {
        let mut len = self.len;
        if self.start.saturating_add(len) >= capacity {
            len = capacity.saturating_sub(self.start);
            if len == 0 {
                return Err(DeviceError::OutOfSpace {
                    cursor: self.start,
                    used_length,
                    capacity,
                });
            }
        }
        Ok(Window {
            start: self.start,
            len,
            _state: PhantomData,
        })
    }
}

impl Window<Checked> {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }
}
