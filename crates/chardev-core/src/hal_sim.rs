use crate::hal::{LineError, OutputLine};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-memory output line that records what was driven onto it.
#[derive(Debug)]
pub struct SimulatedLine {
    id: u32,
    failure: Option<LineError>,
    acquired: AtomicBool,
    level: AtomicBool,
    transitions: AtomicU64,
}

impl SimulatedLine {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            failure: None,
            acquired: AtomicBool::new(false),
            level: AtomicBool::new(false),
            transitions: AtomicU64::new(0),
        }
    }

    /// A line that some other owner already holds; `acquire` always fails.
    pub fn unavailable(id: u32) -> Self {
        Self {
            failure: Some(LineError::Busy(id)),
            ..Self::new(id)
        }
    }

    /// A line that can be claimed but not switched to output mode.
    pub fn input_only(id: u32) -> Self {
        Self {
            failure: Some(LineError::Direction(id)),
            ..Self::new(id)
        }
    }

    pub fn level(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }

    /// Number of `set` calls that changed the level.
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Acquire)
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }
}

impl OutputLine for SimulatedLine {
    fn id(&self) -> u32 {
        self.id
    }

    fn acquire(&self) -> Result<(), LineError> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        if self.acquired.swap(true, Ordering::AcqRel) {
            return Err(LineError::Busy(self.id));
        }
        self.level.store(true, Ordering::Release);
        Ok(())
    }

    fn set(&self, high: bool) {
        if self.level.swap(high, Ordering::AcqRel) != high {
            self.transitions.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn release(&self) {
        self.acquired.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_drives_high() {
        let line = SimulatedLine::new(16);
        line.acquire().unwrap();
        assert!(line.is_acquired());
        assert!(line.level());
    }

    #[test]
    fn double_acquire_is_busy() {
        let line = SimulatedLine::new(16);
        line.acquire().unwrap();
        assert_eq!(line.acquire(), Err(LineError::Busy(16)));
        line.release();
        assert!(line.acquire().is_ok());
    }

    #[test]
    fn unavailable_line_never_acquires() {
        let line = SimulatedLine::unavailable(4);
        assert_eq!(line.acquire(), Err(LineError::Busy(4)));
        assert!(!line.is_acquired());
    }

    #[test]
    fn input_only_line_fails_direction() {
        let line = SimulatedLine::input_only(7);
        assert_eq!(line.acquire(), Err(LineError::Direction(7)));
    }

    #[test]
    fn transitions_count_level_changes_only() {
        let line = SimulatedLine::new(1);
        line.set(true);
        line.set(true);
        line.set(false);
        assert_eq!(line.transitions(), 2);
    }
}
