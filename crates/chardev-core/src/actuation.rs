//! Frequency-driven toggling of an output line.
//!
//! The controller owns at most one background task. Each task has its own
//! cancel flag; a new frequency signals the running task, waits for it to
//! stop, and only then spawns the replacement, so two tasks never drive the
//! line at the same time.

use crate::config::ActuationConfig;
use crate::error::DeviceError;
use crate::hal::OutputLine;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuationState {
    #[default]
    Idle,
    Starting,
    Toggling,
    Stopped,
}

impl ActuationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Toggling => "toggling",
            Self::Stopped => "stopped",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Starting,
            2 => Self::Toggling,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct ActuationStats {
    pub tasks_started: u64,
    pub toggles: u64,
    pub overruns: u64,
    pub max_jitter_us: u64,
}

/// Time between two toggles for `frequency_hz`, i.e. `1 / (2 * f)`,
/// floored at `min`.
pub fn half_period(frequency_hz: u32, min: Duration) -> Duration {
    if frequency_hz == 0 {
        return Duration::ZERO;
    }
    let nanos = 1_000_000_000u64 / (2 * u64::from(frequency_hz));
    Duration::from_nanos(nanos).max(min)
}

/// State visible to both the controller and its task.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    level: AtomicBool,
    live_tasks: AtomicUsize,
    tasks_started: AtomicU64,
    toggles: AtomicU64,
    overruns: AtomicU64,
    max_jitter_us: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ActuationState::Idle as u8),
            level: AtomicBool::new(true),
            live_tasks: AtomicUsize::new(0),
            tasks_started: AtomicU64::new(0),
            toggles: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            max_jitter_us: AtomicU64::new(0),
        }
    }

    fn set_state(&self, state: ActuationState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Marks the task stopped however the task body ends.
struct LiveGuard<'a>(&'a Shared);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.set_state(ActuationState::Stopped);
        self.0.live_tasks.fetch_sub(1, Ordering::AcqRel);
    }
}

struct ActuationTask {
    frequency_hz: u32,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ActuationTask {
    fn spawn(
        line: Arc<dyn OutputLine>,
        shared: Arc<Shared>,
        frequency_hz: u32,
        half: Duration,
    ) -> std::io::Result<Self> {
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);
        let task_shared = Arc::clone(&shared);

        shared.set_state(ActuationState::Starting);
        shared.live_tasks.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(format!("actuation-{}", line.id()))
            .spawn(move || toggle_loop(line.as_ref(), &task_shared, &task_cancel, half));

        match spawned {
            Ok(handle) => {
                shared.tasks_started.fetch_add(1, Ordering::AcqRel);
                Ok(Self {
                    frequency_hz,
                    cancel,
                    handle,
                })
            }
            Err(err) => {
                shared.live_tasks.fetch_sub(1, Ordering::AcqRel);
                shared.set_state(ActuationState::Stopped);
                Err(err)
            }
        }
    }

    /// Signal the task and wake it if it is sleeping.
    fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
        self.handle.thread().unpark();
    }

    fn join(self) {
        if self.handle.join().is_err() {
            error!(frequency_hz = self.frequency_hz, "Actuation task panicked");
        }
    }
}

/// Park until `deadline`. Returns false if cancellation cut the sleep short.
fn sleep_until(deadline: Instant, cancel: &AtomicBool) -> bool {
    loop {
        if cancel.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::park_timeout(deadline - now);
    }
}

fn toggle_loop(line: &dyn OutputLine, shared: &Shared, cancel: &AtomicBool, half: Duration) {
    let _live = LiveGuard(shared);
    shared.set_state(ActuationState::Toggling);

    let mut next = Instant::now() + half;
    while !cancel.load(Ordering::Acquire) {
        if !sleep_until(next, cancel) {
            continue;
        }

        let now = Instant::now();
        let late = now.duration_since(next);
        if late >= half {
            shared.overruns.fetch_add(1, Ordering::Relaxed);
            next = now;
        }
        shared
            .max_jitter_us
            .fetch_max(late.as_micros() as u64, Ordering::Relaxed);

        let level = !shared.level.load(Ordering::Acquire);
        line.set(level);
        shared.level.store(level, Ordering::Release);
        shared.toggles.fetch_add(1, Ordering::Relaxed);

        next += half;
    }
}

/// Drives one output line at a requested frequency.
pub struct ActuationController {
    line: Arc<dyn OutputLine>,
    config: ActuationConfig,
    failed: bool,
    shut_down: bool,
    target_frequency: u32,
    task: Option<ActuationTask>,
    shared: Arc<Shared>,
}

impl ActuationController {
    /// Claims the line once. If that fails the controller stays usable but
    /// rejects every request.
    pub fn new(line: Arc<dyn OutputLine>, config: ActuationConfig) -> Self {
        let failed = match line.acquire() {
            Ok(()) => {
                info!(line = line.id(), "Output line acquired");
                false
            }
            Err(err) => {
                warn!(line = line.id(), error = %err, "Output line unavailable, actuation disabled");
                true
            }
        };
        Self {
            line,
            config,
            failed,
            shut_down: false,
            target_frequency: 0,
            task: None,
            shared: Arc::new(Shared::new()),
        }
    }

    /// Switch the line to `frequency_hz`. Zero stops toggling.
    pub fn request(&mut self, frequency_hz: u32) -> Result<(), DeviceError> {
        if self.failed || self.shut_down {
            return Err(DeviceError::ActuatorUnavailable {
                line_id: self.line.id(),
            });
        }

        self.stop_task();
        self.target_frequency = 0;
        if frequency_hz == 0 {
            info!(line = self.line.id(), "Actuation stopped");
            return Ok(());
        }

        let half = half_period(frequency_hz, self.config.min_half_period);
        let task = ActuationTask::spawn(
            Arc::clone(&self.line),
            Arc::clone(&self.shared),
            frequency_hz,
            half,
        )
        .map_err(|err| {
            error!(error = %err, "Failed to spawn actuation task");
            DeviceError::TaskSpawn {
                line_id: self.line.id(),
            }
        })?;
        self.task = Some(task);
        self.target_frequency = frequency_hz;

        info!(
            line = self.line.id(),
            frequency_hz,
            half_period_us = half.as_micros() as u64,
            "Actuation started"
        );
        Ok(())
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            debug!(frequency_hz = task.frequency_hz, "Cancelling actuation task");
            task.cancel();
            task.join();
        }
    }

    /// Stop toggling and give the line back. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.stop_task();
        self.target_frequency = 0;
        if !self.failed {
            self.line.release();
            info!(line = self.line.id(), "Output line released");
        }
        self.shut_down = true;
    }

    pub fn frequency(&self) -> u32 {
        self.target_frequency
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn line_id(&self) -> u32 {
        self.line.id()
    }

    pub fn state(&self) -> ActuationState {
        ActuationState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn live_tasks(&self) -> usize {
        self.shared.live_tasks.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ActuationStats {
        ActuationStats {
            tasks_started: self.shared.tasks_started.load(Ordering::Acquire),
            toggles: self.shared.toggles.load(Ordering::Acquire),
            overruns: self.shared.overruns.load(Ordering::Acquire),
            max_jitter_us: self.shared.max_jitter_us.load(Ordering::Acquire),
        }
    }
}

impl Drop for ActuationController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(all(test, feature = "simulation"))]
mod tests {
    use super::*;
    use crate::hal_sim::SimulatedLine;

    fn controller(line: &Arc<SimulatedLine>) -> ActuationController {
        ActuationController::new(line.clone(), ActuationConfig::default())
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn half_period_math() {
        let min = Duration::from_micros(50);
        assert_eq!(half_period(1, min), Duration::from_millis(500));
        assert_eq!(half_period(10, min), Duration::from_millis(50));
        assert_eq!(half_period(1_000_000, min), min);
        assert_eq!(half_period(0, min), Duration::ZERO);
    }

    #[test]
    fn request_toggles_line() {
        let line = Arc::new(SimulatedLine::new(16));
        let mut ctl = controller(&line);
        assert_eq!(ctl.state(), ActuationState::Idle);

        ctl.request(500).unwrap();
        assert_eq!(ctl.frequency(), 500);
        assert!(wait_for(|| line.transitions() >= 4));
        assert_eq!(ctl.state(), ActuationState::Toggling);
        assert_eq!(ctl.live_tasks(), 1);
    }

    #[test]
    fn zero_frequency_stops_task() {
        let line = Arc::new(SimulatedLine::new(16));
        let mut ctl = controller(&line);
        ctl.request(500).unwrap();
        ctl.request(0).unwrap();

        assert_eq!(ctl.live_tasks(), 0);
        assert_eq!(ctl.state(), ActuationState::Stopped);
        assert_eq!(ctl.frequency(), 0);

        let frozen = line.transitions();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(line.transitions(), frozen);
    }

    #[test]
    fn rapid_requests_keep_one_task() {
        let line = Arc::new(SimulatedLine::new(16));
        let mut ctl = controller(&line);
        for f in [10, 20, 1000, 5, 300, 7] {
            ctl.request(f).unwrap();
            assert!(ctl.live_tasks() <= 1);
        }
        assert_eq!(ctl.frequency(), 7);
        assert_eq!(ctl.stats().tasks_started, 6);
        assert_eq!(ctl.live_tasks(), 1);
    }

    #[test]
    fn low_frequency_cancels_promptly() {
        let line = Arc::new(SimulatedLine::new(16));
        let mut ctl = controller(&line);
        ctl.request(1).unwrap();

        let started = Instant::now();
        ctl.request(0).unwrap();
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn unavailable_line_is_sticky() {
        let line = Arc::new(SimulatedLine::unavailable(16));
        let mut ctl = controller(&line);
        assert!(ctl.is_failed());

        for f in [0, 10] {
            assert_eq!(
                ctl.request(f),
                Err(DeviceError::ActuatorUnavailable { line_id: 16 })
            );
        }
        assert_eq!(ctl.live_tasks(), 0);
    }

    #[test]
    fn shutdown_releases_line_once_stopped() {
        let line = Arc::new(SimulatedLine::new(16));
        let mut ctl = controller(&line);
        ctl.request(200).unwrap();
        ctl.shutdown();

        assert_eq!(ctl.live_tasks(), 0);
        assert!(!line.is_acquired());
        assert!(ctl.request(10).is_err());
    }

    #[test]
    fn drop_releases_line() {
        let line = Arc::new(SimulatedLine::new(16));
        {
            let mut ctl = controller(&line);
            ctl.request(200).unwrap();
        }
        assert!(!line.is_acquired());
    }

    #[test]
    fn failed_line_is_not_released() {
        let line = Arc::new(SimulatedLine::new(16));
        line.acquire().unwrap();
        let mut ctl = controller(&line);
        assert!(ctl.is_failed());
        ctl.shutdown();
        assert!(line.is_acquired());
    }
}
