use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("Output line {0} is already claimed")]
    Busy(u32),

    #[error("Output line {0} could not be configured as an output")]
    Direction(u32),
}

/// A single digital output, e.g. a GPIO pin driving an LED.
///
/// `set` is called from the actuation task while `acquire`/`release` run in
/// the request context, so implementations are shared across threads.
pub trait OutputLine: Send + Sync {
    fn id(&self) -> u32;
    /// Claim the line and configure it as a driven-high output.
    fn acquire(&self) -> Result<(), LineError>;
    fn set(&self, high: bool);
    fn release(&self);
}
