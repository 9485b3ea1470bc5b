use thiserror::Error;

pub const EPERM: i32 = 1;
pub const EAGAIN: i32 = 11;
pub const EFAULT: i32 = 14;
pub const EINVAL: i32 = 22;
pub const ENOSPC: i32 = 28;

/// A boundary copy failed. Nothing was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Transfer across the caller boundary failed")]
pub struct TransferFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Position {position} is outside the permitted window (limit {limit})")]
    OutOfRange { position: i64, limit: usize },

    #[error("No space left: cursor {cursor}, used {used_length}, capacity {capacity}")]
    OutOfSpace {
        cursor: usize,
        used_length: usize,
        capacity: usize,
    },

    #[error("Transfer across the caller boundary failed")]
    TransferFault,

    #[error("Output line {line_id} is unavailable")]
    ActuatorUnavailable { line_id: u32 },

    /// The OS refused to start an actuation thread. The line itself is fine.
    #[error("Could not start actuation task for line {line_id}")]
    TaskSpawn { line_id: u32 },
}

impl DeviceError {
    /// Negative errno in the character-device return convention.
    pub fn errno(&self) -> i32 {
        match self {
            Self::OutOfRange { .. } => -EINVAL,
            Self::OutOfSpace { .. } => -ENOSPC,
            Self::TransferFault => -EFAULT,
            Self::ActuatorUnavailable { .. } => -EPERM,
            Self::TaskSpawn { .. } => -EAGAIN,
        }
    }

    /// Short machine-readable name, used for metric labels and wire errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "out_of_range",
            Self::OutOfSpace { .. } => "out_of_space",
            Self::TransferFault => "transfer_fault",
            Self::ActuatorUnavailable { .. } => "actuator_unavailable",
            Self::TaskSpawn { .. } => "task_spawn_failed",
        }
    }

    /// Everything except an unavailable actuator can be retried with different arguments.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ActuatorUnavailable { .. })
    }
}

impl From<TransferFault> for DeviceError {
    fn from(_: TransferFault) -> Self {
        Self::TransferFault
    }
}
