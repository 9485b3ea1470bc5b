pub mod actuation;
pub mod buffer;
pub mod config;
pub mod error;
pub mod flags;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod transfer;
pub mod window;

pub use actuation::{half_period, ActuationController, ActuationState, ActuationStats};
pub use buffer::{BufferDevice, Session};
pub use config::{ActuationConfig, DeviceConfig};
pub use error::{DeviceError, TransferFault};
pub use flags::{OpenFlags, Whence};
pub use hal::{LineError, OutputLine};
#[cfg(feature = "simulation")]
pub use hal_sim::SimulatedLine;
pub use transfer::{FaultyTransfer, TransferIn, TransferOut};
pub use window::{Checked, Unchecked, Window};
