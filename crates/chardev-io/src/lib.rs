pub mod bridge;
pub mod endpoint;
pub mod metrics;
pub mod protocol;

pub use bridge::{dispatch, Bridge, BridgeConfig, ClientState};
pub use endpoint::{
    DeviceEndpoint, DeviceEvent, EndpointError, EndpointStatus, MINOR_BUFFER,
    MINOR_BUFFER_INVERTED, MINOR_FREQUENCY,
};
pub use metrics::{init_metrics, serve_metrics};
pub use protocol::{ProtocolError, Request, Response, StatusMsg, WireWhence};
