//! Infrastructure layer: the WebSocket transport and the driver task.

pub mod relay_client;
pub mod transport;
