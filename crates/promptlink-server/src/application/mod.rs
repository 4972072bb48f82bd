//! Application layer: the shared relay handle and its background sweeps.

pub mod relay_service;
pub mod sweeps;

pub use relay_service::RelayService;
pub use sweeps::{run_expiry_loop, run_heartbeat_loop};
