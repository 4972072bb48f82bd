//! The Relay Router and the store it owns.
//!
//! [`RelayRouter`] is the only thing outside `domain` that touches pairing
//! codes, token sessions and connections, and it does so only through
//! [`RelayStore`].  Adapters wrap one router in a lock and feed it frames.

pub mod relay;
pub mod store;

pub use relay::RelayRouter;
pub use store::{RelayStats, RelayStore, SweepReport};
