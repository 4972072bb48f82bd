//! Application layer: the socket-free client protocol session.

pub mod session;

pub use session::ClientSession;
