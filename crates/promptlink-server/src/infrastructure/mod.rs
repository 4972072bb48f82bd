//! Infrastructure layer: sockets, ports and files.

pub mod lan;
pub mod port;
pub mod storage;
pub mod ws_server;
