//! Listening-port selection.
//!
//! The relay tries a short list of well-known ports first so that join URLs
//! stay stable across restarts, then the fallback lists in order, and finally
//! lets the operating system pick any free port.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener};

use thiserror::Error;
use tracing::{debug, info};

/// Failure to bind any listening port.
#[derive(Debug, Error)]
pub enum PortError {
    /// Every candidate and the OS-assigned port failed.
    #[error("no port available on {ip}: {source}")]
    Exhausted {
        ip: IpAddr,
        #[source]
        source: io::Error,
    },
}

/// Binds the first free port from `preferred`, then from each list in
/// `fallback`, then port 0 (OS-assigned).
///
/// The returned listener is a blocking std listener; call
/// `set_nonblocking(true)` before handing it to tokio.
///
/// # Errors
///
/// Returns [`PortError::Exhausted`] only if even the OS-assigned port cannot
/// be bound (e.g. the interface address does not exist).
pub fn bind_available(
    ip: IpAddr,
    preferred: &[u16],
    fallback: &[Vec<u16>],
) -> Result<TcpListener, PortError> {
    let candidates = preferred
        .iter()
        .chain(fallback.iter().flatten())
        .copied()
        .filter(|port| *port != 0);

    for port in candidates {
        match TcpListener::bind(SocketAddr::new(ip, port)) {
            Ok(listener) => {
                info!(port, "bound listening port");
                return Ok(listener);
            }
            Err(e) => debug!(port, error = %e, "port unavailable"),
        }
    }

    let listener = TcpListener::bind(SocketAddr::new(ip, 0))
        .map_err(|source| PortError::Exhausted { ip, source })?;
    info!("all configured ports taken; using an OS-assigned port");
    Ok(listener)
}

/// Like [`bind_available`] but only reports the port, releasing it again.
///
/// Racy by nature (another process may grab the port before it is reused);
/// useful for printing what a later bind would probably get.
pub fn find_available_port(
    ip: IpAddr,
    preferred: &[u16],
    fallback: &[Vec<u16>],
) -> Result<u16, PortError> {
    let listener = bind_available(ip, preferred, fallback)?;
    let port = listener
        .local_addr()
        .map_err(|source| PortError::Exhausted { ip, source })?
        .port();
    Ok(port)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
