//! LAN address discovery for join URLs.
//!
//! A relay bound to the wildcard address is reachable on every interface,
//! but a wildcard is not dialable, so the join URL needs the address the
//! host actually uses on the local network.

use std::net::{IpAddr, UdpSocket};

use tracing::{debug, warn};

use crate::domain::ServerConfig;

/// The local address the OS routes outbound traffic from.
///
/// `connect` on a UDP socket only selects a route; no packet is sent, so
/// this works without internet access as long as a default route exists.
/// Returns `None` when no non-loopback interface is routable.
pub fn outbound_ip(ipv6: bool) -> Option<IpAddr> {
    let (bind, route_target) = if ipv6 {
        ("[::]:0", "[2001:4860:4860::8888]:53")
    } else {
        ("0.0.0.0:0", "8.8.8.8:53")
    };

    let socket = UdpSocket::bind(bind)
        .map_err(|e| debug!("LAN discovery: bind {bind} failed: {e}"))
        .ok()?;
    socket
        .connect(route_target)
        .map_err(|e| debug!("LAN discovery: no route: {e}"))
        .ok()?;
    let ip = socket.local_addr().ok()?.ip();

    (!ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
}

/// The host to put into join URLs for `config`.
///
/// Only a wildcard bind without an explicit `advertise_host` triggers
/// discovery; loopback is used when discovery finds nothing.
pub fn advertised_host(config: &ServerConfig) -> String {
    let lan_ip = if config.needs_lan_address() {
        let ip = outbound_ip(config.bind_ip.is_ipv6());
        if ip.is_none() {
            warn!("no LAN address found; join URLs will use loopback");
        }
        ip
    } else {
        None
    };
    config.advertised_host(lan_ip)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
