//! Free-port probing for the OAuth callback listener.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpSocket;
use tracing::debug;

/// First port tried for the callback listener.
pub const DEFAULT_PREFERRED_PORT: u16 = 8080;
/// Number of consecutive ports probed after the preferred one.
pub const DEFAULT_PORT_RANGE: u16 = 20;

/// Finds a free loopback TCP port, starting at `preferred` and scanning up
/// to `max_offset` consecutive ports.
///
/// Each candidate is probed with an exclusive bind that is released right
/// away; the port can in principle be taken between the probe and the real
/// bind, so this only reduces collision odds rather than guaranteeing them
/// away. Returns `None` when the whole range is busy.
pub fn find_free_port(preferred: u16, max_offset: u16) -> Option<u16> {
    for offset in 0..max_offset {
        let port = preferred.checked_add(offset)?;
        if probe_bind(port) {
            debug!("found free callback port {}", port);
            return Some(port);
        }
    }
    None
}

/// Attempts a reuse-enabled bind on `127.0.0.1:port`, dropping the socket
/// immediately.
fn probe_bind(port: u16) -> bool {
    let Ok(socket) = TcpSocket::new_v4() else {
        return false;
    };
    if socket.set_reuseaddr(true).is_err() {
        return false;
    }
    socket
        .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        .is_ok()
}
