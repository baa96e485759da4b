// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-connection state tracked by the reactor between readiness events.

use std::net::IpAddr;

use mio::net::TcpStream;

/// `stream` is `None` while the connection is checked out to a worker
/// (spec.md §4.4: "zero the interest set... so no re-entry"); the entry
/// itself stays in the reactor's map the whole time so a later
/// [`crate::workerpool::ReactorCommand::Rearm`] can find it.
pub struct Connection {
    pub stream: Option<TcpStream>,
    pub peer_ip: IpAddr,
    pub pending: Vec<u8>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_ip: IpAddr) -> Self {
        Self {
            stream: Some(stream),
            peer_ip,
            pending: Vec::new(),
        }
    }
}
