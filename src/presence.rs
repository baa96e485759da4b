// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Online-presence registry.
//!
//! Two consistent indexes (spec.md §4.2): connection identity -> nickname,
//! and nickname -> datagram endpoint. Both indexes are [`DashMap`]s for
//! lock-free single-key reads (`nicknameOf`, `endpointOf`, `isOnline`);
//! the compound `bind`/`unbind` operations need test-and-set semantics
//! across *both* maps, so they additionally take a small `Mutex<()>` just to
//! serialize the compound step — never held across a blocking call, and
//! never needed by the single-key read paths.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;

use crate::error::PresenceError;

/// Opaque handle identifying one session connection, minted by the reactor
/// when it accepts the socket (spec.md §9's redesign note: a literal source
/// port is reused across the OS's ephemeral range and makes a poor identity
/// key, so the reactor hands out a monotonically increasing counter
/// instead). Equality, not the wrapped value, is the only thing callers may
/// rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

pub struct PresenceRegistry {
    by_connection: DashMap<ConnectionId, String>,
    by_nickname: DashMap<String, SocketAddr>,
    compound_op: Mutex<()>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            by_connection: DashMap::new(),
            by_nickname: DashMap::new(),
            compound_op: Mutex::new(()),
        }
    }

    /// `bind(connectionId, nickname, datagramEndpoint) -> {Bound | NicknameBusy | ConnectionBusy}`
    /// (spec.md §4.2). Inserts both indexes before returning success; rolls
    /// back the first insert if the second would violate the injective
    /// mapping invariant from spec.md §3.
    pub fn bind(
        &self,
        connection: ConnectionId,
        nickname: &str,
        endpoint: SocketAddr,
    ) -> Result<(), PresenceError> {
        let _guard = self.compound_op.lock();

        if self.by_nickname.contains_key(nickname) {
            return Err(PresenceError::NicknameBusy);
        }
        if self.by_connection.contains_key(&connection) {
            return Err(PresenceError::ConnectionBusy);
        }

        self.by_connection.insert(connection, nickname.to_string());
        self.by_nickname.insert(nickname.to_string(), endpoint);
        Ok(())
    }

    /// Removes both indexes; idempotent.
    pub fn unbind(&self, connection: ConnectionId) {
        let _guard = self.compound_op.lock();
        if let Some((_, nickname)) = self.by_connection.remove(&connection) {
            self.by_nickname.remove(&nickname);
        }
    }

    pub fn nickname_of(&self, connection: ConnectionId) -> Option<String> {
        self.by_connection.get(&connection).map(|r| r.clone())
    }

    pub fn endpoint_of(&self, nickname: &str) -> Option<SocketAddr> {
        self.by_nickname.get(nickname).map(|r| *r)
    }

    pub fn is_online(&self, nickname: &str) -> bool {
        self.by_nickname.contains_key(nickname)
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn bind_then_online_both_indexes_agree() {
        let registry = PresenceRegistry::new();
        registry.bind(ConnectionId(1), "alice", addr(7001)).unwrap();
        assert!(registry.is_online("alice"));
        assert_eq!(registry.nickname_of(ConnectionId(1)).as_deref(), Some("alice"));
        assert_eq!(registry.endpoint_of("alice"), Some(addr(7001)));
    }

    #[test]
    fn rejects_duplicate_nickname_login() {
        let registry = PresenceRegistry::new();
        registry.bind(ConnectionId(1), "alice", addr(7001)).unwrap();
        assert_eq!(
            registry.bind(ConnectionId(2), "alice", addr(7002)),
            Err(PresenceError::NicknameBusy)
        );
    }

    #[test]
    fn rejects_rebinding_connection_to_second_nickname() {
        let registry = PresenceRegistry::new();
        registry.bind(ConnectionId(1), "alice", addr(7001)).unwrap();
        assert_eq!(
            registry.bind(ConnectionId(1), "bob", addr(7002)),
            Err(PresenceError::ConnectionBusy)
        );
    }

    #[test]
    fn unbind_is_idempotent_and_clears_both_indexes() {
        let registry = PresenceRegistry::new();
        registry.bind(ConnectionId(1), "alice", addr(7001)).unwrap();
        registry.unbind(ConnectionId(1));
        registry.unbind(ConnectionId(1));
        assert!(!registry.is_online("alice"));
        assert!(registry.nickname_of(ConnectionId(1)).is_none());
    }

    #[test]
    fn unbind_never_logged_in_is_safe() {
        let registry = PresenceRegistry::new();
        registry.unbind(ConnectionId(99));
        assert!(registry.nickname_of(ConnectionId(99)).is_none());
    }

    #[test]
    fn nickname_frees_up_after_unbind() {
        let registry = PresenceRegistry::new();
        registry.bind(ConnectionId(1), "alice", addr(7001)).unwrap();
        registry.unbind(ConnectionId(1));
        registry.bind(ConnectionId(2), "alice", addr(7002)).unwrap();
        assert_eq!(registry.endpoint_of("alice"), Some(addr(7002)));
    }
}
