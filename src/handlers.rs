// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stateless per-command request handlers (spec.md §4.6).
//!
//! Every handler takes the shared stores plus whatever the request carries
//! and returns the exact reply line spec.md prescribes. None of these touch
//! a socket directly — the reactor/worker boundary (§4.4/§4.5) owns I/O; a
//! handler only ever returns `Ok(reply)` or a [`HandlerOutcome`] that tells
//! the dispatcher to also close the connection (logout).

use std::net::{IpAddr, SocketAddr};

use crate::presence::ConnectionId;
use crate::store::{AddFriendOutcome, RegisterOutcome, UserStore};
use crate::PresenceRegistry;

/// What the dispatcher should do with the session socket after a handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Write `reply` and re-arm read interest.
    Reply(String),
    /// Write `reply`, then close the connection (client-initiated logout).
    ReplyThenClose(String),
}

pub fn login(
    store: &UserStore,
    presence: &PresenceRegistry,
    connection: ConnectionId,
    peer_ip: IpAddr,
    nickname: &str,
    password: &str,
    udp_port: u16,
) -> HandlerOutcome {
    if store.lookup(nickname).is_none() {
        return HandlerOutcome::Reply(format!(
            "Login error: user {nickname} not found. Please register."
        ));
    }
    if presence.is_online(nickname) {
        return HandlerOutcome::Reply(format!("Login error: {nickname} is already logged in."));
    }
    if presence.nickname_of(connection).is_some() {
        return HandlerOutcome::Reply(
            "Login error: you are already logged with another account.".to_string(),
        );
    }
    if !store.verify(nickname, password) {
        return HandlerOutcome::Reply("Login error: wrong password.".to_string());
    }

    let endpoint = SocketAddr::new(peer_ip, udp_port);
    // Already checked above under no lock held across the check — bind()
    // re-validates atomically and is the actual source of truth.
    match presence.bind(connection, nickname, endpoint) {
        Ok(()) => HandlerOutcome::Reply("Login successful.".to_string()),
        Err(_) => HandlerOutcome::Reply(format!("Login error: {nickname} is already logged in.")),
    }
}

/// `logout(brutal?)` (spec.md §4.6). `brutal = true` means the reactor
/// observed EOF; there is no reply and the connection may never have been
/// logged in (must be safe either way).
pub fn logout(
    presence: &PresenceRegistry,
    connection: ConnectionId,
    brutal: bool,
) -> Option<String> {
    presence.unbind(connection);
    if brutal {
        None
    } else {
        Some("Logout successful".to_string())
    }
}

pub fn add_friend(store: &UserStore, nickname: &str, friend: &str) -> String {
    if friend == nickname {
        return "Add friend error: you cannot add yourself as a friend.".to_string();
    }
    if store.lookup(friend).is_none() {
        return format!("Add friend error: user {friend} not found.");
    }
    match store.add_friendship(nickname, friend) {
        Ok(AddFriendOutcome::Added) => format!("{friend} is now your friend."),
        Ok(AddFriendOutcome::AlreadyFriends) => {
            format!("Add friend error: you and {friend} are already friends.")
        }
        Err(_) => format!("Add friend error: user {friend} not found."),
    }
}

pub fn friend_list(store: &UserStore, nickname: &str) -> String {
    let record = match store.lookup(nickname) {
        Some(r) => r,
        None => return "You currently have no friends, add some!".to_string(),
    };
    if record.friends.is_empty() {
        return "You currently have no friends, add some!".to_string();
    }
    let mut out = String::from("Your friends are: ");
    for friend in &record.friends {
        out.push_str(friend);
        out.push(' ');
    }
    out
}

pub fn score(store: &UserStore, nickname: &str) -> String {
    let score = store.lookup(nickname).map(|r| r.score).unwrap_or(0);
    format!("{nickname}, your score is: {score}")
}

pub fn scoreboard(store: &UserStore, nickname: &str) -> String {
    let entries = store.scoreboard_for(nickname);
    entries
        .into_iter()
        .map(|(nick, score)| format!("{nick} {score}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Registration status line, accepted as-is from a [`crate::registration::RegistrationService`]
/// implementation (spec.md §6, out-of-band RPC).
pub fn registration_status_from(outcome: RegisterOutcome) -> &'static str {
    match outcome {
        RegisterOutcome::Created => "Registration succeeded",
        RegisterOutcome::AlreadyExists => "Nickname already taken.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn setup() -> (UserStore, PresenceRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().join("store.json")).unwrap();
        (store, PresenceRegistry::new(), dir)
    }

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn login_unknown_user() {
        let (store, presence, _d) = setup();
        assert_eq!(
            login(&store, &presence, ConnectionId(1), IP, "ghost", "pw", 1),
            HandlerOutcome::Reply(
                "Login error: user ghost not found. Please register.".to_string()
            )
        );
    }

    #[test]
    fn login_wrong_password() {
        let (store, presence, _d) = setup();
        store.register("alice", "pw");
        assert_eq!(
            login(&store, &presence, ConnectionId(1), IP, "alice", "bad", 1),
            HandlerOutcome::Reply("Login error: wrong password.".to_string())
        );
    }

    #[test]
    fn login_success_then_already_logged_in() {
        let (store, presence, _d) = setup();
        store.register("alice", "pw");
        assert_eq!(
            login(&store, &presence, ConnectionId(1), IP, "alice", "pw", 7001),
            HandlerOutcome::Reply("Login successful.".to_string())
        );
        assert_eq!(
            login(&store, &presence, ConnectionId(2), IP, "alice", "pw", 7002),
            HandlerOutcome::Reply("Login error: alice is already logged in.".to_string())
        );
    }

    #[test]
    fn login_same_connection_twice_with_different_account() {
        let (store, presence, _d) = setup();
        store.register("alice", "pw");
        store.register("bob", "pw");
        login(&store, &presence, ConnectionId(1), IP, "alice", "pw", 7001);
        assert_eq!(
            login(&store, &presence, ConnectionId(1), IP, "bob", "pw", 7002),
            HandlerOutcome::Reply(
                "Login error: you are already logged with another account.".to_string()
            )
        );
    }

    #[test]
    fn logout_never_logged_in_is_safe_and_brutal_has_no_reply() {
        let (_store, presence, _d) = setup();
        assert_eq!(logout(&presence, ConnectionId(5), true), None);
        assert_eq!(
            logout(&presence, ConnectionId(5), false),
            Some("Logout successful".to_string())
        );
    }

    #[test]
    fn add_friend_self_and_unknown_and_success() {
        let (store, _presence, _d) = setup();
        store.register("alice", "pw");
        store.register("bob", "pw");
        assert_eq!(
            add_friend(&store, "alice", "alice"),
            "Add friend error: you cannot add yourself as a friend."
        );
        assert_eq!(
            add_friend(&store, "alice", "ghost"),
            "Add friend error: user ghost not found."
        );
        assert_eq!(add_friend(&store, "alice", "bob"), "bob is now your friend.");
        assert_eq!(
            add_friend(&store, "alice", "bob"),
            "Add friend error: you and bob are already friends."
        );
    }

    #[test]
    fn friend_list_empty_and_populated() {
        let (store, _presence, _d) = setup();
        store.register("alice", "pw");
        store.register("bob", "pw");
        assert_eq!(
            friend_list(&store, "alice"),
            "You currently have no friends, add some!"
        );
        add_friend(&store, "alice", "bob");
        assert_eq!(friend_list(&store, "alice"), "Your friends are: bob ");
    }

    #[test]
    fn score_and_scoreboard_lines() {
        let (store, _presence, _d) = setup();
        store.register("alice", "pw");
        store.adjust_score("alice", 7).unwrap();
        assert_eq!(score(&store, "alice"), "alice, your score is: 7");
        assert_eq!(scoreboard(&store, "alice"), "alice 7");
    }
}
