// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Crate-wide error types.
//!
//! Each enum corresponds to one row of the error disposition table: a
//! handler never panics on an expected condition, it returns one of these
//! and the dispatch loop turns it into a reply line or a brutal logout.

use std::fmt;

/// Errors from [`crate::store::UserStore`] mutators and readers. Outcomes
/// that are ordinary, expected results — a taken nickname, an existing
/// friendship — travel as `Ok(...Outcome)` values instead (spec.md §4.1);
/// this enum is only for a referenced user that does not exist at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    UnknownUser(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownUser(n) => write!(f, "user {n} not found"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from [`crate::presence::PresenceRegistry`] compound operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceError {
    NicknameBusy,
    ConnectionBusy,
}

impl fmt::Display for PresenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NicknameBusy => write!(f, "nickname already online"),
            Self::ConnectionBusy => write!(f, "connection already bound to another nickname"),
        }
    }
}

impl std::error::Error for PresenceError {}

/// Errors parsing a framed client request (see [`crate::codec`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Empty,
    UnknownOpcode(String),
    MissingArgument { opcode: u8, expected: usize },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty request line"),
            Self::UnknownOpcode(s) => write!(f, "unknown opcode: {s}"),
            Self::MissingArgument { opcode, expected } => {
                write!(f, "opcode {opcode} expects {expected} argument(s)")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Errors from [`crate::matchmaking`]'s invitation and rendezvous sockets
/// (spec.md §7, MatchOrchestrator row: logged, the duel ends without a
/// score rather than taking the whole worker down).
#[derive(Debug)]
pub enum MatchError {
    Io(std::io::Error),
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "match socket error: {e}"),
        }
    }
}

impl std::error::Error for MatchError {}

impl From<std::io::Error> for MatchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Top-level server error, for startup and fatal I/O conditions (spec.md §7,
/// "Fatal" row: logged, the affected connection or bind attempt is dropped).
#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Bind(String),
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(s) => write!(f, "configuration error: {s}"),
            Self::Bind(s) => write!(f, "bind error: {s}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
