// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounded worker pool (spec.md §4.5).
//!
//! Each worker thread pulls one [`Job`] at a time and never blocks on
//! another job — the one exception spec.md §4.5 carves out is the match
//! orchestrator, which is still just one call inside one worker's turn, it
//! simply takes longer. A job carries the session socket itself: handing
//! the `mio::net::TcpStream` across the channel *is* the ownership transfer
//! spec.md §4.4 describes as "the reactor disarms, the worker owns, the
//! worker re-arms" — there is no separate buffer-only handoff to track.

use std::net::IpAddr;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{Receiver, Sender};
use mio::net::TcpStream;
use mio::Waker;
use tracing::{debug, warn};

use crate::codec::Request;
use crate::config::ServerConfig;
use crate::handlers::{self, HandlerOutcome};
use crate::matchmaking::{self, MatchDeps};
use crate::netio::write_line;
use crate::presence::{ConnectionId, PresenceRegistry};
use crate::store::UserStore;
use crate::wordsource::WordSource;

/// One unit of work dispatched by the reactor, carrying the session socket
/// it was read from.
pub struct Job {
    pub connection: ConnectionId,
    pub peer_ip: IpAddr,
    pub stream: TcpStream,
    pub kind: JobKind,
}

pub enum JobKind {
    Request(Request),
    /// The reactor observed EOF; there is no request to parse (spec.md §4.4).
    BrutalLogout,
}

/// What a worker asks the reactor to do with a session socket once it is
/// done with it.
pub enum ReactorCommand {
    Rearm { connection: ConnectionId, stream: TcpStream },
    Close { connection: ConnectionId },
}

const NOT_LOGGED_IN: &str = "Error: you must be logged in.";

/// Spawn `worker_count` threads pulling from `jobs` and posting completions
/// to `results`, waking the reactor after every send so it doesn't wait out
/// the rest of its current poll timeout.
#[allow(clippy::too_many_arguments)]
pub fn spawn(
    worker_count: usize,
    jobs: Receiver<Job>,
    results: Sender<ReactorCommand>,
    waker: Arc<Waker>,
    store: Arc<UserStore>,
    presence: Arc<PresenceRegistry>,
    words: Arc<dyn WordSource>,
    config: Arc<ServerConfig>,
) {
    for id in 0..worker_count {
        let jobs = jobs.clone();
        let results = results.clone();
        let waker = waker.clone();
        let store = store.clone();
        let presence = presence.clone();
        let words = words.clone();
        let config = config.clone();
        thread::Builder::new()
            .name(format!("wq-worker-{id}"))
            .spawn(move || worker_loop(id, jobs, results, waker, store, presence, words, config))
            .expect("spawn worker thread");
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    id: usize,
    jobs: Receiver<Job>,
    results: Sender<ReactorCommand>,
    waker: Arc<Waker>,
    store: Arc<UserStore>,
    presence: Arc<PresenceRegistry>,
    words: Arc<dyn WordSource>,
    config: Arc<ServerConfig>,
) {
    while let Ok(job) = jobs.recv() {
        let Job { connection, peer_ip, mut stream, kind } = job;
        match kind {
            JobKind::BrutalLogout => {
                handlers::logout(&presence, connection, true);
                debug!(worker = id, connection = connection.0, "brutal logout");
                complete(&results, &waker, ReactorCommand::Close { connection });
            }
            JobKind::Request(request) => {
                let deps = MatchDeps {
                    store: &store,
                    presence: &presence,
                    words: words.as_ref(),
                    config: &config,
                };
                let (reply, close) =
                    dispatch_request(&deps, connection, peer_ip, &mut stream, request);

                let write_failed = match reply {
                    Some(line) => write_line(&mut stream, &line).is_err(),
                    None => false,
                };

                if close || write_failed {
                    complete(&results, &waker, ReactorCommand::Close { connection });
                } else {
                    complete(&results, &waker, ReactorCommand::Rearm { connection, stream });
                }
            }
        }
    }
}

fn complete(results: &Sender<ReactorCommand>, waker: &Waker, command: ReactorCommand) {
    if results.send(command).is_ok() {
        if let Err(e) = waker.wake() {
            warn!(error = %e, "failed to wake reactor");
        }
    }
}

/// Resolve `request` into an optional reply line and whether the session
/// socket should be closed afterward. `Match` is the exception: it writes
/// its own replies over the course of the duel and always leaves the
/// connection open (spec.md §4.7: "re-arm read interest on the challenger's
/// session socket" once the duel reaches a terminal state).
fn dispatch_request(
    deps: &MatchDeps,
    connection: ConnectionId,
    peer_ip: IpAddr,
    stream: &mut TcpStream,
    request: Request,
) -> (Option<String>, bool) {
    match request {
        Request::Login { nickname, password, udp_port } => {
            match handlers::login(deps.store, deps.presence, connection, peer_ip, &nickname, &password, udp_port) {
                HandlerOutcome::Reply(line) => (Some(line), false),
                HandlerOutcome::ReplyThenClose(line) => (Some(line), true),
            }
        }
        Request::Logout => {
            let reply = handlers::logout(deps.presence, connection, false);
            (reply, true)
        }
        Request::AddFriend { friend } => {
            with_nickname(deps, connection, |nickname| handlers::add_friend(deps.store, nickname, &friend))
        }
        Request::FriendList => {
            with_nickname(deps, connection, |nickname| handlers::friend_list(deps.store, nickname))
        }
        Request::Score => with_nickname(deps, connection, |nickname| handlers::score(deps.store, nickname)),
        Request::Scoreboard => {
            with_nickname(deps, connection, |nickname| handlers::scoreboard(deps.store, nickname))
        }
        Request::Match { friend } => match deps.presence.nickname_of(connection) {
            Some(nickname) => {
                matchmaking::run_match(deps, connection, &nickname, &friend, stream);
                (None, false)
            }
            None => (Some(NOT_LOGGED_IN.to_string()), false),
        },
    }
}

fn with_nickname(
    deps: &MatchDeps,
    connection: ConnectionId,
    f: impl FnOnce(&str) -> String,
) -> (Option<String>, bool) {
    match deps.presence.nickname_of(connection) {
        Some(nickname) => (Some(f(&nickname)), false),
        None => (Some(NOT_LOGGED_IN.to_string()), false),
    }
}
