// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two-phase duel orchestrator (spec.md §4.7).
//!
//! Runs entirely inside the worker thread that was dispatched the `match`
//! request: the challenger's session socket is owned by this call for the
//! whole duel (per spec.md §4.5, "the MatchOrchestrator... runs its own
//! secondary reactor inside a single task so it does not starve peer
//! handlers"). Preflight and invitation talk directly on that socket and a
//! throwaway UDP socket; Phase 2/3 run a dedicated [`mio::Poll`] over the two
//! duel sockets, independent of the primary reactor.

pub mod scoring;
pub mod state;

use std::collections::HashMap;
use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use crate::error::MatchError;
use crate::netio::write_line;
use crate::presence::{ConnectionId, PresenceRegistry};
use crate::store::UserStore;
use crate::wordsource::{WordEntry, WordSource};
use crate::ServerConfig;

use scoring::{classify, finalize, outcome_for, raw_score};
use state::{DuelState, Peer, PeerProgress};

const LISTENER_TOKEN: Token = Token(0);
const CHALLENGER_TOKEN: Token = Token(1);
const CHALLENGED_TOKEN: Token = Token(2);
const POLL_TICK: Duration = Duration::from_millis(200);

/// Everything the orchestrator needs, bundled so worker dispatch can pass
/// one reference instead of four.
pub struct MatchDeps<'a> {
    pub store: &'a UserStore,
    pub presence: &'a PresenceRegistry,
    pub words: &'a dyn WordSource,
    pub config: &'a ServerConfig,
}

/// Run a full duel for a `match <friend>` request dispatched on
/// `session_stream` (the challenger's session socket). Every reply the
/// protocol defines is written directly on `session_stream`; the function
/// never returns a reply string because, unlike every other handler, it may
/// write several messages over a long-lived call.
pub fn run_match(
    deps: &MatchDeps,
    challenger_connection: ConnectionId,
    challenger: &str,
    challenged: &str,
    session_stream: &mut TcpStream,
) {
    if challenger == challenged {
        reply(session_stream, "Match error: you cannot challenge yourself.");
        return;
    }

    let challenger_record = match deps.store.lookup(challenger) {
        Some(r) => r,
        None => return, // logged in but record vanished: nothing sane to do
    };
    if !challenger_record.friends.contains(challenged) {
        reply(
            session_stream,
            &format!("Match error: you are not friends with {challenged}."),
        );
        return;
    }
    if !deps.presence.is_online(challenged) {
        reply(
            session_stream,
            &format!("Match error: {challenged} is not online."),
        );
        return;
    }
    let Some(challenged_endpoint) = deps.presence.endpoint_of(challenged) else {
        reply(
            session_stream,
            &format!("Match error: {challenged} is not online."),
        );
        return;
    };
    let challenger_ip = match session_stream.peer_addr() {
        Ok(addr) => addr.ip(),
        Err(_) => return,
    };

    let mut duel_state = DuelState::InvitationSent;
    let invitation = match invite(deps.config, challenger, challenged_endpoint) {
        Ok(i) => i,
        Err(e) => {
            warn!(error = %e, "failed to open invitation sockets");
            return;
        }
    };

    match invitation {
        InvitationResult::Refused => {
            duel_state = DuelState::Refused;
            reply(
                session_stream,
                &format!("{challenged} refused your match invitation."),
            );
        }
        InvitationResult::TimedOut => {
            duel_state = DuelState::TimedOut;
            reply(
                session_stream,
                &format!("Match error: invitation to {challenged} timed out."),
            );
        }
        InvitationResult::Accepted { duel_listener, duel_port } => {
            duel_state = DuelState::Accepted;
            reply(
                session_stream,
                &format!("{challenged} accepted your match invitation./{duel_port}"),
            );
            if let Err(e) = run_duel_to_completion(
                deps,
                challenger,
                challenged,
                challenger_ip,
                challenged_endpoint.ip(),
                duel_listener,
            ) {
                warn!(error = %e, "duel aborted before scoring");
            }
        }
    }
    debug!(?duel_state, challenger, challenged, "invitation phase resolved");

    let _ = challenger_connection; // kept for symmetry with other handlers; presence lookups use the nickname
}

enum InvitationResult {
    Refused,
    TimedOut,
    Accepted {
        duel_listener: TcpListener,
        duel_port: u16,
    },
}

/// Phase 1 (spec.md §4.7): ephemeral duel listener + a timed UDP round trip.
fn invite(
    config: &ServerConfig,
    challenger: &str,
    challenged_endpoint: SocketAddr,
) -> Result<InvitationResult, MatchError> {
    let std_listener = std::net::TcpListener::bind((config.bind_address, 0))?;
    std_listener.set_nonblocking(true)?;
    let duel_port = std_listener.local_addr()?.port();
    let duel_listener = TcpListener::from_std(std_listener);

    let udp = UdpSocket::bind((config.bind_address, 0))?;
    udp.set_read_timeout(Some(config.accept_timer()))?;
    udp.send_to(format!("{challenger}/{duel_port}").as_bytes(), challenged_endpoint)?;

    let mut buf = [0u8; 256];
    match udp.recv_from(&mut buf) {
        Ok((n, _from)) => {
            let payload = String::from_utf8_lossy(&buf[..n]);
            match payload.trim() {
                "Y" => Ok(InvitationResult::Accepted {
                    duel_listener,
                    duel_port,
                }),
                _ => Ok(InvitationResult::Refused),
            }
        }
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            let _ = udp.send_to(format!("TIMEOUT/{challenger}").as_bytes(), challenged_endpoint);
            Ok(InvitationResult::TimedOut)
        }
        Err(e) => Err(e.into()),
    }
}

struct Slot {
    stream: Option<TcpStream>,
    addr: Option<SocketAddr>,
    progress: PeerProgress,
    pending: Vec<u8>,
    crashed: bool,
}

impl Slot {
    fn empty() -> Self {
        Self {
            stream: None,
            addr: None,
            progress: PeerProgress::default(),
            pending: Vec::new(),
            crashed: false,
        }
    }
}

/// Phase 2 (rendezvous) + Phase 3 (round exchange) + Phase 4 (scoring),
/// driven by one dedicated [`Poll`] for the duel listener and the two
/// accepted duel sockets.
fn run_duel_to_completion(
    deps: &MatchDeps,
    challenger: &str,
    challenged: &str,
    challenger_ip: IpAddr,
    challenged_ip: IpAddr,
    mut duel_listener: TcpListener,
) -> Result<(), MatchError> {
    let mut poll = Poll::new()?;
    poll.registry()
        .register(&mut duel_listener, LISTENER_TOKEN, Interest::READABLE)?;

    let words = deps.words.next_batch(deps.config.match_words);
    let match_words = words.len();

    let mut challenger_slot = Slot::empty();
    let mut challenged_slot = Slot::empty();
    let mut events = Events::with_capacity(16);
    let deadline = Instant::now() + deps.config.match_timer();
    let mut state = DuelState::AwaitingRendezvous;

    loop {
        let both_connected = challenger_slot.stream.is_some() && challenged_slot.stream.is_some();
        if state == DuelState::AwaitingRendezvous && both_connected {
            state = DuelState::Rendezvoused;
        }
        if state == DuelState::Rendezvoused {
            state = DuelState::InProgress;
        }
        let both_finished = both_connected
            && challenger_slot.progress.finished(match_words)
            && challenged_slot.progress.finished(match_words);
        if both_finished {
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        if poll.poll(&mut events, Some(remaining.min(POLL_TICK))).is_err() {
            break;
        }

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    accept_duel_peers(
                        &poll,
                        &mut duel_listener,
                        challenger_ip,
                        challenged_ip,
                        &mut challenger_slot,
                        &mut challenged_slot,
                    );
                }
                CHALLENGER_TOKEN => {
                    service_slot(&mut challenger_slot, &words, match_words);
                }
                CHALLENGED_TOKEN => {
                    service_slot(&mut challenged_slot, &words, match_words);
                }
                _ => {}
            }
        }
    }

    let _ = poll.registry().deregister(&mut duel_listener);

    let both_finished = challenger_slot.progress.finished(match_words)
        && challenged_slot.progress.finished(match_words);
    let any_crashed = challenger_slot.crashed || challenged_slot.crashed;
    state = if !both_finished {
        DuelState::Expired
    } else if any_crashed {
        DuelState::Aborted
    } else {
        DuelState::Scored
    };
    let timed_out = state == DuelState::Expired;
    debug!(?state, challenger, challenged, "duel reached terminal state");

    score_and_report(
        deps,
        challenger,
        challenged,
        &words,
        match_words,
        &mut challenger_slot,
        &mut challenged_slot,
        timed_out,
    );

    Ok(())
}

fn accept_duel_peers(
    poll: &Poll,
    duel_listener: &mut TcpListener,
    challenger_ip: IpAddr,
    challenged_ip: IpAddr,
    challenger_slot: &mut Slot,
    challenged_slot: &mut Slot,
) {
    loop {
        let (mut stream, addr) = match duel_listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(_) => return,
        };
        let peer = classify_peer(
            addr.ip(),
            challenger_ip,
            challenged_ip,
            challenger_slot.stream.is_none(),
            challenged_slot.stream.is_none(),
        );
        let (slot, token): (&mut Slot, Token) = match peer {
            Peer::Challenger => (challenger_slot, CHALLENGER_TOKEN),
            Peer::Challenged => (challenged_slot, CHALLENGED_TOKEN),
        };
        if poll.registry().register(&mut stream, token, Interest::READABLE).is_err() {
            continue;
        }
        slot.addr = Some(addr);
        slot.stream = Some(stream);
        debug!(%addr, ?token, "duel peer rendezvoused");
    }
}

/// Identify which peer a rendezvous connection belongs to by matching its
/// source IP against the registered session/datagram endpoints (spec.md
/// §4.7 Phase 2: "identifying each accepted socket by the peer's IP"). When
/// both peers share an address (e.g. both on loopback, as in tests) fall
/// back to filling whichever slot is still empty, challenger first.
fn classify_peer(
    addr_ip: IpAddr,
    challenger_ip: IpAddr,
    challenged_ip: IpAddr,
    challenger_slot_free: bool,
    challenged_slot_free: bool,
) -> Peer {
    let matches_challenger = addr_ip == challenger_ip;
    let matches_challenged = addr_ip == challenged_ip;
    if matches_challenger && !matches_challenged && challenger_slot_free {
        Peer::Challenger
    } else if matches_challenged && !matches_challenger && challenged_slot_free {
        Peer::Challenged
    } else if challenger_slot_free {
        Peer::Challenger
    } else {
        Peer::Challenged
    }
}

/// Drain one duel socket's readiness, applying spec.md §4.7 Phase 3's
/// framing (`"<text>/<peerNickname>"`, `START`, or a translation answer).
fn service_slot(slot: &mut Slot, words: &[WordEntry], match_words: usize) {
    let Some(stream) = slot.stream.as_mut() else {
        return;
    };
    let mut buf = [0u8; 1024];
    let mut crashed = false;
    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                crashed = true;
                break;
            }
            Ok(n) => slot.pending.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(_) => {
                crashed = true;
                break;
            }
        }
    }

    let mut start = 0;
    let mut replies: Vec<String> = Vec::new();
    for (i, b) in slot.pending.iter().enumerate() {
        if *b == b'\n' {
            let line = String::from_utf8_lossy(&slot.pending[start..i])
                .trim_end_matches('\r')
                .to_string();
            start = i + 1;
            if let Some(next_word) = handle_duel_line(&mut slot.progress, &line, words, match_words) {
                replies.push(next_word);
            }
        }
    }
    slot.pending.drain(..start);

    if crashed {
        slot.crashed = true;
        slot.progress.mark_crashed(match_words);
        slot.stream = None;
        return;
    }

    if let Some(stream) = slot.stream.as_mut() {
        for line in replies {
            if write_line(stream, &line).is_err() {
                slot.crashed = true;
                slot.progress.mark_crashed(match_words);
                slot.stream = None;
                return;
            }
        }
    }
}

/// Returns the next line to send the peer (a bare word), if any.
fn handle_duel_line(
    progress: &mut PeerProgress,
    line: &str,
    words: &[WordEntry],
    match_words: usize,
) -> Option<String> {
    let (text, _peer_nick) = line.split_once('/')?;
    if text == "START" {
        progress.cursor = 1;
        return words.first().map(|(w, _)| w.clone());
    }
    if progress.answers.len() >= match_words {
        return None; // extra input after completion; ignore
    }
    progress.answers.push(text.to_string());
    if progress.cursor < match_words {
        let next = words[progress.cursor].0.clone();
        progress.cursor += 1;
        Some(next)
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
fn score_and_report(
    deps: &MatchDeps,
    challenger: &str,
    challenged: &str,
    words: &[WordEntry],
    match_words: usize,
    challenger_slot: &mut Slot,
    challenged_slot: &mut Slot,
    timed_out: bool,
) {
    challenger_slot.progress.mark_crashed(match_words); // no-op if already full
    challenged_slot.progress.mark_crashed(match_words);

    let translations: HashMap<&str, &std::collections::HashSet<String>> =
        words.iter().map(|(w, t)| (w.as_str(), t)).collect();

    let score_of = |progress: &PeerProgress| -> i64 {
        let answers: Vec<_> = progress
            .answers
            .iter()
            .zip(words.iter())
            .map(|(answer, (word, _))| classify(answer, translations[word.as_str()]))
            .collect();
        raw_score(&answers)
    };

    let challenger_raw = score_of(&challenger_slot.progress);
    let challenged_raw = score_of(&challenged_slot.progress);
    let (challenger_final, challenged_final) = finalize(challenger_raw, challenged_raw);

    if let Err(e) = deps.store.adjust_score(challenger, challenger_final) {
        warn!(user = challenger, error = %e, "failed to persist duel score");
    }
    if let Err(e) = deps.store.adjust_score(challenged, challenged_final) {
        warn!(user = challenged, error = %e, "failed to persist duel score");
    }

    send_final(challenger_slot, challenger_final, challenged_final, timed_out);
    send_final(challenged_slot, challenged_final, challenger_final, timed_out);

    info!(
        challenger,
        challenged, challenger_final, challenged_final, timed_out, "duel scored"
    );
}

fn send_final(slot: &mut Slot, mine: i64, theirs: i64, timed_out: bool) {
    let Some(stream) = slot.stream.as_mut() else {
        return;
    };
    let outcome = outcome_for(mine, theirs).as_word();
    let prefix = if timed_out { "Time out: " } else { "" };
    let line = format!("{prefix}END/You have scored: {mine} points. You {outcome}.");
    let _ = write_line(stream, &line);
}

fn reply(stream: &mut TcpStream, text: &str) {
    let _ = write_line(stream, text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_peer_by_distinct_ips() {
        let challenger_ip: IpAddr = "10.0.0.1".parse().unwrap();
        let challenged_ip: IpAddr = "10.0.0.2".parse().unwrap();
        assert_eq!(
            classify_peer(challenger_ip, challenger_ip, challenged_ip, true, true),
            Peer::Challenger
        );
        assert_eq!(
            classify_peer(challenged_ip, challenger_ip, challenged_ip, true, true),
            Peer::Challenged
        );
    }

    #[test]
    fn classify_peer_falls_back_when_ips_collide() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(classify_peer(ip, ip, ip, true, true), Peer::Challenger);
        assert_eq!(classify_peer(ip, ip, ip, false, true), Peer::Challenged);
    }

    #[test]
    fn duel_line_handles_start_then_answers() {
        let words = vec![
            ("casa".to_string(), std::collections::HashSet::from(["house".to_string()])),
            ("cane".to_string(), std::collections::HashSet::from(["dog".to_string()])),
        ];
        let mut progress = PeerProgress::default();
        assert_eq!(
            handle_duel_line(&mut progress, "START/alice", &words, 2),
            Some("casa".to_string())
        );
        assert_eq!(
            handle_duel_line(&mut progress, "house/alice", &words, 2),
            Some("cane".to_string())
        );
        assert_eq!(handle_duel_line(&mut progress, "dog/alice", &words, 2), None);
        assert_eq!(progress.answers, vec!["house".to_string(), "dog".to_string()]);
        assert!(progress.finished(2));
    }
}
