// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primary single-threaded readiness loop (spec.md §4.4).
//!
//! Registered interests: the listening socket and each accepted session
//! socket. A read-ready session socket is deregistered before its buffer is
//! drained and handed to the [`crate::workerpool`] — that deregister is the
//! disarm half of the disarm/dispatch/rearm discipline that keeps exactly
//! one worker owning a socket at a time (spec.md §4.4 rationale). The
//! worker pool's completions arrive back over a channel; a registered
//! [`mio::Waker`] makes sure the reactor wakes promptly to apply them
//! instead of waiting out the rest of its current poll timeout.

pub mod connection;

use std::collections::HashMap;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, warn};

use crate::codec::{parse_line, split_lines};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::netio::write_line;
use crate::presence::ConnectionId;
use crate::workerpool::{Job, JobKind, ReactorCommand};
use connection::Connection;

const LISTENER_TOKEN: Token = Token(0);
const COMMAND_TOKEN: Token = Token(1);
const FIRST_CONNECTION_TOKEN: usize = 2;

pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    job_tx: Sender<Job>,
    command_rx: Receiver<ReactorCommand>,
    waker: Arc<Waker>,
}

impl Reactor {
    /// Bind the listening socket and wire up the channels shared with the
    /// worker pool. The pool itself is spawned by the caller once it has a
    /// clone of [`Reactor::waker`].
    pub fn bind(
        config: &ServerConfig,
        job_tx: Sender<Job>,
        command_rx: Receiver<ReactorCommand>,
    ) -> Result<Self, ServerError> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let std_listener = std::net::TcpListener::bind(addr)
            .map_err(|e| ServerError::Bind(format!("{addr}: {e}")))?;
        std_listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), COMMAND_TOKEN)?);

        Ok(Self {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            job_tx,
            command_rx,
            waker,
        })
    }

    /// A clone of the waker that completions must call after pushing onto
    /// `command_rx`'s sender half, so the reactor's poll wakes immediately.
    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// The address actually bound, useful when the configured port was `0`.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn run(mut self) -> ! {
        let mut events = Events::with_capacity(1024);
        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!(error = %e, "poll failed");
                continue;
            }
            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_ready(),
                    COMMAND_TOKEN => self.drain_commands(),
                    token => self.read_ready(token),
                }
            }
        }
    }

    fn accept_ready(&mut self) {
        loop {
            let (mut stream, addr) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            };
            let token = Token(self.next_token);
            self.next_token += 1;
            if self
                .poll
                .registry()
                .register(&mut stream, token, Interest::READABLE)
                .is_err()
            {
                continue;
            }
            debug!(%addr, ?token, "session accepted");
            self.connections.insert(token, Connection::new(stream, addr.ip()));
        }
    }

    fn read_ready(&mut self, token: Token) {
        let Some((peer_ip, mut stream, mut pending)) = self.checkout(token) else {
            return; // spurious event on an already-dispatched or gone connection
        };
        let _ = self.poll.registry().deregister(&mut stream);

        let mut buf = [0u8; 4096];
        let mut eof = false;
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => {
                    eof = true;
                    break;
                }
            }
        }

        let connection_id = ConnectionId(token.0 as u64);

        if eof {
            self.connections.remove(&token);
            self.dispatch(Job {
                connection: connection_id,
                peer_ip,
                stream,
                kind: JobKind::BrutalLogout,
            });
            return;
        }

        let (lines, tail) = split_lines(&pending);
        if lines.is_empty() {
            let _ = self.poll.registry().register(&mut stream, token, Interest::READABLE);
            self.checkin(token, stream, tail);
            return;
        }

        // One request per readiness event (spec.md §4.3); anything past the
        // first complete line is buffered for the connection's next event.
        let first_line = lines[0].clone();
        let mut remainder = Vec::new();
        for line in &lines[1..] {
            remainder.extend_from_slice(line.as_bytes());
            remainder.push(b'\n');
        }
        remainder.extend_from_slice(&tail);

        match parse_line(&first_line) {
            Ok(request) => {
                if let Some(conn) = self.connections.get_mut(&token) {
                    conn.pending = remainder;
                }
                self.dispatch(Job {
                    connection: connection_id,
                    peer_ip,
                    stream,
                    kind: JobKind::Request(request),
                });
            }
            Err(e) => {
                warn!(error = %e, ?token, "malformed request line");
                let _ = write_line(&mut stream, "Error: malformed request.");
                let _ = self.poll.registry().register(&mut stream, token, Interest::READABLE);
                self.checkin(token, stream, remainder);
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                ReactorCommand::Rearm { connection, mut stream } => {
                    let token = Token(connection.0 as usize);
                    if self
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                        .is_ok()
                    {
                        if let Some(conn) = self.connections.get_mut(&token) {
                            conn.stream = Some(stream);
                        }
                    }
                }
                ReactorCommand::Close { connection } => {
                    let token = Token(connection.0 as usize);
                    self.connections.remove(&token);
                }
            }
        }
    }

    fn dispatch(&self, job: Job) {
        let _ = self.job_tx.send(job);
    }

    /// Take ownership of a connection's stream and buffered bytes for the
    /// duration of one read-ready cycle.
    fn checkout(&mut self, token: Token) -> Option<(std::net::IpAddr, mio::net::TcpStream, Vec<u8>)> {
        let conn = self.connections.get_mut(&token)?;
        let stream = conn.stream.take()?;
        Some((conn.peer_ip, stream, std::mem::take(&mut conn.pending)))
    }

    fn checkin(&mut self, token: Token, stream: mio::net::TcpStream, pending: Vec<u8>) {
        if let Some(conn) = self.connections.get_mut(&token) {
            conn.stream = Some(stream);
            conn.pending = pending;
        }
    }
}
