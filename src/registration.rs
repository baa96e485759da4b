// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference `RegistrationService` (spec.md §1 out-of-scope collaborator;
//! SPEC_FULL.md §4.8 fills in a concrete wire format and validation rules).
//!
//! Runs on its own thread with a blocking `std::net::TcpListener`, entirely
//! independent of the session reactor — the only thing the two share is the
//! [`UserStore`].

use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use crate::store::{RegisterOutcome, UserStore};

const MAX_NICKNAME_LEN: usize = 32;

/// Spawn the registration listener on its own thread; returns the address
/// it actually bound (useful when `port` is `0`, letting tests pick a free
/// port the same way the main binary picks a fixed one).
pub fn spawn(bind_address: IpAddr, port: u16, store: Arc<UserStore>) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind((bind_address, port))?;
    let addr = listener.local_addr()?;
    thread::Builder::new()
        .name("wq-registration".to_string())
        .spawn(move || accept_loop(listener, store))
        .expect("spawn registration thread");
    Ok(addr)
}

fn accept_loop(listener: TcpListener, store: Arc<UserStore>) {
    info!(port = listener.local_addr().map(|a| a.port()).unwrap_or(0), "registration service listening");
    for incoming in listener.incoming() {
        let Ok(stream) = incoming else { continue };
        let store = store.clone();
        thread::spawn(move || {
            if let Err(e) = serve_one(stream, &store) {
                warn!(error = %e, "registration connection failed");
            }
        });
    }
}

fn serve_one(mut stream: std::net::TcpStream, store: &UserStore) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let line = line.trim_end_matches(['\r', '\n']);

    let status = handle_request(store, line);
    writeln!(stream, "{status}")
}

fn handle_request(store: &UserStore, line: &str) -> &'static str {
    let Some((nickname, password)) = line.split_once(' ') else {
        return "Invalid username";
    };
    if !valid_nickname(nickname) {
        return "Invalid username";
    }
    if password.is_empty() {
        return "Invalid password";
    }
    match store.register(nickname, password) {
        RegisterOutcome::Created => "Registration succeeded",
        RegisterOutcome::AlreadyExists => "Nickname already taken.",
    }
}

/// 1-32 ASCII alphanumeric characters plus `_`/`-` (SPEC_FULL.md §4.8).
fn valid_nickname(nickname: &str) -> bool {
    !nickname.is_empty()
        && nickname.len() <= MAX_NICKNAME_LEN
        && nickname.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, UserStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().join("store.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn accepts_well_formed_registration() {
        let (_dir, store) = store();
        assert_eq!(handle_request(&store, "alice pw"), "Registration succeeded");
        assert_eq!(handle_request(&store, "alice pw2"), "Nickname already taken.");
    }

    #[test]
    fn rejects_invalid_nickname_and_empty_password() {
        let (_dir, store) = store();
        assert_eq!(handle_request(&store, "a!ice pw"), "Invalid username");
        assert_eq!(handle_request(&store, "alice "), "Invalid password");
        assert_eq!(handle_request(&store, "noseparator"), "Invalid username");
    }

    #[test]
    fn nickname_length_bounds() {
        let long = "a".repeat(33);
        assert!(!valid_nickname(&long));
        let max = "a".repeat(32);
        assert!(valid_nickname(&max));
        assert!(!valid_nickname(""));
    }
}
