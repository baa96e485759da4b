// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Password fingerprinting.
//!
//! The source system hashed passwords with an unsalted 32-bit digest
//! (spec.md §9 design note). Per that note's guidance we keep the store
//! contract — a single opaque, comparable, non-reversible token per user —
//! but strengthen the scheme to a salted SHA-256 digest.

use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;

/// Compute a fresh salted fingerprint for `password`.
pub fn fingerprint(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    fingerprint_with_salt(password, &salt)
}

/// Check `password` against a previously stored `"<salt-hex>:<digest-hex>"` token.
pub fn verify(password: &str, stored: &str) -> bool {
    let Some((salt_hex, _)) = stored.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex_decode(salt_hex) else {
        return false;
    };
    fingerprint_with_salt(password, &salt) == stored
}

fn fingerprint_with_salt(password: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    format!("{}:{}", hex_encode(salt), hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_correct_password() {
        let token = fingerprint("hunter2");
        assert!(verify("hunter2", &token));
    }

    #[test]
    fn rejects_wrong_password() {
        let token = fingerprint("hunter2");
        assert!(!verify("wrong", &token));
    }

    #[test]
    fn same_password_salts_differently() {
        let a = fingerprint("hunter2");
        let b = fingerprint("hunter2");
        assert_ne!(a, b, "two registrations of the same password must not collide");
        assert!(verify("hunter2", &a));
        assert!(verify("hunter2", &b));
    }

    #[test]
    fn rejects_garbage_token() {
        assert!(!verify("hunter2", "not-a-token"));
    }
}
