// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Persistent user store.
//!
//! A single `RwLock`-guarded map is sufficient at this scale (spec.md §4.1:
//! "concurrency domain is small and writes are infrequent"). Readers take a
//! shared lock and clone the record they need; writers take an exclusive
//! lock, mutate, and durably persist before releasing it, so "after every
//! mutation" durability (spec.md §4.1) is trivially satisfied by construction
//! rather than by a separate commit step.

mod password;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::error;

use crate::error::StoreError;

/// On-disk and in-memory representation of one registered user.
///
/// `friends` is a `BTreeSet` so the serialized form is stable and so
/// `friend_list`/`scoreboard` never need to sort it on every read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub nickname: String,
    pub pwd_hash: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub friends: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddFriendOutcome {
    Added,
    AlreadyFriends,
}

/// Thread-safe, durable mapping nickname -> [`UserRecord`].
pub struct UserStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, UserRecord>>,
}

impl UserStore {
    /// Open (or create) the store at `path`, loading any existing records.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// `register(nickname, password) -> {Created | AlreadyExists}` (spec.md §4.1).
    pub fn register(&self, nickname: &str, password: &str) -> RegisterOutcome {
        let mut records = self.records.write();
        if records.contains_key(nickname) {
            return RegisterOutcome::AlreadyExists;
        }
        records.insert(
            nickname.to_string(),
            UserRecord {
                nickname: nickname.to_string(),
                pwd_hash: password::fingerprint(password),
                score: 0,
                friends: BTreeSet::new(),
            },
        );
        self.persist(&records);
        RegisterOutcome::Created
    }

    /// Snapshot read.
    pub fn lookup(&self, nickname: &str) -> Option<UserRecord> {
        self.records.read().get(nickname).cloned()
    }

    /// `verify(nickname, password) -> bool`; no side effect.
    pub fn verify(&self, nickname: &str, password: &str) -> bool {
        match self.records.read().get(nickname) {
            Some(record) => password::verify(password, &record.pwd_hash),
            None => false,
        }
    }

    /// `addFriendship(a, b) -> {Added | AlreadyFriends | UnknownUser}` (spec.md §4.1).
    ///
    /// Caller enforces `a != b`; both records are mutated under one write
    /// lock so a concurrent reader never observes one side of the edge
    /// without the other.
    pub fn add_friendship(
        &self,
        a: &str,
        b: &str,
    ) -> Result<AddFriendOutcome, StoreError> {
        let mut records = self.records.write();
        if !records.contains_key(a) {
            return Err(StoreError::UnknownUser(a.to_string()));
        }
        if !records.contains_key(b) {
            return Err(StoreError::UnknownUser(b.to_string()));
        }
        let already = records.get(a).is_some_and(|r| r.friends.contains(b));
        if already {
            return Ok(AddFriendOutcome::AlreadyFriends);
        }
        records.get_mut(a).unwrap().friends.insert(b.to_string());
        records.get_mut(b).unwrap().friends.insert(a.to_string());
        self.persist(&records);
        Ok(AddFriendOutcome::Added)
    }

    /// Atomic add to score, durably persisted.
    pub fn adjust_score(&self, nickname: &str, delta: i64) -> Result<i64, StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(nickname)
            .ok_or_else(|| StoreError::UnknownUser(nickname.to_string()))?;
        record.score += delta;
        let new_score = record.score;
        self.persist(&records);
        Ok(new_score)
    }

    /// Write-new/fsync/rename: the full store image, committed before the
    /// mutator that called us returns (spec.md §4.1). Failure is logged and
    /// swallowed — spec.md §7/§9: persistence failure is fire-and-forget,
    /// availability over durability, made explicit rather than left implicit.
    fn persist(&self, records: &BTreeMap<String, UserRecord>) {
        if let Err(e) = self.persist_inner(records) {
            error!(path = %self.path.display(), error = %e, "failed to persist user store");
        }
    }

    fn persist_inner(&self, records: &BTreeMap<String, UserRecord>) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(records)?;
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        let tmp_path = match dir {
            Some(dir) => dir.join(format!(
                ".{}.tmp",
                self.path.file_name().and_then(|n| n.to_str()).unwrap_or("store")
            )),
            None => PathBuf::from(format!(
                ".{}.tmp",
                self.path.file_name().and_then(|n| n.to_str()).unwrap_or("store")
            )),
        };
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Sorted `(nickname, score)` for the caller and all of the caller's
    /// friends, score descending, stable tie-break (spec.md §4.6 scoreboard).
    pub fn scoreboard_for(&self, nickname: &str) -> Vec<(String, i64)> {
        let records = self.records.read();
        let Some(me) = records.get(nickname) else {
            return Vec::new();
        };
        let mut entries: Vec<(String, i64)> = std::iter::once(nickname.to_string())
            .chain(me.friends.iter().cloned())
            .filter_map(|n| records.get(&n).map(|r| (n, r.score)))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }

    fn path_for_tests(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, UserStore) {
        let dir = tempdir().unwrap();
        let store = UserStore::open(dir.path().join("store.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn register_then_duplicate_fails() {
        let (_dir, store) = store();
        assert_eq!(store.register("alice", "pw"), RegisterOutcome::Created);
        assert_eq!(
            store.register("alice", "pw2"),
            RegisterOutcome::AlreadyExists
        );
    }

    #[test]
    fn verify_round_trips_password() {
        let (_dir, store) = store();
        store.register("alice", "pw");
        assert!(store.verify("alice", "pw"));
        assert!(!store.verify("alice", "wrong"));
        assert!(!store.verify("nobody", "pw"));
    }

    #[test]
    fn friendship_is_symmetric_and_idempotent() {
        let (_dir, store) = store();
        store.register("alice", "pw");
        store.register("bob", "pw");
        assert_eq!(
            store.add_friendship("alice", "bob").unwrap(),
            AddFriendOutcome::Added
        );
        assert_eq!(
            store.add_friendship("bob", "alice").unwrap(),
            AddFriendOutcome::AlreadyFriends
        );
        let alice = store.lookup("alice").unwrap();
        let bob = store.lookup("bob").unwrap();
        assert!(alice.friends.contains("bob"));
        assert!(bob.friends.contains("alice"));
    }

    #[test]
    fn add_friendship_unknown_user() {
        let (_dir, store) = store();
        store.register("alice", "pw");
        assert_eq!(
            store.add_friendship("alice", "ghost"),
            Err(StoreError::UnknownUser("ghost".to_string()))
        );
    }

    #[test]
    fn adjust_score_accumulates() {
        let (_dir, store) = store();
        store.register("alice", "pw");
        store.adjust_score("alice", 7).unwrap();
        store.adjust_score("alice", -2).unwrap();
        assert_eq!(store.lookup("alice").unwrap().score, 5);
    }

    #[test]
    fn persistence_round_trips_bitwise_equal_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = UserStore::open(&path).unwrap();
            store.register("alice", "pw");
            store.register("bob", "pw");
            store.add_friendship("alice", "bob").unwrap();
            store.adjust_score("alice", 42).unwrap();
        }
        let reopened = UserStore::open(&path).unwrap();
        let alice = reopened.lookup("alice").unwrap();
        assert_eq!(alice.score, 42);
        assert!(alice.friends.contains("bob"));
        assert_eq!(reopened.lookup("bob").unwrap().friends.len(), 1);
    }

    #[test]
    fn scoreboard_includes_self_and_friends_sorted_descending() {
        let (_dir, store) = store();
        store.register("alice", "pw");
        store.register("bob", "pw");
        store.register("carol", "pw");
        store.add_friendship("alice", "bob").unwrap();
        store.add_friendship("alice", "carol").unwrap();
        store.adjust_score("alice", 5).unwrap();
        store.adjust_score("bob", 10).unwrap();
        store.adjust_score("carol", 1).unwrap();
        let board = store.scoreboard_for("alice");
        assert_eq!(
            board,
            vec![
                ("bob".to_string(), 10),
                ("alice".to_string(), 5),
                ("carol".to_string(), 1),
            ]
        );
    }

    #[test]
    fn store_path_round_trips_through_accessor() {
        let (_dir, store) = store();
        assert!(store.path_for_tests().ends_with("store.json"));
    }
}
