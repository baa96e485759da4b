// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Word Quizzle session server: a single-reactor I/O multiplexer, a bounded
//! worker pool, and the two-phase match protocol that runs on top of them.
//!
//! `main.rs` is a thin binary shell; everything that can be unit-tested
//! lives here so the test suite never needs a running process.

pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod matchmaking;
pub mod netio;
pub mod presence;
pub mod reactor;
pub mod registration;
pub mod store;
pub mod wordsource;
pub mod workerpool;

pub use config::ServerConfig;
pub use presence::PresenceRegistry;
pub use store::UserStore;
