// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Server startup configuration.
//!
//! Layering: built-in defaults, then an optional JSON config file, then CLI
//! flags, each overriding the previous. Defaults match the reference
//! deployment from spec.md §6: port 8888, one-minute match timer, 15s
//! invitation timer, 5 words per match, registration RPC on 5678.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind_address: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_registration_port")]
    pub registration_port: u16,

    /// Duel wall-clock duration, in minutes.
    #[serde(default = "default_match_timer_minutes")]
    pub match_timer_minutes: u64,

    /// Invitation datagram receive timeout, in seconds.
    #[serde(default = "default_accept_timer_secs")]
    pub accept_timer_secs: u64,

    /// Number of distinct words per duel.
    #[serde(default = "default_match_words")]
    pub match_words: usize,

    /// Size of the bounded worker pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_bind() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}
fn default_port() -> u16 {
    8888
}
fn default_registration_port() -> u16 {
    5678
}
fn default_match_timer_minutes() -> u64 {
    1
}
fn default_accept_timer_secs() -> u64 {
    15
}
fn default_match_words() -> usize {
    5
}
fn default_worker_count() -> usize {
    4
}
fn default_store_path() -> PathBuf {
    PathBuf::from("wordquizzle_store.json")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind(),
            port: default_port(),
            registration_port: default_registration_port(),
            match_timer_minutes: default_match_timer_minutes(),
            accept_timer_secs: default_accept_timer_secs(),
            match_words: default_match_words(),
            worker_count: default_worker_count(),
            store_path: default_store_path(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| ServerError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.port == 0 {
            return Err(ServerError::Config("port cannot be 0".into()));
        }
        if self.match_words == 0 {
            return Err(ServerError::Config("match_words cannot be 0".into()));
        }
        if self.worker_count == 0 {
            return Err(ServerError::Config("worker_count cannot be 0".into()));
        }
        if self.port == self.registration_port {
            return Err(ServerError::Config(
                "port and registration_port must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn match_timer(&self) -> Duration {
        Duration::from_secs(self.match_timer_minutes * 60)
    }

    pub fn accept_timer(&self) -> Duration {
        Duration::from_secs(self.accept_timer_secs)
    }
}

/// Word Quizzle session server.
#[derive(Parser, Debug)]
#[command(name = "wordquizzle-server")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Optional JSON configuration file; CLI flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub bind: Option<IpAddr>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub registration_port: Option<u16>,

    #[arg(long)]
    pub match_timer: Option<u64>,

    #[arg(long)]
    pub accept_timer: Option<u64>,

    #[arg(long)]
    pub match_words: Option<usize>,

    #[arg(long)]
    pub worker_count: Option<usize>,

    #[arg(long)]
    pub store_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn resolve(&self) -> Result<ServerConfig, ServerError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(v) = self.bind {
            config.bind_address = v;
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = self.registration_port {
            config.registration_port = v;
        }
        if let Some(v) = self.match_timer {
            config.match_timer_minutes = v;
        }
        if let Some(v) = self.accept_timer {
            config.accept_timer_secs = v;
        }
        if let Some(v) = self.match_words {
            config.match_words = v;
        }
        if let Some(v) = self.worker_count {
            config.worker_count = v;
        }
        if let Some(v) = self.store_path.clone() {
            config.store_path = v;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8888);
        assert_eq!(config.registration_port, 5678);
        assert_eq!(config.match_timer_minutes, 1);
        assert_eq!(config.accept_timer_secs, 15);
        assert_eq!(config.match_words, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_clashing_ports() {
        let config = ServerConfig {
            registration_port: 8888,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.port, back.port);
        assert_eq!(config.store_path, back.store_path);
    }
}
