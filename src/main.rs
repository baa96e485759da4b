// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary entry point: parse configuration, wire up the shared stores, spawn
//! the registration service, and hand control to the reactor.

use std::sync::Arc;

use clap::Parser;
use crossbeam::channel::unbounded;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wordquizzle_server::config::Args;
use wordquizzle_server::presence::PresenceRegistry;
use wordquizzle_server::reactor::Reactor;
use wordquizzle_server::store::UserStore;
use wordquizzle_server::wordsource::{BuiltinWordSource, WordSource};
use wordquizzle_server::{registration, workerpool};

fn main() {
    let args = Args::parse();

    let config = match args.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = match UserStore::open(&config.store_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, path = %config.store_path.display(), "failed to open user store");
            std::process::exit(1);
        }
    };
    let presence = Arc::new(PresenceRegistry::new());
    let words: Arc<dyn WordSource> = Arc::new(BuiltinWordSource::new());
    let config = Arc::new(config);

    if let Err(e) = registration::spawn(config.bind_address, config.registration_port, store.clone()) {
        error!(error = %e, "failed to start registration service");
        std::process::exit(1);
    }

    let (job_tx, job_rx) = unbounded();
    let (command_tx, command_rx) = unbounded();

    let reactor = match Reactor::bind(&config, job_tx, command_rx) {
        Ok(reactor) => reactor,
        Err(e) => {
            error!(error = %e, "failed to bind session listener");
            std::process::exit(1);
        }
    };
    let waker = reactor.waker();

    workerpool::spawn(
        config.worker_count,
        job_rx,
        command_tx,
        waker,
        store,
        presence,
        words,
        config.clone(),
    );

    info!(port = config.port, registration_port = config.registration_port, "word quizzle server starting");
    reactor.run();
}
