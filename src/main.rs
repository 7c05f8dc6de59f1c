//! cliphist daemon
//!
//! Captures clipboard changes into the history store, optionally serves the
//! local query API, and takes control commands as JSON lines on stdin.

use anyhow::{Context, Result};
use std::thread;
use tracing::{debug, info, warn};

use cliphist::api_server::ApiServer;
use cliphist::clipboard_history::{
    fetch_or_create_key, open_history_store, CaptureMonitor, MonitorTiming, PasteSink,
    StoreWorker, SystemClipboardSink, SystemClipboardSource,
};
use cliphist::config::{self, SettingsProvider};
use cliphist::error::ResultExt;
use cliphist::logging;
use cliphist::stdin_commands::{self, apply_command, ControlFlow};

fn main() -> Result<()> {
    let config = config::load_config();
    let _logging_guard = logging::init(&config.log_dir());

    let data_dir = config.data_dir();
    info!(
        data_dir = %data_dir.display(),
        retention_limit = config.retention_limit(),
        ignored_apps = config.ignore_list().len(),
        local_api_enabled = config.local_api_enabled(),
        local_api_port = config.local_api_port(),
        "Loaded config"
    );

    let key = fetch_or_create_key();
    let mut store = open_history_store(&data_dir, key.as_ref(), config.retention_limit());
    store.set_listener(Box::new(|revision| {
        debug!(revision, "Clipboard history updated");
    }));
    let worker = StoreWorker::spawn(store).context("Failed to start clipboard store")?;

    let monitor = CaptureMonitor::start(
        SystemClipboardSource::new,
        worker.handle(),
        config.ignore_list(),
        MonitorTiming::default(),
    )?;

    let server = if config.local_api_enabled() {
        ApiServer::new(config.local_api_port(), worker.handle())
            .start()
            .log_err()
    } else {
        None
    };

    let mut sink = SystemClipboardSink::new().warn_on_err();
    let commands = stdin_commands::start_stdin_listener();

    loop {
        let Ok(command) = commands.recv() else {
            info!("Stdin closed, running until terminated");
            loop {
                thread::park();
            }
        };

        let sink = sink.as_mut().map(|sink| sink as &mut dyn PasteSink);
        match apply_command(command, &worker.handle(), sink) {
            Ok(ControlFlow::Continue) => {}
            Ok(ControlFlow::Quit) => break,
            Err(e) => warn!(error = %e, "Command failed"),
        }
    }

    info!("Shutting down");
    if let Some(server) = server {
        server.stop();
    }
    monitor.stop();
    worker.shutdown();
    Ok(())
}
