//! Daemon control via stdin.
//!
//! Commands are JSON objects, one per line:
//!
//! ```json
//! {"type": "paste", "id": "2f1c8a4e-9d3b-4c61-a0b7-5e2d8f9c1a34"}
//! {"type": "paste", "id": "2f1c8a4e-9d3b-4c61-a0b7-5e2d8f9c1a34", "plain": true}
//! {"type": "copy", "id": "2f1c8a4e-9d3b-4c61-a0b7-5e2d8f9c1a34"}
//! {"type": "togglePin", "id": "2f1c8a4e-9d3b-4c61-a0b7-5e2d8f9c1a34"}
//! {"type": "delete", "id": "2f1c8a4e-9d3b-4c61-a0b7-5e2d8f9c1a34"}
//! {"type": "setRetentionLimit", "limit": 500}
//! {"type": "quit"}
//! ```

use anyhow::Result;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clipboard_history::{paste_by_id, PasteSink, StoreHandle};
use crate::config::clamp_retention_limit;

/// Bounded so a flood of input cannot grow memory
const COMMAND_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DaemonCommand {
    /// Put an entry back on the clipboard
    Copy { id: Uuid },
    /// Copy and replay the paste keystroke
    Paste {
        id: Uuid,
        #[serde(default)]
        plain: bool,
    },
    TogglePin { id: Uuid },
    Delete { id: Uuid },
    /// Raw value, clamped like the config field
    SetRetentionLimit { limit: i64 },
    Quit,
}

/// What the daemon loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Result<DaemonCommand, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Read commands from stdin on a background thread.
///
/// The channel closes when stdin reaches EOF.
pub fn start_stdin_listener() -> Receiver<DaemonCommand> {
    let (tx, rx) = mpsc::sync_channel(COMMAND_CHANNEL_CAPACITY);

    let spawned = thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            info!("Stdin command listener started");
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Error reading stdin");
                        break;
                    }
                };
                match parse_command(&line) {
                    Some(Ok(command)) => {
                        debug!(?command, "Parsed command");
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "Failed to parse command"),
                    None => {}
                }
            }
            info!("Stdin command listener exiting");
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to spawn stdin command listener");
    }

    rx
}

/// Run one command against the store and paste sink.
///
/// Without a sink, copy and paste commands are logged and skipped.
pub fn apply_command(
    command: DaemonCommand,
    store: &StoreHandle,
    sink: Option<&mut dyn PasteSink>,
) -> Result<ControlFlow> {
    match command {
        DaemonCommand::Copy { id } => {
            let Some(sink) = sink else {
                warn!(id = %id, "Clipboard unavailable, ignoring copy");
                return Ok(ControlFlow::Continue);
            };
            match store.get(id)? {
                Some(entry) => {
                    sink.copy(&entry)?;
                }
                None => debug!(id = %id, "Copy requested for unknown entry"),
            }
        }
        DaemonCommand::Paste { id, plain } => match sink {
            Some(sink) => {
                paste_by_id(store, sink, id, plain)?;
            }
            None => warn!(id = %id, "Clipboard unavailable, ignoring paste"),
        },
        DaemonCommand::TogglePin { id } => {
            if let Some(pinned) = store.toggle_pinned(id)? {
                info!(id = %id, pinned, "Toggled pin");
            }
        }
        DaemonCommand::Delete { id } => {
            store.delete(id)?;
        }
        DaemonCommand::SetRetentionLimit { limit } => {
            store.update_retention_limit(clamp_retention_limit(limit))?;
        }
        DaemonCommand::Quit => return Ok(ControlFlow::Quit),
    }
    Ok(ControlFlow::Continue)
}
