//! Companion command-line client for the local query API.
//!
//! Talks to a running daemon over HTTP and prints results either as one
//! line per item or as the raw JSON body.

use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::api_server::{DEFAULT_PORT, DEFAULT_RESULT_LIMIT};

/// Characters of preview shown per line
pub const CLI_PREVIEW_LIMIT: usize = 120;

/// Printed when the daemon cannot be reached
pub const UNREACHABLE_MESSAGE: &str =
    "Clipboard history API not reachable. Enable it in settings and verify the port.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "cliphist-cli")]
#[command(version, about = "Query the local clipboard history API")]
#[command(after_help = "Examples:\n  cliphist-cli search \"invoice\" --type file\n  cliphist-cli recent --limit 10")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Search history by substring
    Search {
        /// Text to look for
        query: Option<String>,

        /// Maximum results (server clamps to 1..=200)
        #[arg(long, default_value_t = DEFAULT_RESULT_LIMIT)]
        limit: usize,

        /// Only this type: text, url, image, file or unknown
        #[arg(long = "type", value_name = "TYPE")]
        item_type: Option<String>,

        /// Only pinned entries
        #[arg(long)]
        pinned: bool,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Most recent entries
    Recent {
        #[arg(long, default_value_t = DEFAULT_RESULT_LIMIT)]
        limit: usize,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[arg(long)]
        json: bool,
    },

    /// Check that the daemon is serving
    Health {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Missing search query.")]
    MissingQuery,

    #[error("{}", UNREACHABLE_MESSAGE)]
    Unreachable(#[source] ureq::Error),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Command {
    fn port(&self) -> u16 {
        match self {
            Self::Search { port, .. } | Self::Recent { port, .. } | Self::Health { port } => *port,
        }
    }

    fn raw_json(&self) -> bool {
        match self {
            Self::Search { json, .. } | Self::Recent { json, .. } => *json,
            Self::Health { .. } => false,
        }
    }
}

/// Request URL for a command
pub fn build_url(command: &Command) -> Result<Url, CliError> {
    let mut url = Url::parse(&format!("http://127.0.0.1:{}", command.port()))?;

    match command {
        Command::Health { .. } => url.set_path("/health"),
        Command::Recent { limit, .. } => {
            url.set_path("/recent");
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        Command::Search {
            query,
            limit,
            item_type,
            pinned,
            ..
        } => {
            let query = query
                .as_deref()
                .filter(|q| !q.is_empty())
                .ok_or(CliError::MissingQuery)?;
            url.set_path("/search");
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &limit.to_string());
            pairs.append_pair("q", query);
            if let Some(item_type) = item_type {
                pairs.append_pair("type", item_type);
            }
            if *pinned {
                pairs.append_pair("pinned", "1");
            }
        }
    }
    Ok(url)
}

/// GET `url` and return the body whatever the status.
pub fn fetch(url: &Url) -> Result<String, CliError> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(REQUEST_TIMEOUT))
        .http_status_as_error(false)
        .build()
        .into();

    debug!(url = %url, "Querying clipboard history API");
    let response = agent.get(url.as_str()).call().map_err(CliError::Unreachable)?;
    response
        .into_body()
        .read_to_string()
        .map_err(CliError::Unreachable)
}

/// Text to print for a response body
pub fn render(body: &str, raw_json: bool) -> String {
    if raw_json {
        return body.to_string();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            let sorted: BTreeMap<String, Value> = map.into_iter().collect();
            serde_json::to_string_pretty(&sorted).unwrap_or_else(|_| body.to_string())
        }
        Ok(Value::Array(items)) => items
            .iter()
            .map(render_item_line)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => body.to_string(),
    }
}

/// `★ [type] preview — source`
pub fn render_item_line(item: &Value) -> String {
    let item_type = item.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let preview = item.get("preview").and_then(Value::as_str).unwrap_or("");
    let source = item
        .get("source_app_name")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    let pinned = if item.get("pinned").and_then(Value::as_bool) == Some(true) {
        "★ "
    } else {
        ""
    };

    let preview: String = match preview.char_indices().nth(CLI_PREVIEW_LIMIT) {
        Some((cut, _)) => format!("{}…", &preview[..cut]),
        None => preview.to_string(),
    };
    format!("{}[{}] {} — {}", pinned, item_type, preview, source)
}

/// Build the URL, fetch, and render
pub fn execute(command: &Command) -> Result<String, CliError> {
    let url = build_url(command)?;
    let body = fetch(&url)?;
    Ok(render(&body, command.raw_json()))
}

/// Entry point for the binary
pub fn run(cli: Cli) -> ExitCode {
    match execute(&cli.command) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
            ExitCode::SUCCESS
        }
        Err(CliError::MissingQuery) => {
            println!("{}\n", CliError::MissingQuery);
            println!("{}", Cli::command().render_help());
            ExitCode::FAILURE
        }
        Err(e) => {
            debug!(error = ?e, "Request failed");
            println!("{}", e);
            ExitCode::FAILURE
        }
    }
}
