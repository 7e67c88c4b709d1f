//! CLI command definitions for taskboard.
//!
//! `handle` serves one protocol request over stdio; `show` loads a source
//! through a controller and prints it.

use crate::adapter::{self, AdapterKind};
use crate::config::Config;
use crate::controller::Controller;
use crate::dispatch::Dispatcher;
use crate::format::{OutputFormat, format_board};
use crate::protocol::ProtocolRegistry;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::sync::Arc;

/// Board-of-columns task manager over plain files and issue trackers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read one JSON request from stdin and write the JSON response to stdout
    Handle {
        /// Storage format of the request's source
        #[arg(short, long, value_enum)]
        adapter: AdapterKind,
    },

    /// Load a source and print its board
    Show {
        /// Storage format of the source
        #[arg(short, long, value_enum)]
        adapter: AdapterKind,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
        output: OutputFormat,

        /// File, directory or `owner/repo` to load
        source: String,
    },
}

/// Serve a single request read from `input`.
pub fn run_handle(
    config: &Config,
    kind: AdapterKind,
    input: &mut impl Read,
    output: &mut impl Write,
) -> Result<()> {
    let mut request = String::new();
    input
        .read_to_string(&mut request)
        .context("failed to read request from stdin")?;

    let registry = Arc::new(ProtocolRegistry::standard());
    let dispatcher = Dispatcher::new(registry, adapter::open(kind, config));
    let response = dispatcher.handle(&request);
    writeln!(output, "{}", serde_json::to_string(&response)?)?;
    Ok(())
}

/// Load `source` and render it.
pub fn run_show(
    config: &Config,
    kind: AdapterKind,
    format: OutputFormat,
    source: &str,
) -> Result<String> {
    let registry = Arc::new(ProtocolRegistry::standard());
    let dispatcher = Dispatcher::new(registry.clone(), adapter::open(kind, config));
    let controller = Controller::connect(
        Box::new(dispatcher),
        registry,
        &config.protocol.versions,
        source,
        kind.is_local(),
    )
    .with_context(|| format!("failed to load {} source {}", kind, source))?;
    Ok(format_board(controller.board(), format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show() {
        let cli = Cli::try_parse_from([
            "taskboard", "show", "--adapter", "todotxt", "--output", "json", "todo.txt",
        ])
        .unwrap();
        match cli.command {
            Command::Show {
                adapter,
                output,
                source,
            } => {
                assert_eq!(adapter, AdapterKind::Todotxt);
                assert_eq!(output, OutputFormat::Json);
                assert_eq!(source, "todo.txt");
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log, "2");
    }

    #[test]
    fn handle_answers_on_output() {
        let mut input = "{\"command\": \"load_all\", \"source\": \"/no/such.md\", \"version\": \"1\"}"
            .as_bytes();
        let mut output = Vec::new();
        run_handle(&Config::default(), AdapterKind::Markdown, &mut input, &mut output).unwrap();
        let response: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(response["status"], "fail");
        assert_eq!(response["data"]["error"]["code"], "SOURCE_NOT_FOUND");
    }
}
