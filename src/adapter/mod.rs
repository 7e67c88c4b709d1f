//! Format adapters: each maps one storage format onto the node tree.
//!
//! Every command reloads the backing store, applies the change in memory and
//! persists before returning. Nothing is cached between calls.

pub mod github;
pub mod markdown;
pub mod todotxt;
pub mod vtodo;

use crate::config::Config;
use crate::error::{BoardError, BoardResult};
use crate::protocol::{BoardCommand, CommandKind, Feature};
use crate::types::Board;
use clap::ValueEnum;
use std::fmt;

/// Result of executing one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A freshly loaded board (`load_all`).
    Board(Board),
    /// The command completed; nothing to report.
    Done,
    /// Number of records written.
    Updated(usize),
}

pub trait Adapter {
    fn kind(&self) -> AdapterKind;

    /// Commands this adapter implements.
    fn commands(&self) -> &'static [CommandKind];

    /// Capabilities advertised on every response.
    fn features(&self) -> &'static [Feature] {
        &[]
    }

    fn supports(&self, kind: CommandKind) -> bool {
        self.commands().contains(&kind)
    }

    fn execute(&self, source: &str, command: BoardCommand) -> BoardResult<Outcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdapterKind {
    Markdown,
    Todotxt,
    Vtodo,
    Github,
}

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Markdown => "markdown",
            AdapterKind::Todotxt => "todotxt",
            AdapterKind::Vtodo => "vtodo",
            AdapterKind::Github => "github",
        }
    }

    /// Whether the source is a local path whose mtime means something.
    pub fn is_local(self) -> bool {
        !matches!(self, AdapterKind::Github)
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the adapter for `kind`.
pub fn open(kind: AdapterKind, config: &Config) -> Box<dyn Adapter> {
    match kind {
        AdapterKind::Markdown => Box::new(markdown::MarkdownAdapter),
        AdapterKind::Todotxt => Box::new(todotxt::TodoTxtAdapter),
        AdapterKind::Vtodo => Box::new(vtodo::VtodoAdapter::new(&config.vtodo, &config.sync)),
        AdapterKind::Github => Box::new(github::GithubAdapter::new(&config.github)),
    }
}

/// Error for a command outside the adapter's table.
pub(crate) fn unsupported(adapter: AdapterKind, command: &BoardCommand) -> BoardError {
    BoardError::unsupported_command(command.kind().as_str(), adapter.as_str())
}
