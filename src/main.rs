//! taskboard
//!
//! Board-of-columns task manager over Markdown, todo.txt, iCalendar VTODO
//! directories and GitHub issues.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use taskboard::cli::{Cli, Command, run_handle, run_show};
use taskboard::config::Config;
use taskboard::logging::{self, LogTarget};
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let config = Config::load_or_default(cli.config.as_deref().map(Path::new))?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Handle { adapter } => {
            run_handle(&config, adapter, &mut std::io::stdin(), &mut std::io::stdout())
        }
        Command::Show {
            adapter,
            output,
            source,
        } => {
            let rendered = run_show(&config, adapter, output, &source)?;
            print!("{}", rendered);
            Ok(())
        }
    }
}
