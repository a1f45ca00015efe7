// src/main.rs

use anyhow::Result;
use clap::Parser;
use pkgrecap::{Config, Event, EventSink, JsonLinesSink, Session};
use std::process::ExitCode;
use tracing::debug;

mod cli;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Diagnostics go to stderr, stdout carries the JSON protocol only
    let default_filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let sink = JsonLinesSink::stdout();
    let show_chain = cli.debug;

    match run(cli, &sink) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = if show_chain {
                format!("{:?}", e)
            } else {
                e.to_string()
            };
            if let Err(emit_error) = sink.emit(Event::error(message)) {
                eprintln!("pkgrecap: {}", emit_error);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, sink: &dyn EventSink) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(state) = cli.state {
        config.engine.state = state;
    }
    debug!("Engine state: {}", config.engine.state.display());

    let mut session = Session::open(config, sink)?;

    match cli.command {
        Commands::CheckUpdate { patterns } => session.check_update(&patterns)?,
        Commands::Info { patterns } => session.info(&patterns)?,
        Commands::Install { kind, patterns } => session.install(kind.into(), &patterns)?,
        Commands::List {
            filter,
            kind,
            patterns,
            show_hidden,
        } => session.list(filter.into(), kind.into(), &patterns, show_hidden)?,
        Commands::Remove { kind, patterns } => session.remove(kind.into(), &patterns)?,
        Commands::Update { patterns } => session.update(&patterns)?,
        Commands::LastUpdated => session.last_updated()?,
    }

    Ok(())
}
