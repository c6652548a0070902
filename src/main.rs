// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod headless;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use uuid::Uuid;

use ac_core::Orchestrator;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(cmd) = &cli.command {
        match cmd {
            Commands::Completions { shell } => {
                cli::print_completions(*shell);
                return Ok(());
            }
            Commands::ShowConfig => {
                let config = ac_config::load(cli.config.as_deref())?;
                println!("{}", toml::to_string_pretty(&config)?);
                return Ok(());
            }
            Commands::ListProviders => {
                list_providers();
                return Ok(());
            }
        }
    }

    let mut config = ac_config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(model) = &cli.model {
        config.model.name = model.clone();
    }

    let provider = ac_model::from_config(&config.model).context("constructing model provider")?;
    let data_dir = dirs::data_dir().unwrap_or_else(|| std::path::PathBuf::from(".")).join("agentcore").join("sessions");
    let store = Arc::new(ac_store::SessionStore::new(data_dir));

    let (events_tx, events_rx) = mpsc::channel(1024);
    let orchestrator = Orchestrator::new(store, Arc::from(provider), config.model.name.clone(), config.tools.clone(), config.agent.clone(), events_tx);

    let session_id = cli.resume.as_deref().map(Uuid::parse_str).transpose().context("parsing --resume session id")?;

    let title = cli.prompt.clone().unwrap_or_else(|| "headless".to_string());
    headless::run(orchestrator, session_id, title, events_rx).await
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();
}

fn list_providers() {
    for kind in ["anthropic", "openai_chat", "openai_responses", "gemini", "mock"] {
        println!("{kind}");
    }
}
