//! CLI entrypoint for freeday
//!
//! This is the main binary that wires together all layers using
//! dependency injection: configuration in, adapters built from the
//! configured channel credentials, the orchestrator on top, and either the
//! recurring timer or a manual trigger driving it.

use anyhow::{Context, Result};
use clap::Parser;
use freeday_application::{
    AdapterRegistry, CycleOrchestrator, MemoryPendingStore, PendingStore,
};
use freeday_infrastructure::{
    ConfigLoader, CycleTimer, DiscordAdapter, JsonFilePendingStore, TelegramAdapter,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "freeday", version, about = "Find a day everyone is free")]
struct Cli {
    /// Path to a configuration file (merged over freeday.toml and the
    /// global config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate the merged configuration and exit
    #[arg(long)]
    check_config: bool,

    /// Fire the contact trigger now, collect until interrupted (Ctrl-C),
    /// then run the deadline and exit
    #[arg(long)]
    contact_now: bool,

    /// Fire the deadline trigger now (finishing a recovered cycle) and exit
    #[arg(long)]
    deadline_now: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Configuration errors are fatal before any cycle runs.
    let config = ConfigLoader::load(cli.config.as_ref())?;
    config.validate()?;

    if cli.check_config {
        println!("configuration OK");
        println!("  title:    {}", config.settings.title);
        println!("  persons:  {}", config.persons.len());
        println!("  contact:  {}", config.settings.contact);
        println!("  deadline: {}", config.settings.deadline);
        return Ok(());
    }

    info!("Starting freeday");

    // === Dependency Injection ===
    let pending: Arc<dyn PendingStore> = match &config.persistence.path {
        Some(path) => {
            info!(path = %path.display(), "using durable pending-request store");
            Arc::new(JsonFilePendingStore::new(path))
        }
        None => {
            info!("running without durable persistence");
            Arc::new(MemoryPendingStore::new())
        }
    };

    let mut registry = AdapterRegistry::new();
    if let Some(discord) = &config.channels.discord {
        registry = registry.register("discord", DiscordAdapter::new(discord.token.clone()));
    }
    if let Some(telegram) = &config.channels.telegram {
        registry = registry.register("telegram", TelegramAdapter::new(telegram.token.clone()));
    }

    let orchestrator = Arc::new(
        CycleOrchestrator::new(
            config.cycle_settings()?,
            config.roster(),
            registry,
            Arc::clone(&pending),
        )
        .context("could not build orchestrator")?,
    );

    // Pick up a cycle a previous process left behind.
    if orchestrator.recover().await? {
        info!("recovered an interrupted cycle; deadline will finalize it");
    }

    if cli.deadline_now {
        let outcome = orchestrator.on_deadline().await?;
        info!(
            days = outcome.days.len(),
            quorum = outcome.quorum,
            "deadline finished"
        );
        return Ok(());
    }

    if cli.contact_now {
        orchestrator.on_contact().await?;
        info!("contact sent; collecting until Ctrl-C");
        tokio::signal::ctrl_c().await?;
        let outcome = orchestrator.on_deadline().await?;
        info!(
            days = outcome.days.len(),
            quorum = outcome.quorum,
            "deadline finished"
        );
        return Ok(());
    }

    // Daemon mode: the timer fires both triggers on schedule.
    let shutdown = CancellationToken::new();
    let timer = CycleTimer::new(
        config.contact_spec()?,
        config.deadline_spec()?,
        config.tz()?,
        shutdown.clone(),
    );

    tokio::select! {
        _ = timer.run(Arc::clone(&orchestrator)) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    }

    Ok(())
}
