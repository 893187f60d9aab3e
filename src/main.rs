use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use brainsaver::agents::builtin_registry;
use brainsaver::classifier::EXAMPLE_REQUESTS;
use brainsaver::config::AssistantConfig;
use brainsaver::orchestrator::Orchestrator;
use brainsaver::store::{LibSqlBackend, MemoryStore};

const COMMANDS: &str = "\
Commands:
  help     show this message
  status   show memory statistics
  quit     exit";

fn print_help() {
    println!("\nAsk for anything in plain language, for example:");
    for (example, _) in EXAMPLE_REQUESTS {
        println!("  {example}");
    }
    println!("\n{COMMANDS}\n");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AssistantConfig::from_env().context("Invalid configuration")?;

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Cannot create log directory {}", config.log_dir.display()))?;
    let (file_writer, _log_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&config.log_dir, "brainsaver.log"));

    // Everything goes to the log file; only warnings reach the terminal.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::WARN),
        )
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    let store: Arc<dyn MemoryStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    let registry = Arc::new(builtin_registry(&config)?);
    let orchestrator = Orchestrator::from_config(Arc::clone(&store), registry, &config)?;

    eprintln!("🧠 Brainsaver v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Session: {}", orchestrator.session_id());
    eprintln!("   Type 'help' for examples, 'quit' to exit.\n");
    tracing::info!(session = orchestrator.session_id(), "Session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => continue,
            "quit" | "exit" | "/quit" => break,
            "help" => print_help(),
            "status" => {
                let stats = orchestrator.stats().await?;
                let capabilities: Vec<_> = orchestrator
                    .registry()
                    .capabilities()
                    .iter()
                    .map(|c| c.as_str())
                    .collect();
                println!(
                    "\nSession {}\n  interactions: {}\n  requests received: {}\n  preferences: {}\n  indexed files: {}\n  capabilities: {}\n",
                    orchestrator.session_id(),
                    stats.interactions,
                    stats.received_requests,
                    stats.preferences,
                    stats.indexed_files,
                    capabilities.join(", "),
                );
            }
            request => {
                let response = orchestrator.handle_request(request).await?;
                println!("\n{}", response.summary);
                for action in &response.actions_taken {
                    println!("  • {action}");
                }
                if response.simulated {
                    println!("  (simulated: nothing was changed)");
                }
                println!();
            }
        }
    }

    store.close().await?;
    tracing::info!(session = orchestrator.session_id(), "Session ended");
    eprintln!("Goodbye.");
    Ok(())
}
