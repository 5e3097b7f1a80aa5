//! Run a validator.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use pkchain_net::CancellationToken;
use pkchain_node::{NodeConfig, Validator};
use std::path::PathBuf;

#[derive(Args)]
pub struct RunArgs {
    /// Validator configuration file
    #[arg(short, long, default_value = "node.json")]
    config: PathBuf,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = NodeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;

    println!("{}", "Starting pkchain validator...".bold().cyan());
    println!("  Name:       {}", config.name.bright_yellow());
    println!("  Discovery:  {}", config.discovery_file.display().to_string().bright_black());
    println!("  Difficulty: {}", config.difficulty.to_string().bright_cyan());
    match &config.data_dir {
        Some(dir) => println!("  Data dir:   {}", dir.display().to_string().bright_black()),
        None => println!("  Data dir:   {}", "(in memory)".bright_black()),
    }
    println!();

    let validator = Validator::from_config(config).context("Failed to initialize validator")?;
    println!(
        "{}  Chain height {}, {} peer(s)",
        "✓".green().bold(),
        validator.height().await.to_string().bright_cyan(),
        validator.peers().len()
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    validator
        .run(shutdown)
        .await
        .context("Validator stopped with an error")?;

    println!("{}", "Validator stopped.".bold());
    Ok(())
}
