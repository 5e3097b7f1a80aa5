//! Inspect the confirmed chain held by the validators.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use pkchain_node::{LedgerClient, NodeConfig};
use std::path::PathBuf;

#[derive(Args)]
pub struct ChainArgs {
    /// Client configuration file
    #[arg(short, long, default_value = "client.json")]
    config: PathBuf,

    /// Number of blocks to show
    #[arg(short = 'n', long, default_value = "10")]
    count: usize,

    /// Also list each block's transactions
    #[arg(short, long)]
    verbose: bool,
}

pub async fn run(args: ChainArgs) -> Result<()> {
    let config = NodeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;
    let client = LedgerClient::from_config(&config).context("Failed to set up client")?;
    let ledger = client
        .fetch_ledger()
        .await
        .context("Failed to fetch the chain")?;

    println!();
    println!(
        "{} height {}, {} name(s) bound",
        "Chain:".bold().cyan(),
        ledger.height().to_string().bright_cyan(),
        ledger.registry().len()
    );
    println!();

    let blocks = ledger.blocks();
    let start = blocks.len().saturating_sub(args.count);
    for block in blocks[start..].iter().rev() {
        let generator = if block.is_genesis() {
            "genesis"
        } else {
            block.generator_address.as_str()
        };
        println!(
            "  {} {} {} {}",
            format!("#{}", block.id).bright_black(),
            block.hash().to_hex()[..16].bright_yellow(),
            format!("({} txs)", block.transaction_count).bright_black(),
            generator
        );

        if args.verbose {
            for tx in &block.transactions {
                let outcome = if tx.result().success {
                    "ok".green()
                } else {
                    "failed".red()
                };
                println!(
                    "      {} {} {}",
                    tx.operation().kind().to_string().cyan(),
                    tx.operation().name().unwrap_or("-"),
                    outcome
                );
            }
        }
    }

    println!();
    Ok(())
}
