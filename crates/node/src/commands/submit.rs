//! PKI operations submitted to the validator set.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use pkchain_core::Operation;
use pkchain_node::{LedgerClient, NodeConfig, Submission};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct ClientArgs {
    /// Client configuration file
    #[arg(short, long, default_value = "client.json")]
    config: PathBuf,
}

#[derive(Args)]
pub struct RegisterArgs {
    #[command(flatten)]
    client: ClientArgs,

    /// Name to register
    #[arg(short, long)]
    name: String,

    /// File holding the public key
    #[arg(short, long)]
    key_file: PathBuf,
}

#[derive(Args)]
pub struct QueryArgs {
    #[command(flatten)]
    client: ClientArgs,

    /// Name to look up
    #[arg(short, long)]
    name: String,
}

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    client: ClientArgs,

    /// Name to check
    #[arg(short, long)]
    name: String,

    /// File holding the public key expected for the name
    #[arg(short, long)]
    key_file: PathBuf,
}

#[derive(Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    client: ClientArgs,

    /// Name whose key changes
    #[arg(short, long)]
    name: String,

    /// File holding the key currently bound to the name
    #[arg(long)]
    old_key_file: PathBuf,

    /// File holding the replacement key
    #[arg(long)]
    new_key_file: PathBuf,
}

#[derive(Args)]
pub struct RevokeArgs {
    #[command(flatten)]
    client: ClientArgs,

    /// File holding the key to revoke
    #[arg(short, long)]
    key_file: PathBuf,
}

pub async fn register(args: RegisterArgs) -> Result<()> {
    let op = Operation::Register {
        name: args.name,
        public_key: read_key(&args.key_file)?,
    };
    submit(&args.client, op).await
}

pub async fn query(args: QueryArgs) -> Result<()> {
    submit(&args.client, Operation::Query { name: args.name }).await
}

pub async fn validate(args: ValidateArgs) -> Result<()> {
    let op = Operation::Validate {
        name: args.name,
        public_key: read_key(&args.key_file)?,
    };
    submit(&args.client, op).await
}

pub async fn update(args: UpdateArgs) -> Result<()> {
    let op = Operation::Update {
        name: args.name,
        old_key: read_key(&args.old_key_file)?,
        new_key: read_key(&args.new_key_file)?,
    };
    submit(&args.client, op).await
}

pub async fn revoke(args: RevokeArgs) -> Result<()> {
    let op = Operation::Revoke {
        public_key: read_key(&args.key_file)?,
    };
    submit(&args.client, op).await
}

fn read_key(path: &Path) -> Result<String> {
    let key = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;
    Ok(key.trim_end().to_string())
}

async fn submit(args: &ClientArgs, op: Operation) -> Result<()> {
    let config = NodeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;
    let client = LedgerClient::from_config(&config).context("Failed to set up client")?;

    let submission = client
        .submit(op)
        .await
        .context("Failed to submit operation")?;
    report(&submission);

    if submission.delivered == 0 {
        bail!("no validator accepted the transaction");
    }
    Ok(())
}

fn report(submission: &Submission) {
    let tx = &submission.transaction;
    let result = tx.result();

    println!();
    println!(
        "{} {}",
        tx.operation().kind().to_string().bold().cyan(),
        tx.hash().to_hex()[..16].bright_yellow()
    );
    if result.success {
        println!("  Result:     {}", "success".green().bold());
    } else {
        println!("  Result:     {}", "failure".red().bold());
    }
    if let Some(key) = &result.public_key {
        println!("  Public key: {}", key.bright_white());
    }
    if let Some(message) = &result.message {
        println!("  Message:    {}", message);
    }

    println!(
        "{}  Delivered to {} validator(s)",
        "✓".green().bold(),
        submission.delivered
    );
    for (peer, error) in &submission.failures {
        println!("{}  {}: {}", "✗".red().bold(), peer, error.to_string().bright_black());
    }
    println!();
}
