//! pkchain CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "pkchain")]
#[command(about = "A permissioned ledger of name to public key bindings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
