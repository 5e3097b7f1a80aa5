//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod chain;
mod run;
mod submit;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a validator
    Run(run::RunArgs),
    /// Bind a name to a public key
    Register(submit::RegisterArgs),
    /// Look up the key bound to a name
    Query(submit::QueryArgs),
    /// Check that a name is bound to a key
    Validate(submit::ValidateArgs),
    /// Replace the key bound to a name
    Update(submit::UpdateArgs),
    /// Revoke a public key
    Revoke(submit::RevokeArgs),
    /// Show the confirmed chain
    Chain(chain::ChainArgs),
}

pub async fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Run(args) => run::run(args).await,
        Commands::Register(args) => submit::register(args).await,
        Commands::Query(args) => submit::query(args).await,
        Commands::Validate(args) => submit::validate(args).await,
        Commands::Update(args) => submit::update(args).await,
        Commands::Revoke(args) => submit::revoke(args).await,
        Commands::Chain(args) => chain::run(args).await,
    }
}
