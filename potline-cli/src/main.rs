mod commands;
mod config;

use clap::{Parser, Subcommand};
use potline_core::EngineError;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "potline")]
#[command(about = "Potline - custodial settlement engine for UTXO wagering games")]
#[command(version)]
struct Cli {
    /// Data directory for the sealed master secret and the settlement audit log
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Network (regtest, signet, testnet, bitcoin)
    #[arg(short, long, global = true, default_value = "regtest")]
    network: String,

    /// Esplora endpoint override
    #[arg(long, global = true)]
    esplora_url: Option<String>,

    /// Treasury address for change and the house cut
    #[arg(long, global = true)]
    treasury: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Commit-reveal fairness operations and audits
    #[command(subcommand)]
    Fairness(commands::FairnessCommands),

    /// Deterministic deposit address derivation
    #[command(subcommand)]
    Address(commands::AddressCommands),

    /// Spendable funds across seat addresses
    #[command(subcommand)]
    Funds(commands::FundsCommands),

    /// Payout and refund settlement
    #[command(subcommand)]
    Settle(commands::SettleCommands),

    /// Sealed master secret management
    #[command(subcommand)]
    Secret(commands::SecretCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "potline={}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let defaults = config::CliConfig::default();
    let data_dir = cli.data_dir.unwrap_or(defaults.data_dir);
    tokio::fs::create_dir_all(&data_dir).await?;

    let ctx = commands::CliContext::new(
        data_dir,
        &cli.network,
        cli.esplora_url.clone(),
        cli.treasury.clone(),
    );

    let result = match cli.command {
        Commands::Fairness(cmd) => commands::handle_fairness_command(cmd),
        Commands::Address(cmd) => commands::handle_address_command(cmd, &ctx).await,
        Commands::Funds(cmd) => commands::handle_funds_command(cmd, &ctx).await,
        Commands::Settle(cmd) => commands::handle_settle_command(cmd, &ctx).await,
        Commands::Secret(cmd) => commands::handle_secret_command(cmd, &ctx).await,
    };

    if let Err(e) = result {
        match e {
            EngineError::Uninitialized => {
                eprintln!("Error: master secret not initialized");
                eprintln!("Use 'potline secret init' to set one up");
            }
            EngineError::InsufficientFunds { need, available } => {
                eprintln!("Error: insufficient funds");
                eprintln!("Need: {} sats, Available: {} sats", need, available);
            }
            EngineError::NoFunds => {
                eprintln!("Error: no spendable funds found across seat addresses");
            }
            EngineError::InvalidAddress(addr) => {
                eprintln!("Error: invalid address: {}", addr);
            }
            _ => {
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
