use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lockable_ledger::{script::Script, LockableToken, ManualClock, TokenConfig};

#[derive(Parser)]
#[command(name = "lockable-ledger")]
#[command(about = "Lockable fungible-token ledger: replay scripted operations", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON operation script against a fresh token and print the outcome
    Replay {
        /// Token config (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Operation script (JSON array)
        #[arg(short, long)]
        script: PathBuf,
        /// Clock reading before the first step, in seconds
        #[arg(long, default_value_t = 0)]
        start: u64,
    },
    /// Print the default token config
    InitConfig,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn replay(config: PathBuf, script: PathBuf, start: u64) -> Result<()> {
    let config = TokenConfig::load(&config)?;
    let raw = fs::read_to_string(&script)
        .with_context(|| format!("reading script {}", script.display()))?;
    let script = Script::from_json(&raw)
        .with_context(|| format!("parsing script {}", script.display()))?;

    let clock = Arc::new(ManualClock::new(start));
    let token = LockableToken::with_clock(config, clock)?;

    for outcome in script.run(&token) {
        println!("{}", serde_json::to_string(&outcome)?);
    }
    println!("{}", serde_json::to_string_pretty(&token.snapshot())?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Replay {
            config,
            script,
            start,
        } => replay(config, script, start),
        Commands::InitConfig => {
            println!("{}", serde_json::to_string_pretty(&TokenConfig::default())?);
            Ok(())
        }
    }
}
