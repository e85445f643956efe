use anyhow::Result;
use clap::{Parser, Subcommand};
use scribe_cli::commands::{keys, ledger};
use scribe_store::ScribeConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tamper-evident audit log.
#[derive(Parser, Debug)]
#[command(name = "scribe", version)]
struct Cli {
    /// Optional TOML config file. `SCRIBE_*` environment variables override it.
    #[arg(long, global = true, env = "SCRIBE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an Ed25519 keypair with a passphrase-locked private key
    Keygen {
        /// Passphrase that locks the private key
        #[arg(long, env = "SCRIBE_PRIVATE_KEY_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
        /// Write `scribe.key` and `scribe.pub` into this directory instead of printing
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Create the ledger and persist the genesis block if it does not exist
    Init,
    /// Append one entry to the ledger
    Append {
        /// JSON object to record (reads stdin when omitted)
        data: Option<String>,
        /// Read the JSON object from a file
        #[arg(long, conflicts_with = "data")]
        file: Option<PathBuf>,
        /// Writer identity (defaults to the configured system id)
        #[arg(long)]
        system_id: Option<String>,
        /// Label attached to the entry; repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Print the signed block as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the whole ledger or the segment `[start, end)`
    Validate {
        #[arg(long, default_value_t = 0)]
        start: u64,
        /// Exclusive end; 0 means the end of the ledger
        #[arg(long, default_value_t = 0)]
        end: u64,
    },
    /// Display persisted blocks
    Log {
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long, default_value_t = 0)]
        end: u64,
        /// Print blocks as a JSON array
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    // Keygen runs without a ledger configuration.
    let config = || ScribeConfig::load(cli.config.as_deref());

    match cli.command {
        Commands::Keygen {
            passphrase,
            out_dir,
        } => keys::cmd_keygen(&passphrase, out_dir),
        Commands::Init => ledger::cmd_init(&config()?).await,
        Commands::Append {
            data,
            file,
            system_id,
            tags,
            json,
        } => {
            let input = ledger::AppendInput {
                data,
                file,
                system_id,
                tags,
                json,
            };
            ledger::cmd_append(&config()?, input).await
        }
        Commands::Validate { start, end } => ledger::cmd_validate(&config()?, start, end).await,
        Commands::Log { start, end, json } => ledger::cmd_log(&config()?, start, end, json).await,
    }
}
