//! Ledger commands: bootstrap, append, validate and inspect.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use scribe_chain::{Block, Chain, Payload};
use scribe_store::{
    bootstrap, AppendCoordinator, Bootstrap, LogEntry, LogService, ScribeConfig, SegmentValidator,
    SqliteBlockStore,
};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Arguments of `scribe append`.
#[derive(Debug, Default)]
pub struct AppendInput {
    pub data: Option<String>,
    pub file: Option<PathBuf>,
    pub system_id: Option<String>,
    pub tags: Vec<String>,
    pub json: bool,
}

async fn open_store(config: &ScribeConfig) -> Result<SqliteBlockStore> {
    debug!(url = %config.database_url, "opening ledger");
    SqliteBlockStore::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open ledger at {}", config.database_url))
}

fn coordinator(engine: Chain, store: SqliteBlockStore) -> Arc<AppendCoordinator> {
    Arc::new(AppendCoordinator::new(Arc::new(engine), Arc::new(store)))
}

/// Open the ledger with signing keys, seeding it with genesis if empty.
async fn open_for_writing(config: &ScribeConfig) -> Result<(Arc<AppendCoordinator>, Bootstrap)> {
    if !config.can_sign() {
        bail!("writing requires SCRIBE_PRIVATE_KEY and SCRIBE_PRIVATE_KEY_PASSPHRASE");
    }
    let mut engine = config.chain()?;
    let store = open_store(config).await?;
    let outcome = bootstrap(&store, &mut engine)
        .await
        .context("failed to bootstrap the ledger")?;
    Ok((coordinator(engine, store), outcome))
}

/// Open the ledger for reading. Only the public key is needed.
async fn open_for_reading(config: &ScribeConfig) -> Result<Arc<AppendCoordinator>> {
    let engine = config.chain()?;
    let store = open_store(config).await?;
    Ok(coordinator(engine, store))
}

/// Handle the `scribe init` command.
pub async fn cmd_init(config: &ScribeConfig) -> Result<()> {
    let (_, outcome) = open_for_writing(config).await?;
    match &outcome {
        Bootstrap::Created(genesis) => {
            println!("{} Created genesis block {}", "✓".green().bold(), genesis.id)
        }
        Bootstrap::Existing(genesis) => println!(
            "{} Ledger already initialized (genesis {})",
            "✓".green().bold(),
            genesis.id
        ),
    }
    println!("  {}: {}", "Hash".bold(), outcome.genesis().hash);
    Ok(())
}

fn read_payload(input: &AppendInput) -> Result<Payload> {
    let text = match (&input.data, &input.file) {
        (Some(data), _) => data.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read payload from stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("payload must be a JSON object")
}

/// Handle the `scribe append` command.
pub async fn cmd_append(config: &ScribeConfig, input: AppendInput) -> Result<()> {
    let payload = read_payload(&input)?;
    let (coordinator, _) = open_for_writing(config).await?;

    let mut service = LogService::new(coordinator);
    if let Some(timeout) = config.request_timeout {
        service = service.with_request_timeout(timeout);
    }

    let entry = LogEntry {
        payload,
        system_id: input
            .system_id
            .clone()
            .unwrap_or_else(|| config.system_id.clone()),
        tags: input.tags,
    };
    let block = service.record(entry).await?;

    if input.json {
        println!("{}", serde_json::to_string_pretty(&block)?);
    } else {
        println!(
            "{} Appended block {} (seq {})",
            "✓".green().bold(),
            block.id,
            block.seq_id
        );
        println!("  {}: {}", "Hash".bold(), block.hash);
    }
    Ok(())
}

/// Handle the `scribe validate` command.
pub async fn cmd_validate(config: &ScribeConfig, start: u64, end: u64) -> Result<()> {
    let validator = SegmentValidator::new(open_for_reading(config).await?);

    match validator.validate_segment(start, end).await {
        Ok(report) => {
            println!(
                "{} {} blocks verified",
                "✓".green().bold(),
                report.blocks_checked
            );
            println!();
            println!("{}", "Summary:".bold().underline());
            println!("  {}: {}", "Range".bold(), describe_range(start, end));
            println!("  {}: {}", "Status".bold(), "VALID".green().bold());
            Ok(())
        }
        Err(err) => {
            println!("{} {}", "✗".red().bold(), err);
            println!();
            println!("{}", "Summary:".bold().underline());
            println!("  {}: {}", "Range".bold(), describe_range(start, end));
            println!("  {}: {}", "Status".bold(), "INVALID".red().bold());
            Err(err).context("ledger validation failed")
        }
    }
}

fn describe_range(start: u64, end: u64) -> String {
    if end == 0 {
        format!("[{start}, end)")
    } else {
        format!("[{start}, {end})")
    }
}

/// Handle the `scribe log` command.
pub async fn cmd_log(config: &ScribeConfig, start: u64, end: u64, json: bool) -> Result<()> {
    let coordinator = open_for_reading(config).await?;
    let blocks = coordinator
        .get_segment(start, end)
        .await
        .context("failed to read the ledger")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&blocks)?);
        return Ok(());
    }

    if blocks.is_empty() {
        println!("{}", "Ledger is empty".yellow());
        return Ok(());
    }

    println!("{}", "Audit Ledger".bold().underline());
    println!("{}: {}", "Database".bold(), config.database_url);
    println!("{}: {}", "Blocks".bold(), blocks.len());
    println!();

    for block in &blocks {
        print_block(block);
    }
    Ok(())
}

fn print_block(block: &Block) {
    println!(
        "{} {}",
        "Block".bold().cyan(),
        block.seq_id.to_string().cyan()
    );
    println!("  {}: {}", "ID".bold(), block.id);
    if !block.last_block_id.is_nil() {
        println!("  {}: {}", "Previous".bold(), block.last_block_id);
    }
    println!("  {}: {}", "System".bold(), block.system_id);
    let tags = block.tag_list();
    if !tags.is_empty() {
        println!("  {}: [{}]", "Tags".bold(), tags.join(", "));
    }
    println!("  {}: {}", "Hash".bold(), block.hash);
    match block.signed_at {
        Some(signed_at) => println!("  {}: {}", "Signed".bold(), signed_at.to_rfc3339()),
        None => println!("  {}: {}", "Signed".bold(), "never".yellow()),
    }
    println!("  {}: {}", "Payload".bold(), block.payload_raw);
    println!();
}
