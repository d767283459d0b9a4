//! Cache command - inspect or reset the result cache

use crate::cache::{FileStore, KeyValueStore, DRIFT_CHECK_KEY_TYPE, REMOTE_WORKSPACES_KEY_TYPE};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::{DriftError, DriftResult};
use console::style;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> DriftResult<()> {
    let table = args
        .table
        .or_else(|| config.cache.table.clone())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            DriftError::ConfigMissing("no cache table configured (--table / CACHE_TABLE)".into())
        })?;
    let dir = args
        .cache_dir
        .or_else(|| config.cache.dir.clone())
        .unwrap_or_else(ConfigManager::cache_dir);
    let store = FileStore::open(&dir, &table).await?;

    match args.action {
        CacheAction::List { format } => list_entries(&store, format).await,
        CacheAction::Clear { yes } => clear_entries(&store, &table, yes).await,
    }
}

/// One cached record, flattened for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheRow {
    pub kind: String,
    pub key: String,
    pub result: String,
    pub checked_at: String,
}

impl CacheRow {
    /// Describe a raw store entry; unknown shapes are shown as-is
    pub fn from_entry(key: &str, record: &Value) -> Self {
        let (kind, name) = key.split_once(':').unwrap_or(("unknown", key));
        let value = &record["value"];
        let checked_at = value["checked_at"].as_str().unwrap_or("-").to_string();

        let result = if let Some(error) = value["error"].as_str() {
            format!("error: {}", error)
        } else {
            match kind {
                DRIFT_CHECK_KEY_TYPE => match value["drift"].as_bool() {
                    Some(true) => "drift".to_string(),
                    Some(false) => "clean".to_string(),
                    None => "-".to_string(),
                },
                REMOTE_WORKSPACES_KEY_TYPE => value["workspaces"]
                    .as_array()
                    .map(|ws| {
                        ws.iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .unwrap_or_else(|| "-".to_string()),
                _ => "-".to_string(),
            }
        };

        Self {
            kind: kind.to_string(),
            key: name.to_string(),
            result,
            checked_at,
        }
    }
}

async fn list_entries(store: &FileStore, format: OutputFormat) -> DriftResult<()> {
    let rows: Vec<CacheRow> = store
        .entries()
        .await?
        .iter()
        .map(|(key, record)| CacheRow::from_entry(key, record))
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}:{}", row.kind, row.key);
            }
        }
        OutputFormat::Table => print_table(&rows),
    }
    Ok(())
}

fn print_table(rows: &[CacheRow]) {
    if rows.is_empty() {
        println!("No cached results.");
        return;
    }

    println!(
        "{:<22} {:<40} {:<20} {:<25}",
        "KIND", "KEY", "RESULT", "CHECKED"
    );
    println!("{}", "-".repeat(100));

    for row in rows {
        let result = match row.result.as_str() {
            "drift" => style(row.result.as_str()).yellow().to_string(),
            "clean" => style(row.result.as_str()).green().to_string(),
            r if r.starts_with("error") => style(r).red().to_string(),
            r => r.to_string(),
        };
        println!(
            "{:<22} {:<40} {:<20} {:<25}",
            row.kind, row.key, result, row.checked_at
        );
    }

    println!();
    println!("Total: {} result(s)", rows.len());
}

async fn clear_entries(store: &FileStore, table: &str, skip_confirm: bool) -> DriftResult<()> {
    let count = store.entries().await?.len();
    if count == 0 {
        println!("No cached results to clear.");
        return Ok(());
    }

    println!(
        "This will remove {} cached result(s) from table {}",
        count, table
    );

    if !skip_confirm {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = store.clear().await?;
    println!("{} cleared {} result(s)", style("✓").green(), removed);
    Ok(())
}
