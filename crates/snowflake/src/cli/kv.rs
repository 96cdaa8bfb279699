//! `kv` command: raw access to the key-value store.

use super::context::CliContext;
use super::error::HelpfulError;
use super::output::{format_millis, truncate, write_json, write_table};
use clap::Subcommand;
use serde::Serialize;
use snowflake_kv::{KeyRecord, OnConflict};
use std::io::Write;

const VALUE_COLUMN_WIDTH: usize = 60;

#[derive(Subcommand, Debug, Clone)]
pub enum KvAction {
    /// Show the value stored under a key
    Get {
        key: String,
        #[arg(long)]
        json: bool,
    },
    /// Store a JSON value under a key
    Put {
        key: String,
        /// JSON text, e.g. '{"a": 1}' or '"text"'
        value: String,
        /// Keep an existing value instead of replacing it
        #[arg(long)]
        keep_existing: bool,
    },
    /// Remove keys (absent keys are ignored)
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List stored keys
    List {
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct RecordOutput {
    key: String,
    #[serde(rename = "type")]
    type_tag: String,
    value: serde_json::Value,
    updated_at: String,
}

impl RecordOutput {
    fn from_record(record: &KeyRecord) -> anyhow::Result<Self> {
        Ok(Self {
            key: record.key.clone(),
            type_tag: record.type_tag.to_string(),
            value: record.to_json()?,
            updated_at: format_millis(record.updated_at),
        })
    }
}

pub async fn run(ctx: &CliContext, action: KvAction, out: &mut dyn Write) -> anyhow::Result<()> {
    match action {
        KvAction::Get { key, json } => {
            let store = ctx.open_existing_store().await?;
            let Some(record) = store.kv().get_record(&key).await? else {
                return Err(HelpfulError::new(format!("Key not found: {}", key))
                    .with_suggestion("TRY: snowflake-config kv list --prefix <prefix>")
                    .into());
            };
            let output = RecordOutput::from_record(&record)?;
            if json {
                write_json(out, &output)?;
            } else {
                writeln!(out, "{} ({}, updated {})", output.key, output.type_tag, output.updated_at)?;
                writeln!(out, "{}", serde_json::to_string_pretty(&output.value)?)?;
            }
        }
        KvAction::Put {
            key,
            value,
            keep_existing,
        } => {
            let parsed: serde_json::Value =
                serde_json::from_str(&value).map_err(|e| HelpfulError::invalid_json(&value, e))?;
            let on_conflict = if keep_existing {
                OnConflict::Ignore
            } else {
                OnConflict::Replace
            };
            let store = ctx.open_store().await?;
            if store.kv().put_with(&key, &parsed, on_conflict).await? {
                writeln!(out, "Stored {}", key)?;
            } else {
                writeln!(out, "Kept existing value for {}", key)?;
            }
        }
        KvAction::Delete { keys } => {
            let store = ctx.open_existing_store().await?;
            let removed = store.kv().delete_many(&keys).await?;
            writeln!(out, "Removed {} of {} key(s)", removed, keys.len())?;
        }
        KvAction::List { prefix, json } => {
            let store = ctx.open_existing_store().await?;
            let keys = store.kv().list_keys(&prefix).await?;
            let records = store.kv().get_records(&keys).await?;
            let mut outputs = Vec::with_capacity(keys.len());
            for key in &keys {
                if let Some(record) = records.get(key) {
                    outputs.push(RecordOutput::from_record(record)?);
                }
            }

            if json {
                write_json(out, &outputs)?;
            } else if outputs.is_empty() {
                writeln!(out, "No keys found")?;
            } else {
                let rows = outputs
                    .iter()
                    .map(|o| {
                        vec![
                            o.key.clone(),
                            o.type_tag.clone(),
                            truncate(&o.value.to_string(), VALUE_COLUMN_WIDTH),
                            o.updated_at.clone(),
                        ]
                    })
                    .collect();
                write_table(out, &["KEY", "TYPE", "VALUE", "UPDATED"], rows)?;
            }
        }
    }
    Ok(())
}
