//! `config` command: inspect and delete configuration collections.

use super::context::CliContext;
use super::error::HelpfulError;
use super::output::{format_time, write_json, write_table};
use clap::Subcommand;
use serde::Serialize;
use snowflake_config::{CollectionId, CollectionRecord, ValueEntry};
use std::io::Write;

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// List all collections
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a collection and its stored values
    Show {
        id: CollectionId,
        #[arg(long)]
        json: bool,
    },
    /// Delete a collection and all of its values
    Delete { id: CollectionId },
}

#[derive(Debug, Serialize)]
struct CollectionSummary {
    #[serde(flatten)]
    record: CollectionRecord,
    values: usize,
}

#[derive(Debug, Serialize)]
struct CollectionDetail {
    #[serde(flatten)]
    record: CollectionRecord,
    values: Vec<ValueEntry>,
}

pub async fn run(ctx: &CliContext, action: ConfigAction, out: &mut dyn Write) -> anyhow::Result<()> {
    let store = ctx.open_existing_store().await?;
    match action {
        ConfigAction::List { json } => {
            let mut summaries = Vec::new();
            for record in store.list_configurations().await? {
                let values = store.list_values(record.collection_id).await?.len();
                summaries.push(CollectionSummary { record, values });
            }

            if json {
                write_json(out, &summaries)?;
            } else if summaries.is_empty() {
                writeln!(out, "No configuration collections")?;
            } else {
                let rows = summaries
                    .iter()
                    .map(|s| {
                        vec![
                            s.record.collection_id.to_string(),
                            s.record.display_name.clone(),
                            s.record.schema_name.clone(),
                            format_time(&s.record.created_at),
                            s.values.to_string(),
                        ]
                    })
                    .collect();
                write_table(out, &["ID", "NAME", "SCHEMA", "CREATED", "VALUES"], rows)?;
            }
        }
        ConfigAction::Show { id, json } => {
            let record = store
                .get_collection_record(id)
                .await?
                .ok_or_else(|| HelpfulError::collection_not_found(id))?;
            let values = store.list_values(id).await?;

            if json {
                write_json(out, &CollectionDetail { record, values })?;
                return Ok(());
            }

            writeln!(out, "{} ({})", record.display_name, record.collection_id)?;
            writeln!(out, "Schema:   {}", record.schema_name)?;
            writeln!(out, "Created:  {}", format_time(&record.created_at))?;
            writeln!(out)?;
            if values.is_empty() {
                writeln!(out, "No values stored yet")?;
            } else {
                write_table(out, &["SECTION", "OPTION", "TYPE", "VALUE", "VALUE ID"], value_rows(&values))?;
            }
        }
        ConfigAction::Delete { id } => {
            if store.get_collection_record(id).await?.is_none() {
                writeln!(out, "Collection {} not found; nothing to delete", id)?;
                return Ok(());
            }
            let values = store.list_values(id).await?.len();
            store.delete_configuration(id).await?;
            writeln!(out, "Deleted collection {} ({} value(s))", id, values)?;
        }
    }
    Ok(())
}

pub(crate) fn value_rows(values: &[ValueEntry]) -> Vec<Vec<String>> {
    values
        .iter()
        .map(|v| {
            vec![
                v.section.clone(),
                v.option.clone(),
                v.value.type_name().to_string(),
                v.value.to_string(),
                v.value_id.to_string(),
            ]
        })
        .collect()
}
