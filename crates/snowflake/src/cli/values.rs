//! `value` command: direct access to one stored value.

use super::collections::value_rows;
use super::context::CliContext;
use super::error::HelpfulError;
use super::output::{write_json, write_table};
use clap::Subcommand;
use snowflake_config::{ConfigValue, ValueId};
use std::io::Write;

#[derive(Subcommand, Debug, Clone)]
pub enum ValueAction {
    /// Show a value
    Get {
        id: ValueId,
        #[arg(long)]
        json: bool,
    },
    /// Overwrite a value; the kind must match the stored one
    Set {
        id: ValueId,
        /// Tagged JSON, e.g. '{"type": "bool", "value": true}'
        value: String,
    },
}

pub async fn run(ctx: &CliContext, action: ValueAction, out: &mut dyn Write) -> anyhow::Result<()> {
    match action {
        ValueAction::Get { id, json } => {
            let store = ctx.open_existing_store().await?;
            let entry = store
                .get_value(id)
                .await?
                .ok_or_else(|| HelpfulError::value_not_found(id))?;
            if json {
                write_json(out, &entry)?;
            } else {
                write_table(
                    out,
                    &["SECTION", "OPTION", "TYPE", "VALUE", "VALUE ID"],
                    value_rows(std::slice::from_ref(&entry)),
                )?;
                writeln!(out, "Collection: {}", entry.collection_id)?;
            }
        }
        ValueAction::Set { id, value } => {
            let parsed: ConfigValue =
                serde_json::from_str(&value).map_err(|e| HelpfulError::invalid_json(&value, e))?;
            let store = ctx.open_existing_store().await?;
            let entry = store
                .set_value(id, parsed)
                .await?
                .ok_or_else(|| HelpfulError::value_not_found(id))?;
            writeln!(out, "Set {}.{} = {}", entry.section, entry.option, entry.value)?;
        }
    }
    Ok(())
}
