//! `paths` command: show where Snowflake keeps its files.

use super::context::CliContext;
use std::io::Write;

#[derive(Debug, clap::Args)]
pub struct PathsArgs {
    /// Show resolved paths in JSON format
    #[arg(long)]
    pub json: bool,
}

pub fn run(ctx: &CliContext, args: PathsArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let home = ctx.home();
    let store = ctx.store_path();
    let logs = ctx.logs_dir();

    if args.json {
        let paths = serde_json::json!({
            "home": home.to_string_lossy(),
            "store": {
                "path": store.to_string_lossy(),
                "exists": store.exists(),
            },
            "logs": {
                "path": logs.to_string_lossy(),
                "exists": logs.exists(),
            },
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&paths)?)?;
        return Ok(());
    }

    writeln!(out, "SNOWFLAKE PATHS")?;
    writeln!(out, "===============")?;
    writeln!(out)?;
    writeln!(out, "Home:   {}", home.display())?;
    writeln!(
        out,
        "Store:  {} ({})",
        store.display(),
        if store.exists() { "exists" } else { "not found" }
    )?;
    writeln!(
        out,
        "Logs:   {} ({})",
        logs.display(),
        if logs.exists() { "exists" } else { "not found" }
    )?;
    Ok(())
}
