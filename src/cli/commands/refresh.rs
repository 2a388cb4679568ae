//! adgate refresh - One policy refresh cycle.

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_ok};
use crate::error::Result;
use crate::policy::RefreshOutcome;

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Read the document from this file instead of refresh.source_path
    #[arg(long, value_name = "PATH")]
    pub source: Option<PathBuf>,
}

pub fn run(ctx: &AppContext, args: &RefreshArgs) -> Result<()> {
    let refresher = ctx.refresher(args.source.as_deref())?;
    let outcome = refresher.refresh_once();

    if ctx.robot_mode {
        let mut data = serde_json::json!({ "outcome": outcome.as_str() });
        match &outcome {
            RefreshOutcome::Applied { changed } | RefreshOutcome::FailClosed { changed } => {
                data["changed"] = serde_json::Value::Bool(*changed);
            }
            RefreshOutcome::FetchFailed(message) => {
                data["error"] = serde_json::Value::String(message.clone());
            }
            RefreshOutcome::Kept => {}
        }
        return emit_json(&robot_ok(data));
    }

    match outcome {
        RefreshOutcome::Applied { changed } => {
            println!("Policy refreshed ({}).", if changed { "changed" } else { "unchanged" });
        }
        RefreshOutcome::FailClosed { .. } => {
            println!("Policy document rejected; fail-closed default applied.");
        }
        RefreshOutcome::Kept => println!("Empty policy response; current policy kept."),
        RefreshOutcome::FetchFailed(message) => {
            println!("Policy fetch failed ({message}); current policy kept.");
        }
    }
    Ok(())
}
