//! adgate reset - Zero counters and cooldowns.

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_ok};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Also drop the cached policy document
    #[arg(long)]
    pub policy: bool,
}

pub fn run(ctx: &AppContext, args: &ResetArgs) -> Result<()> {
    ctx.engine.reset_counters();
    let policy_cleared = if args.policy {
        ctx.cache.clear()?;
        ctx.engine.clear_policy();
        true
    } else {
        false
    };

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "counters_reset": true,
            "policy_cleared": policy_cleared,
        })));
    }
    println!("Counters and cooldowns reset.");
    if policy_cleared {
        println!("Cached policy removed.");
    }
    Ok(())
}
