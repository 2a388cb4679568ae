//! CLI command implementations
//!
//! Each subcommand has its own module with an Args struct and a `run()`
//! function. State changes are flushed before the process exits.

use clap::{Args, Subcommand};

pub mod check;
pub mod policy;
pub mod refresh;
pub mod reset;
pub mod slot;
pub mod status;

use crate::app::AppContext;
use crate::error::Result;
use crate::kind::AdKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show policy, counters, cooldowns and gate state
    Status(status::StatusArgs),

    /// Ask whether an ad kind may be shown right now
    Check(KindArgs),

    /// Claim one unit of capacity for an ad kind
    Reserve(KindArgs),

    /// Give back a reservation whose show failed
    Unreserve(KindArgs),

    /// Record a confirmed show
    Shown(KindArgs),

    /// Record that the full-screen ad was dismissed
    Dismissed,

    /// Inspect or replace the current policy
    Policy(policy::PolicyArgs),

    /// Fetch the policy document once from the configured source
    Refresh(refresh::RefreshArgs),

    /// Zero all counters and cooldown timestamps
    Reset(reset::ResetArgs),
}

#[derive(Args, Debug)]
pub struct KindArgs {
    /// app_open, interstitial or banner
    pub kind: AdKind,
}

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    let result = match command {
        Commands::Status(args) => status::run(ctx, args),
        Commands::Check(args) => check::run(ctx, args),
        Commands::Reserve(args) => slot::reserve(ctx, args),
        Commands::Unreserve(args) => slot::unreserve(ctx, args),
        Commands::Shown(args) => slot::shown(ctx, args),
        Commands::Dismissed => slot::dismissed(ctx),
        Commands::Policy(args) => policy::run(ctx, args),
        Commands::Refresh(args) => refresh::run(ctx, args),
        Commands::Reset(args) => reset::run(ctx, args),
    };
    ctx.engine.flush();
    result
}
