//! adgate policy - Inspect or replace the current policy.
//!
//! Each CLI invocation is a fresh process, so an applied document is written
//! to the policy cache, which later invocations restore at startup.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok};
use crate::error::{AdError, Result};
use crate::kind::AdKind;
use crate::policy::{AdPolicy, parse_policy};

#[derive(Args, Debug)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub command: PolicyCommand,
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Print the policy in effect
    Show,
    /// Apply a policy document (JSON object or array of rows)
    Apply(ApplyArgs),
    /// Drop the cached policy and return to the fail-closed default
    Clear,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to the policy document
    pub file: PathBuf,
}

pub fn run(ctx: &AppContext, args: &PolicyArgs) -> Result<()> {
    match &args.command {
        PolicyCommand::Show => show(ctx),
        PolicyCommand::Apply(apply_args) => apply(ctx, apply_args),
        PolicyCommand::Clear => clear(ctx),
    }
}

fn show(ctx: &AppContext) -> Result<()> {
    let policy = ctx.engine.policy();
    let loaded = ctx.engine.is_policy_loaded();
    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "loaded": loaded,
            "policy": policy.as_ref(),
        })));
    }
    let mut layout = HumanLayout::new();
    layout.title(if loaded { "Policy" } else { "Policy (fail-closed default)" });
    describe(&mut layout, &policy);
    emit_human(layout);
    Ok(())
}

fn apply(ctx: &AppContext, args: &ApplyArgs) -> Result<()> {
    let document = std::fs::read_to_string(&args.file).map_err(|err| {
        AdError::Policy(format!("read policy document {}: {err}", args.file.display()))
    })?;
    let policy = parse_policy(&document, ctx.engine.app_id())?;
    ctx.cache.store(&document, ctx.engine.now_ms())?;
    let change = ctx.engine.set_policy(policy);

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "changed": change.changed,
            "released": change.released,
            "policy": change.current.as_ref(),
        })));
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Policy applied")
        .kv("Changed", &change.changed.to_string());
    describe(&mut layout, &change.current);
    emit_human(layout);
    Ok(())
}

fn clear(ctx: &AppContext) -> Result<()> {
    let removed = ctx.cache.clear()?;
    let change = ctx.engine.clear_policy();
    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "cache_removed": removed,
            "changed": change.changed,
        })));
    }
    println!("Policy cleared; using the fail-closed default.");
    Ok(())
}

fn describe(layout: &mut HumanLayout, policy: &AdPolicy) {
    layout
        .kv("Active", &policy.active.to_string())
        .kv("Min full-screen gap", &format!("{}s", policy.min_fullscreen_gap_seconds));
    for kind in AdKind::ALL {
        let limits = policy.kind(kind);
        layout.kv(
            kind.as_str(),
            &format!(
                "enabled={} hour={} day={} cooldown={}s",
                limits.enabled, limits.max_per_hour, limits.max_per_day, limits.cooldown_seconds
            ),
        );
    }
}
