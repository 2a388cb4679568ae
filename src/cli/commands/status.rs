//! adgate status - Engine snapshot.

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, format_timestamp, robot_ok, verdict};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Include the full-screen gate transition log
    #[arg(long)]
    pub transitions: bool,
}

pub fn run(ctx: &AppContext, args: &StatusArgs) -> Result<()> {
    let mut snapshot = ctx.engine.snapshot();
    if !args.transitions {
        snapshot.transitions.clear();
    }

    if ctx.robot_mode {
        return emit_json(&robot_ok(&snapshot));
    }

    let policy = &snapshot.policy;
    let mut layout = HumanLayout::new();
    layout
        .title("adgate status")
        .kv("Root", &ctx.root.display().to_string())
        .kv("App id", &snapshot.app_id)
        .kv(
            "Policy",
            if snapshot.policy_loaded { "loaded" } else { "fail-closed default" },
        )
        .kv("Active", &policy.active.to_string())
        .kv("Min full-screen gap", &format!("{}s", policy.min_fullscreen_gap_seconds))
        .kv("Full screen showing", &snapshot.full_screen_showing.to_string())
        .kv("Banner force-hidden", &snapshot.banner_force_hidden.to_string())
        .kv(
            "Last dismissed",
            &format_timestamp(snapshot.last_full_screen_dismissed_at),
        );

    for kind in &snapshot.kinds {
        layout.blank().section(kind.kind.as_str());
        layout
            .kv("Enabled", &kind.enabled.to_string())
            .kv("This hour", &format!("{} / {}", kind.hour_count, kind.max_per_hour))
            .kv("Today", &format!("{} / {}", kind.day_count, kind.max_per_day))
            .kv("Cooldown", &format!("{}s", kind.cooldown_seconds))
            .kv("Last shown", &format_timestamp(kind.last_shown_at))
            .kv(
                "Can show",
                &verdict(kind.denial.is_none(), kind.denial.map_or("", |d| d.code())),
            );
    }

    if !snapshot.transitions.is_empty() {
        layout.blank().section("Gate transitions");
        for transition in &snapshot.transitions {
            layout.kv(
                &format!("#{}", transition.seq),
                &format!(
                    "{:?} = {} at {}",
                    transition.flag,
                    transition.value,
                    format_timestamp(transition.at_ms)
                ),
            );
        }
    }

    emit_human(layout);
    Ok(())
}
