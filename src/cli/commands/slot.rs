//! adgate reserve | unreserve | shown | dismissed - Drive the show lifecycle.

use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_denied, robot_ok};
use crate::error::Result;

use super::KindArgs;

pub fn reserve(ctx: &AppContext, args: &KindArgs) -> Result<()> {
    let result = ctx.engine.reserve_detailed(args.kind);
    let (hour_count, day_count) = ctx.engine.counters(args.kind);
    let data = serde_json::json!({
        "kind": args.kind,
        "reserved": result.is_ok(),
        "hour_count": hour_count,
        "day_count": day_count,
    });

    if ctx.robot_mode {
        return match result {
            Ok(()) => emit_json(&robot_ok(data)),
            Err(denial) => emit_json(&robot_denied(denial.code(), denial.to_string(), data)),
        };
    }
    match result {
        Ok(()) => println!(
            "Reserved {} ({hour_count} this hour, {day_count} today).",
            args.kind
        ),
        Err(denial) => println!("Not reserved: {denial} [{}]", denial.code()),
    }
    Ok(())
}

pub fn unreserve(ctx: &AppContext, args: &KindArgs) -> Result<()> {
    ctx.engine.unreserve(args.kind);
    let (hour_count, day_count) = ctx.engine.counters(args.kind);
    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "kind": args.kind,
            "hour_count": hour_count,
            "day_count": day_count,
        })));
    }
    println!(
        "Released {} ({hour_count} this hour, {day_count} today).",
        args.kind
    );
    Ok(())
}

pub fn shown(ctx: &AppContext, args: &KindArgs) -> Result<()> {
    ctx.engine.record_shown(args.kind);
    let now = ctx.engine.now_ms();
    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "kind": args.kind,
            "shown_at": now,
        })));
    }
    println!("Recorded {} shown.", args.kind);
    Ok(())
}

pub fn dismissed(ctx: &AppContext) -> Result<()> {
    ctx.engine.record_dismissed();
    let now = ctx.engine.now_ms();
    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({ "dismissed_at": now })));
    }
    println!("Recorded full-screen dismissal.");
    Ok(())
}
