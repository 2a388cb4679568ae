//! adgate check - Eligibility for one ad kind.

use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_denied, robot_ok, verdict};
use crate::engine::Denial;
use crate::error::Result;
use crate::kind::AdKind;

use super::KindArgs;

#[derive(Serialize)]
struct CheckReport {
    kind: AdKind,
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    denial: Option<Denial>,
    hour_count: u32,
    day_count: u32,
}

pub fn run(ctx: &AppContext, args: &KindArgs) -> Result<()> {
    let eligibility = ctx.engine.eligibility(args.kind);
    let (hour_count, day_count) = ctx.engine.counters(args.kind);
    let report = CheckReport {
        kind: args.kind,
        allowed: eligibility.is_ok(),
        denial: eligibility.err(),
        hour_count,
        day_count,
    };

    if ctx.robot_mode {
        return match report.denial {
            Some(denial) => emit_json(&robot_denied(denial.code(), denial.to_string(), &report)),
            None => emit_json(&robot_ok(&report)),
        };
    }

    let mut layout = HumanLayout::new();
    layout
        .title(&format!("check {}", args.kind))
        .kv(
            "Can show",
            &verdict(report.allowed, report.denial.map_or("", |d| d.code())),
        )
        .kv("This hour", &hour_count.to_string())
        .kv("Today", &day_count.to_string());
    if let Some(denial) = report.denial {
        layout.kv("Reason", &denial.to_string());
    }
    emit_human(layout);
    Ok(())
}
