//! Parsing of the remote policy document.
//!
//! The document is either a single JSON object or the REST representation:
//! an array of rows, one per application. Rows are matched against the
//! configured app id, then its `.debug`-stripped form, then its last dotted
//! segment.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AdError, Result};

use super::model::{
    AdPolicy, DEFAULT_APP_OPEN_COOLDOWN_SECONDS, DEFAULT_APP_OPEN_MAX_PER_DAY,
    DEFAULT_APP_OPEN_MAX_PER_HOUR, DEFAULT_INTERSTITIAL_MAX_PER_DAY,
    DEFAULT_INTERSTITIAL_MAX_PER_HOUR, DEFAULT_MIN_FULLSCREEN_GAP_SECONDS, KindPolicy, Limit,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolicyRow {
    id: Option<i64>,
    app_id: Option<String>,
    is_active: Option<bool>,
    ad_app_open_enabled: Option<bool>,
    ad_interstitial_enabled: Option<bool>,
    ad_banner_enabled: Option<bool>,
    app_open_max_per_hour: Option<i64>,
    app_open_max_per_day: Option<i64>,
    app_open_cooldown_seconds: Option<i64>,
    ad_interstitial_max_per_hour: Option<i64>,
    ad_interstitial_max_per_day: Option<i64>,
    ad_interstitial_cooldown_seconds: Option<i64>,
    min_fullscreen_gap_seconds: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Rows(Vec<PolicyRow>),
    Row(Box<PolicyRow>),
}

impl PolicyRow {
    fn app_id(&self) -> &str {
        self.app_id.as_deref().unwrap_or("")
    }

    fn into_policy(self, configured_app_id: &str) -> AdPolicy {
        let app_id = match self.app_id.as_deref() {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => configured_app_id.to_string(),
        };
        AdPolicy {
            id: self.id,
            app_id: Some(app_id),
            active: self.is_active.unwrap_or(true),
            app_open: KindPolicy {
                enabled: self.ad_app_open_enabled.unwrap_or(false),
                max_per_hour: limit(self.app_open_max_per_hour, DEFAULT_APP_OPEN_MAX_PER_HOUR),
                max_per_day: limit(self.app_open_max_per_day, DEFAULT_APP_OPEN_MAX_PER_DAY),
                cooldown_seconds: seconds(self.app_open_cooldown_seconds, DEFAULT_APP_OPEN_COOLDOWN_SECONDS),
            },
            interstitial: KindPolicy {
                enabled: self.ad_interstitial_enabled.unwrap_or(false),
                max_per_hour: limit(self.ad_interstitial_max_per_hour, DEFAULT_INTERSTITIAL_MAX_PER_HOUR),
                max_per_day: limit(self.ad_interstitial_max_per_day, DEFAULT_INTERSTITIAL_MAX_PER_DAY),
                cooldown_seconds: seconds(self.ad_interstitial_cooldown_seconds, 0),
            },
            banner: KindPolicy::unlimited(self.ad_banner_enabled.unwrap_or(false)),
            min_fullscreen_gap_seconds: seconds(
                self.min_fullscreen_gap_seconds,
                DEFAULT_MIN_FULLSCREEN_GAP_SECONDS,
            ),
        }
    }
}

fn limit(raw: Option<i64>, default: u32) -> Limit {
    raw.map_or(Limit::AtMost(default), Limit::from_raw)
}

fn seconds(raw: Option<i64>, default: u32) -> u32 {
    raw.map_or(default, |value| u32::try_from(value.max(0)).unwrap_or(u32::MAX))
}

/// Ids a row may carry to count as ours, in priority order.
fn candidate_ids(app_id: &str) -> Vec<String> {
    let mut base = app_id;
    while let Some(stripped) = base.strip_suffix(".debug") {
        base = stripped;
    }
    let simple = app_id.rsplit('.').next().unwrap_or(app_id);

    let mut ids = vec![app_id.to_string()];
    for candidate in [base, simple] {
        if !ids.iter().any(|id| id == candidate) {
            ids.push(candidate.to_string());
        }
    }
    ids
}

/// Parse a policy document for `app_id`.
///
/// Errors mean the document is blank, malformed, or has no row for this app.
pub fn parse_policy(json: &str, app_id: &str) -> Result<AdPolicy> {
    if json.trim().is_empty() {
        return Err(AdError::Policy("policy document is empty".to_string()));
    }

    let row = match serde_json::from_str::<Document>(json)
        .map_err(|err| AdError::Policy(format!("malformed policy document: {err}")))?
    {
        Document::Row(row) => *row,
        Document::Rows(rows) => select_row(rows, app_id)?,
    };

    Ok(row.into_policy(app_id))
}

fn select_row(mut rows: Vec<PolicyRow>, app_id: &str) -> Result<PolicyRow> {
    if rows.len() == 1 && rows[0].app_id.is_none() {
        return Ok(rows.remove(0));
    }
    for candidate in candidate_ids(app_id) {
        if let Some(pos) = rows.iter().position(|row| row.app_id() == candidate) {
            debug!(app_id, matched = %candidate, "selected policy row");
            return Ok(rows.swap_remove(pos));
        }
    }
    Err(AdError::Policy(format!(
        "no policy row for app id {app_id} among {} rows",
        rows.len()
    )))
}

/// Parse, falling back to the fail-closed default on any error.
pub fn parse_policy_or_fail_closed(json: &str, app_id: &str) -> AdPolicy {
    parse_policy(json, app_id).unwrap_or_else(|err| {
        warn!(error = %err, "policy document rejected; applying fail-closed default");
        AdPolicy::fail_closed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_object() {
        let json = r#"{
            "id": 3,
            "app_id": "alcoholictimer",
            "is_active": true,
            "ad_app_open_enabled": true,
            "ad_interstitial_enabled": true,
            "ad_banner_enabled": false,
            "app_open_max_per_hour": 1,
            "app_open_max_per_day": 4,
            "app_open_cooldown_seconds": 120,
            "ad_interstitial_max_per_hour": 1,
            "ad_interstitial_max_per_day": -1,
            "min_fullscreen_gap_seconds": 45
        }"#;
        let policy = parse_policy(json, "alcoholictimer").unwrap();
        assert_eq!(policy.id, Some(3));
        assert!(policy.app_open.enabled);
        assert_eq!(policy.app_open.max_per_hour, Limit::AtMost(1));
        assert_eq!(policy.app_open.cooldown_seconds, 120);
        assert_eq!(policy.interstitial.max_per_day, Limit::Unbounded);
        assert_eq!(policy.interstitial.cooldown_seconds, 0);
        assert!(!policy.banner.enabled);
        assert_eq!(policy.min_fullscreen_gap_seconds, 45);
    }

    #[test]
    fn missing_fields_take_conservative_defaults() {
        let policy = parse_policy("{}", "alcoholictimer").unwrap();
        assert!(policy.active);
        assert!(!policy.app_open.enabled);
        assert!(!policy.interstitial.enabled);
        assert!(!policy.banner.enabled);
        assert_eq!(policy.interstitial.max_per_hour, Limit::AtMost(2));
        assert_eq!(policy.app_id.as_deref(), Some("alcoholictimer"));
        assert!(!policy.differs_from(&AdPolicy::fail_closed()));
    }

    #[test]
    fn selects_row_by_app_id_priority() {
        let json = r#"[
            {"app_id": "other", "ad_banner_enabled": true},
            {"app_id": "alcoholictimer", "ad_interstitial_enabled": true},
            {"app_id": "kr.sweetapps.alcoholictimer", "ad_app_open_enabled": true}
        ]"#;
        let exact = parse_policy(json, "kr.sweetapps.alcoholictimer").unwrap();
        assert!(exact.app_open.enabled);

        let debug_build = parse_policy(json, "kr.sweetapps.alcoholictimer.debug").unwrap();
        assert!(debug_build.app_open.enabled);

        let simple = parse_policy(json, "com.example.alcoholictimer").unwrap();
        assert!(simple.interstitial.enabled);

        assert!(parse_policy(json, "nothing.matches").is_err());
    }

    #[test]
    fn single_anonymous_row_is_accepted() {
        let policy = parse_policy(r#"[{"ad_banner_enabled": true}]"#, "anything").unwrap();
        assert!(policy.banner.enabled);
    }

    #[test]
    fn malformed_documents_fail_closed() {
        for json in ["", "   ", "[]", "not json", r#"{"is_active": "yes"}"#, "42"] {
            assert!(parse_policy(json, "alcoholictimer").is_err(), "{json:?}");
            let policy = parse_policy_or_fail_closed(json, "alcoholictimer");
            assert_eq!(policy, AdPolicy::fail_closed());
        }
    }

    #[test]
    fn negative_seconds_clamp_to_zero() {
        let policy = parse_policy(
            r#"{"app_open_cooldown_seconds": -5, "min_fullscreen_gap_seconds": -1}"#,
            "x",
        )
        .unwrap();
        assert_eq!(policy.app_open.cooldown_seconds, 0);
        assert_eq!(policy.min_fullscreen_gap_seconds, 0);
    }
}
