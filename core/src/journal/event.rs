use crate::determinism::canonical::{sha256_hex, to_canonical_bytes};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// One line of the mutation journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEvent {
    pub ts_utc: String, // RFC3339 UTC
    pub event_type: String,
    pub project_id: String,
    pub actor: String,
    pub details: serde_json::Value,
    pub prev_event_hash: String, // hex 64
    pub event_hash: String,      // hex 64
}

pub const ZERO_HASH_64: &str = "0000000000000000000000000000000000000000000000000000000000000000";

impl JournalEvent {
    pub fn new(
        event_type: &str,
        project_id: &str,
        actor: &str,
        details: serde_json::Value,
    ) -> CoreResult<Self> {
        Ok(Self {
            ts_utc: now_rfc3339_utc()?,
            event_type: event_type.to_string(),
            project_id: project_id.to_string(),
            actor: actor.to_string(),
            details,
            prev_event_hash: ZERO_HASH_64.to_string(),
            event_hash: ZERO_HASH_64.to_string(),
        })
    }
}

fn now_rfc3339_utc() -> CoreResult<String> {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|e| CoreError::InvalidInput(format!("timestamp formatting failed: {}", e)))
}

// The hash covers the whole envelope with `event_hash` itself zeroed.
pub fn compute_event_hash(event: &JournalEvent) -> CoreResult<String> {
    let mut e = event.clone();
    e.event_hash = ZERO_HASH_64.to_string();
    Ok(sha256_hex(&to_canonical_bytes(&e)?))
}

fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn finalize_event(mut event: JournalEvent) -> CoreResult<JournalEvent> {
    if !is_hex64(&event.prev_event_hash) {
        return Err(CoreError::InvalidInput(
            "prev_event_hash must be 64 hex chars".to_string(),
        ));
    }
    validate_event_taxonomy(&event)?;
    event.event_hash = compute_event_hash(&event)?;
    Ok(event)
}

pub const EVENT_TYPES: [&str; 14] = [
    "PROJECT_LOADED",
    "PROJECT_SAVED",
    "PROJECT_SAVE_FAILED",
    "ATTRIBUTION_CREATED",
    "ATTRIBUTION_LINKED",
    "ATTRIBUTION_UNLINKED",
    "ATTRIBUTION_DELETED",
    "ATTRIBUTION_CONFIRMED",
    "ATTRIBUTION_UPDATED",
    "ATTRIBUTION_REPLACED",
    "PARENT_OVERRIDDEN",
    "SIGNALS_HIDDEN",
    "SIGNALS_UNHIDDEN",
    "SIGNAL_PROMOTED",
];

fn validate_event_taxonomy(event: &JournalEvent) -> CoreResult<()> {
    if !EVENT_TYPES.contains(&event.event_type.as_str()) {
        return Err(CoreError::InvalidInput(format!(
            "unknown event_type {}",
            event.event_type
        )));
    }
    for k in required_detail_keys(&event.event_type) {
        if event.details.get(k).is_none() {
            return Err(CoreError::InvalidInput(format!(
                "event {} missing details.{}",
                event.event_type, k
            )));
        }
    }
    Ok(())
}

fn required_detail_keys(event_type: &str) -> &'static [&'static str] {
    match event_type {
        "PROJECT_LOADED" => &["store_version", "resources", "manual_count", "external_count"],
        "PROJECT_SAVED" => &["store_version", "manual_count", "link_entries", "hidden_count"],
        "PROJECT_SAVE_FAILED" => &["store_version", "error"],
        "ATTRIBUTION_CREATED" | "SIGNAL_PROMOTED" => &["version", "created", "linked"],
        "ATTRIBUTION_LINKED" => &["version", "linked"],
        "ATTRIBUTION_UNLINKED" => &["version", "unlinked", "deleted"],
        "ATTRIBUTION_DELETED" => &["version", "unlinked", "deleted"],
        "ATTRIBUTION_CONFIRMED" | "ATTRIBUTION_UPDATED" => {
            &["version", "created", "updated", "deleted"]
        }
        "ATTRIBUTION_REPLACED" => &["version", "linked", "unlinked", "deleted"],
        "PARENT_OVERRIDDEN" => &["version"],
        "SIGNALS_HIDDEN" => &["version", "hidden"],
        "SIGNALS_UNHIDDEN" => &["version", "unhidden"],
        _ => &[],
    }
}
