use ulid::Ulid;

/// Fresh id for an auditor-authored attribution.
pub fn new_manual_id() -> String {
    format!("m_{}", Ulid::new().to_string().to_ascii_lowercase())
}
