use attribution_core::snapshot::LoadSnapshot;
use attribution_core::store::integrity::IntegritySummary;
use std::path::Path;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn validate(path: &Path) -> Result<IntegritySummary, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let snapshot = LoadSnapshot::from_json_slice(&bytes).map_err(|e| e.to_string())?;
    snapshot.validate().map_err(|e| e.to_string())
}

fn main() {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: snapshot_validator <path/to/snapshot.json>");
        std::process::exit(2);
    }

    match validate(Path::new(&args[1])) {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary).unwrap());
            if summary.overall == "PASS" {
                std::process::exit(0);
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("snapshot error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_links_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{
                "resources": {"a": 1},
                "manualAttributions": {
                    "attributions": {"m": {}, "orphan": {}},
                    "resourcesToAttributions": {"/a": ["m", "ghost"], "/missing": ["m"]}
                }
            }"#,
        )
        .unwrap();
        let summary = validate(&path).unwrap();
        assert_eq!(summary.overall, "FAIL");
        assert_eq!(summary.issues.len(), 3);
    }
}
