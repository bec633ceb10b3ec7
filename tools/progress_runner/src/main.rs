use attribution_core::config::EngineConfig;
use attribution_core::engine::AttributionEngine;
use attribution_core::export::ExportKind;
use attribution_core::model::resource::ROOT_PATH;
use attribution_core::snapshot::LoadSnapshot;
use serde_json::json;
use std::path::{Path, PathBuf};

struct Args {
    snapshot: PathBuf,
    config: Option<PathBuf>,
    export_dir: Option<PathBuf>,
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut snapshot = None;
    let mut config = None;
    let mut export_dir = None;
    let mut it = raw.iter().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--export" => {
                export_dir = Some(PathBuf::from(it.next().ok_or("--export needs a directory")?))
            }
            "--config" => config = Some(PathBuf::from(it.next().ok_or("--config needs a file")?)),
            other if other.starts_with("--") => return Err(format!("unknown flag {}", other)),
            other => snapshot = Some(PathBuf::from(other)),
        }
    }
    Ok(Args {
        snapshot: snapshot.ok_or("missing snapshot path")?,
        config,
        export_dir,
    })
}

fn load(args: &Args) -> Result<AttributionEngine, String> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    // One-shot report: nothing to overlap the recompute with.
    config.worker_enabled = false;
    let bytes = std::fs::read(&args.snapshot)
        .map_err(|e| format!("cannot read {}: {}", args.snapshot.display(), e))?;
    let snapshot = LoadSnapshot::from_json_slice(&bytes).map_err(|e| e.to_string())?;
    AttributionEngine::load(&snapshot, config).map_err(|e| e.to_string())
}

fn write_exports(engine: &AttributionEngine, dir: &Path) -> Result<Vec<String>, String> {
    std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    let mut written = Vec::new();
    for kind in ExportKind::ALL {
        let csv = engine.export(kind).map_err(|e| e.to_string())?;
        let path = dir.join(kind.file_name());
        std::fs::write(&path, csv).map_err(|e| e.to_string())?;
        written.push(path.display().to_string());
    }
    Ok(written)
}

fn run(args: &Args) -> Result<serde_json::Value, String> {
    let mut engine = load(args)?;
    let progress = engine.progress_statistics();
    let next = engine
        .next_unconfirmed(ROOT_PATH)
        .map_err(|e| e.to_string())?;
    let filters = engine.filter_options();
    let licenses = engine.license_statistics();
    let exports = match &args.export_dir {
        Some(dir) => write_exports(&engine, dir)?,
        None => Vec::new(),
    };
    Ok(json!({
        "project_id": engine.metadata().project_id,
        "progress": progress,
        "next_unconfirmed": next,
        "filters": filters,
        "licenses": licenses,
        "exports": exports,
    }))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = std::env::args().collect();
    let args = match parse_args(&raw) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: progress_runner <snapshot.json> [--config engine.toml] [--export <dir>]");
            std::process::exit(2);
        }
    };

    match run(&args) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report).unwrap());
        }
        Err(e) => {
            eprintln!("progress_runner error: {}", e);
            std::process::exit(1);
        }
    }
}
