use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use hybrid_detect_lib::services::config_store::ConfigStore;
use hybrid_detect_lib::services::detection::{DetectionError, HybridDetector};
use hybrid_detect_lib::services::providers::{delete_embedding_key, store_embedding_key};
use serde::Serialize;
use tracing::error;

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("read stdin failed")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("read file failed: {}", path))
}

fn open_store(config_path: Option<String>) -> ConfigStore {
    match config_path {
        Some(p) => ConfigStore::from_file(PathBuf::from(p)),
        None => ConfigStore::new(ConfigStore::default_config_dir().unwrap_or_else(|| PathBuf::from("."))),
    }
}

fn emit<T: Serialize>(value: &T, out_path: Option<&str>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    if let Some(out_path) = out_path {
        std::fs::write(out_path, &json).with_context(|| format!("write out failed: {}", out_path))?;
        eprintln!("Wrote JSON: {}", out_path);
    }
    Ok(())
}

/// Print the user-facing message and exit; 2 for rejected input, 1 otherwise.
fn fail(err: DetectionError) -> ! {
    error!("[CLI] detection failed: {}", err);
    eprintln!("{}", err.user_message());
    std::process::exit(if err.is_client_error() { 2 } else { 1 });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || has_flag(&args, "--help") {
        eprintln!(
            "Usage:\n  detect_text <path|-> [--config <path>] [--single] [--report] [--out <json_path>]\n  detect_text --set-key <api_key> [--config <path>]\n  detect_text --delete-key [--config <path>]\n\nNotes:\n  - `-` reads the text from stdin.\n  - `--single` scores the whole text at once instead of chunking.\n  - `--report` prints per-chunk probabilities and stylometric features.\n  - Set HYBRID_DETECT_DISABLE_FILE_LOG=1 to log to stderr only."
        );
        return Ok(());
    }

    hybrid_detect_lib::init_logging();

    let store = open_store(parse_arg_value(&args, "--config"));
    if let Some(key) = parse_arg_value(&args, "--set-key") {
        store_embedding_key(&store, &key).context("store API key failed")?;
        eprintln!("Embedding API key saved.");
        return Ok(());
    }
    if has_flag(&args, "--delete-key") {
        delete_embedding_key(&store).context("delete API key failed")?;
        eprintln!("Embedding API key removed.");
        return Ok(());
    }

    let path = args[1].clone();
    let single = has_flag(&args, "--single");
    let report = has_flag(&args, "--report");
    let out_path = parse_arg_value(&args, "--out");

    let config = store.load().context("load config failed")?;

    let text = read_input(&path)?;

    let detector = HybridDetector::from_config(&store, &config).unwrap_or_else(|e| fail(e));
    if let Err(e) = detector.warm_up().await {
        fail(e);
    }

    if report && !single {
        let report = detector.analyze(&text).await.unwrap_or_else(|e| fail(e));
        emit(&report, out_path.as_deref())
    } else {
        let result = if single {
            detector.predict_text(&text).await
        } else {
            detector.predict_long_text(&text).await
        };
        let result = result.unwrap_or_else(|e| fail(e));
        emit(&result, out_path.as_deref())
    }
}
