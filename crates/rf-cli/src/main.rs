//! CLI de operador para mensajes de resultados.
//!
//! ```text
//! rf-cli decode <file>                    mensaje binario -> JSON
//! rf-cli compare <candidate> <baseline>   dos mensajes binarios -> ComparisonResult JSON
//! rf-cli encode-fixture <json> <out>      JSON de DecodedMessage -> mensaje binario
//! ```
use log::debug;
use rf_core::{compare, decode, encode, DecodeError, DecodedMessage, EncodeError};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("uso: rf-cli decode <file> | compare <candidate> <baseline> | encode-fixture <json> <out>")]
    Usage,
    #[error("{path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("{path}: {source}")]
    Decode { path: String, source: DecodeError },
    #[error("{0}")]
    Encode(#[from] EncodeError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage => 2,
            CliError::Decode { .. } | CliError::Json(_) | CliError::Encode(_) => 4,
            CliError::Io { .. } => 5,
        }
    }
}

fn read(path: &str) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::Io { path: path.to_string(),
                                                   source })
}

fn read_message(path: &str) -> Result<DecodedMessage, CliError> {
    let bytes = read(path)?;
    debug!("{path}: {} bytes", bytes.len());
    decode(&bytes).map_err(|source| CliError::Decode { path: path.to_string(),
                                                       source })
}

/// Ejecuta el subcomando y devuelve lo que debe imprimirse.
fn run(args: &[String]) -> Result<String, CliError> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["decode", file] => Ok(serde_json::to_string_pretty(&read_message(file)?)?),
        ["compare", candidate, baseline] => {
            let result = compare(&read_message(candidate)?, &read_message(baseline)?);
            Ok(serde_json::to_string_pretty(&result)?)
        }
        ["encode-fixture", json, out] => {
            let message: DecodedMessage = serde_json::from_slice(&read(json)?)?;
            let bytes = encode(&message)?;
            fs::write(Path::new(out), &bytes).map_err(|source| CliError::Io { path: out.to_string(),
                                                                              source })?;
            Ok(format!("{out}: {} bytes", bytes.len()))
        }
        _ => Err(CliError::Usage),
    }
}

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("[rf-cli] {e}");
            std::process::exit(e.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rf_core::{MessageMetadata, ResultValue};

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn sample(batch: &str, value: i64) -> DecodedMessage {
        let meta = MessageMetadata { team: "acme".into(),
                                     suite: "students".into(),
                                     batch: batch.into(),
                                     element: "alice".into(),
                                     built_at: batch.into(),
                                     submitted_at: Utc.timestamp_millis_opt(1_714_564_800_000).unwrap() };
        DecodedMessage::new(meta).with_result("a", ResultValue::Int(value))
                                 .with_metric("run", 10)
    }

    #[test]
    fn fixture_encodes_and_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("m.json");
        let bin = dir.path().join("m.bin");
        fs::write(&json, serde_json::to_vec(&sample("v1", 1)).unwrap()).unwrap();

        let out = run(&args(&["encode-fixture", json.to_str().unwrap(), bin.to_str().unwrap()])).unwrap();
        assert!(out.ends_with("bytes"));
        let decoded = run(&args(&["decode", bin.to_str().unwrap()])).unwrap();
        let back: DecodedMessage = serde_json::from_str(&decoded).unwrap();
        assert_eq!(back, sample("v1", 1));
    }

    #[test]
    fn compare_prints_overview() {
        let dir = tempfile::tempdir().unwrap();
        let c = dir.path().join("c.bin");
        let b = dir.path().join("b.bin");
        fs::write(&c, encode(&sample("v2", 2)).unwrap()).unwrap();
        fs::write(&b, encode(&sample("v1", 1)).unwrap()).unwrap();
        let out = run(&args(&["compare", c.to_str().unwrap(), b.to_str().unwrap()])).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["overview"]["keys_mismatched"], 1);
        assert_eq!(v["metrics"]["overview"]["duration_delta"], 0);
    }

    #[test]
    fn bad_input_maps_to_exit_codes() {
        assert_eq!(run(&args(&["nope"])).unwrap_err().exit_code(), 2);
        assert_eq!(run(&args(&["decode", "/definitely/missing.bin"])).unwrap_err().exit_code(), 5);
        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("junk.bin");
        fs::write(&junk, b"garbage").unwrap();
        assert_eq!(run(&args(&["decode", junk.to_str().unwrap()])).unwrap_err().exit_code(), 4);
    }
}
