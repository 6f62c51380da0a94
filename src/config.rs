//! JSON-backed configuration for sinks that are usually set up once at
//! process start from a config file rather than hand-built in code.

use crate::compression::CompressionKind;
use crate::error::{LogCoreError, Result};
use crate::file_sink::{AdvanceRules, NameStyle, PurgeRules, RotatingFileSinkConfig};
use crate::gate::LogGate;
use crate::severity::Severity;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct RotatingFileSinkSpec {
    dir: PathBuf,
    name: String,
    #[serde(default = "default_gate_name")]
    gate: String,
    #[serde(default)]
    name_style: NameStyleSpec,
    #[serde(default)]
    purge_exclude_patterns: Vec<String>,
    #[serde(default)]
    size_limit_bytes: Option<u64>,
    #[serde(default)]
    age_limit_secs: Option<u64>,
    #[serde(default)]
    max_files: Option<usize>,
    #[serde(default)]
    max_total_bytes: Option<u64>,
    #[serde(default)]
    max_age_secs: Option<u64>,
    #[serde(default = "default_true")]
    create_dir_if_needed: bool,
    #[serde(default = "default_max_deletes")]
    max_deletes_per_cleanup: usize,
    #[serde(default)]
    compress_rotated: CompressionSpec,
}

fn default_gate_name() -> String {
    "All".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_deletes() -> usize {
    200
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum NameStyleSpec {
    #[default]
    ByDate,
    Numeric4,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum CompressionSpec {
    #[default]
    None,
    Gzip,
    Zstd,
}

/// Parses a size like `"10MB"`, `"512 KiB"`, or a bare byte count.
pub fn parse_size(text: &str) -> Result<u64> {
    byte_unit::Byte::parse_str(text.trim(), true)
        .map(|b| b.as_u64())
        .map_err(|e| LogCoreError::Configuration(format!("invalid size '{text}': {e}")))
}

/// Loads a [`RotatingFileSinkConfig`] from a JSON document.
///
/// ```json
/// {
///   "dir": "/var/log/app",
///   "name": "app",
///   "gate": "Info+",
///   "name_style": "by_date",
///   "size_limit_bytes": 10485760,
///   "max_files": 30,
///   "compress_rotated": "gzip"
/// }
/// ```
pub fn load_rotating_file_sink_config(json: &str) -> Result<RotatingFileSinkConfig> {
    let spec: RotatingFileSinkSpec =
        serde_json::from_str(json).map_err(|e| LogCoreError::Configuration(e.to_string()))?;

    let gate = parse_gate(&spec.gate)?;

    Ok(RotatingFileSinkConfig {
        dir: spec.dir,
        name: spec.name,
        gate,
        name_style: match spec.name_style {
            NameStyleSpec::ByDate => NameStyle::ByDate,
            NameStyleSpec::Numeric4 => NameStyle::Numeric4,
        },
        purge_exclude_patterns: spec.purge_exclude_patterns,
        advance: AdvanceRules {
            size_limit: spec.size_limit_bytes,
            age_limit: spec.age_limit_secs.map(Duration::from_secs),
            test_period: Duration::from_secs(10),
        },
        purge: PurgeRules {
            max_files: spec.max_files,
            max_total_bytes: spec.max_total_bytes,
            max_age: spec.max_age_secs.map(Duration::from_secs),
        },
        create_dir_if_needed: spec.create_dir_if_needed,
        max_deletes_per_cleanup: spec.max_deletes_per_cleanup,
        compress_rotated: match spec.compress_rotated {
            CompressionSpec::None => CompressionKind::None,
            CompressionSpec::Gzip => CompressionKind::Gzip,
            CompressionSpec::Zstd => CompressionKind::Zstd,
        },
    })
}

pub fn load_rotating_file_sink_config_from_path(path: &Path) -> Result<RotatingFileSinkConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| LogCoreError::Configuration(e.to_string()))?;
    load_rotating_file_sink_config(&text)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueSinkSpec {
    pub capacity: usize,
    #[serde(default = "default_wakeup_threshold")]
    pub wakeup_threshold: usize,
}

fn default_wakeup_threshold() -> usize {
    100
}

pub fn load_queue_sink_config(json: &str) -> Result<QueueSinkSpec> {
    serde_json::from_str(json).map_err(|e| LogCoreError::Configuration(e.to_string()))
}

fn parse_gate(text: &str) -> Result<LogGate> {
    if let Some(severity) = Severity::from_name(text.trim_end_matches('+')) {
        return Ok(LogGate::new(severity));
    }
    crate::mask::MesgTypeMask::parse(text)
        .map(LogGate::from_mask)
        .map_err(|_| LogCoreError::InvalidGateText(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_minimal_config() {
        let json = r#"{"dir": "/tmp/logs", "name": "app"}"#;
        let config = load_rotating_file_sink_config(json).unwrap();
        assert_eq!(config.name, "app");
        assert_eq!(config.max_deletes_per_cleanup, 200);
        assert!(config.create_dir_if_needed);
    }

    #[test]
    fn loads_gate_and_rotation_fields() {
        let json = r#"{
            "dir": "/tmp/logs",
            "name": "app",
            "gate": "Error+",
            "name_style": "numeric4",
            "size_limit_bytes": 1048576,
            "max_files": 10,
            "compress_rotated": "gzip"
        }"#;
        let config = load_rotating_file_sink_config(json).unwrap();
        assert_eq!(config.name_style, NameStyle::Numeric4);
        assert_eq!(config.advance.size_limit, Some(1048576));
        assert_eq!(config.purge.max_files, Some(10));
        assert_eq!(config.compress_rotated, CompressionKind::Gzip);
        assert!(config.gate.allows(Severity::Error));
        assert!(!config.gate.allows(Severity::Info));
    }

    #[test]
    fn parses_human_size_strings() {
        assert_eq!(parse_size("10MB").unwrap(), 10_000_000);
        assert_eq!(parse_size("1KiB").unwrap(), 1024);
    }

    #[test]
    fn rejects_malformed_gate_text() {
        let json = r#"{"dir": "/tmp", "name": "app", "gate": "NotAThing"}"#;
        assert!(load_rotating_file_sink_config(json).is_err());
    }
}
