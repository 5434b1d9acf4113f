use anyhow::{anyhow, Context, Result};
use chunkflow_code_chunker::{ProcessingConfig, ValidationIssue};
use std::path::Path;

/// CLI flags that override file settings
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub max_chunk_size: Option<usize>,
    pub min_chunk_size: Option<usize>,
    pub overlap: Option<usize>,
    pub concurrency: Option<usize>,
    pub memory_limit_mb: Option<u64>,
}

/// Start from a preset, or the defaults, then layer the file on top
pub fn load_config(path: Option<&Path>, preset: Option<&str>) -> Result<ProcessingConfig> {
    let base = match preset {
        Some(name) => ProcessingConfig::preset(name)
            .ok_or_else(|| anyhow!("Unknown preset '{name}' (expected default, embeddings or speed)"))?,
        None => ProcessingConfig::default(),
    };
    let Some(path) = path else {
        return Ok(base);
    };

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read config {}", path.display()))?;
    let value = parse_value(&bytes).with_context(|| format!("Failed to parse config {}", path.display()))?;
    let mut merged = serde_json::to_value(&base).context("Failed to serialize base config")?;
    merge_json(&mut merged, value);
    serde_json::from_value(merged).with_context(|| format!("Invalid config structure in {}", path.display()))
}

/// JSON first, TOML as the fallback
fn parse_value(bytes: &[u8]) -> Result<serde_json::Value> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(json_err) => {
            let utf8 = std::str::from_utf8(bytes).map_err(|err| anyhow!("{json_err}; {err}"))?;
            let toml_value: toml::Value = toml::from_str(utf8).map_err(|toml_err| {
                anyhow!("Config is not valid JSON or TOML ({json_err}); TOML parse error: {toml_err}")
            })?;
            serde_json::to_value(toml_value).map_err(|err| anyhow!("Failed to convert TOML config to JSON: {err}"))
        }
    }
}

fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

pub fn apply_overrides(config: &mut ProcessingConfig, overrides: &Overrides) {
    if let Some(max) = overrides.max_chunk_size {
        config.chunking.max_chunk_size = max;
    }
    if let Some(min) = overrides.min_chunk_size {
        config.chunking.min_chunk_size = min;
    }
    if let Some(overlap) = overrides.overlap {
        config.chunking.overlap_size = overlap;
    }
    if let Some(concurrency) = overrides.concurrency {
        config.performance.concurrency_limit = concurrency;
    }
    if let Some(limit) = overrides.memory_limit_mb {
        config.performance.memory_limit_mb = limit;
    }
}

pub fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {issue}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn json_config_overrides_only_given_fields() {
        let file = write_temp(".json", r#"{"chunking": {"max_chunk_size": 900}}"#);
        let config = load_config(Some(file.path()), None).unwrap();
        assert_eq!(config.chunking.max_chunk_size, 900);
        assert_eq!(config.chunking.min_chunk_size, ProcessingConfig::default().chunking.min_chunk_size);
    }

    #[test]
    fn toml_is_the_fallback() {
        let file = write_temp(".toml", "[guard]\nmax_errors = 9\n\n[performance]\nbatch_size = 7\n");
        let config = load_config(Some(file.path()), None).unwrap();
        assert_eq!(config.guard.max_errors, 9);
        assert_eq!(config.performance.batch_size, 7);
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let file = write_temp(".cfg", "{{{ not = [");
        let err = format!("{:#}", load_config(Some(file.path()), None).unwrap_err());
        assert!(err.contains("not valid JSON or TOML"), "{err}");
    }

    #[test]
    fn overrides_then_validation() {
        let mut config = load_config(None, Some("speed")).unwrap();
        apply_overrides(
            &mut config,
            &Overrides {
                max_chunk_size: Some(10),
                min_chunk_size: Some(20),
                ..Overrides::default()
            },
        );
        let issues = config.validate().unwrap_err();
        assert!(render_issues(&issues).contains("chunking.max_chunk_size"));
    }

    #[test]
    fn unknown_preset_is_an_error() {
        assert!(load_config(None, Some("turbo")).is_err());
    }
}
