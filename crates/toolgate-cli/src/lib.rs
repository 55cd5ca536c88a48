//! # toolgate-cli: Command-Line Tools for toolgate
//!
//! Offline tooling for policy authors and operators.
//!
//! ## Subcommands
//!
//! - `toolgate validate`: Check policy documents against the schema and
//!   load-time rules.
//! - `toolgate diff`: Shallow diff of two policy documents.
//! - `toolgate evaluate`: Run one decision against a policy file.
//! - `toolgate hash`: Content hash of an entity's fields.
//!
//! Policy and config files are JSON, or YAML when the extension is `.yaml`
//! or `.yml`.
//!
//! ```bash
//! toolgate validate policies/posts.create.yaml
//! toolgate diff old.json new.json
//! toolgate evaluate --policy posts.yaml --tool posts.create --fields '{"title":"x"}'
//! ```

pub mod diff;
pub mod evaluate;
pub mod hash;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use toolgate_core::GateConfig;
use toolgate_policy::PolicyDocument;

/// Whether `path` should be parsed as YAML.
pub fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("yaml" | "yml")
    )
}

/// Read and deserialize a JSON or YAML file.
pub fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if is_yaml(path) {
        serde_yaml::from_str(&text).with_context(|| format!("invalid YAML in {}", path.display()))
    } else {
        serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
    }
}

/// Load and validate a policy document.
pub fn load_policy_file(path: &Path) -> Result<PolicyDocument> {
    let value: serde_json::Value = read_structured(path)?;
    PolicyDocument::from_value(value)
        .with_context(|| format!("invalid policy document {}", path.display()))
}

/// Load engine configuration from `path`, or from the environment when no
/// path is given.
pub fn load_config(path: Option<&Path>) -> Result<GateConfig> {
    match path {
        Some(p) => read_structured(p),
        None => GateConfig::from_env().context("invalid configuration in environment"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use toolgate_core::StoreFailureMode;

    fn write_temp(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_json_policy() {
        let f = write_temp(".json", r#"{"rate_limits": {"per_hour": 5}}"#);
        let doc = load_policy_file(f.path()).unwrap();
        assert_eq!(doc.rate_limits.unwrap().per_hour, Some(5));
    }

    #[test]
    fn loads_yaml_policy() {
        let f = write_temp(
            ".yaml",
            concat!(
                "time_windows:\n",
                "  allowed_hours: [9, 10]\n",
                "  blackout_windows:\n",
                "    - start: \"22:00\"\n",
                "      end: \"06:00\"\n",
            ),
        );
        let doc = load_policy_file(f.path()).unwrap();
        let tw = doc.time_windows.unwrap();
        assert_eq!(tw.allowed_hours, vec![9, 10]);
        assert_eq!(tw.blackout_windows[0].end, "06:00");
    }

    #[test]
    fn rejects_invalid_policy() {
        let f = write_temp(".json", r#"{"time_windows": {"allowed_days": [9]}}"#);
        let err = load_policy_file(f.path()).unwrap_err();
        assert!(format!("{err:#}").contains("weekday"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_policy_file(Path::new("/nonexistent/policy.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/policy.json"));
    }

    #[test]
    fn loads_config_file() {
        let f = write_temp(".yml", "store_failure_mode: open\nstrict_audit: true\n");
        let cfg = load_config(Some(f.path())).unwrap();
        assert_eq!(cfg.store_failure_mode, StoreFailureMode::Open);
        assert!(cfg.strict_audit);
    }

    #[test]
    fn yaml_detection() {
        assert!(is_yaml(Path::new("a.YAML")));
        assert!(is_yaml(Path::new("a.yml")));
        assert!(!is_yaml(Path::new("a.json")));
        assert!(!is_yaml(Path::new("yaml")));
    }
}
