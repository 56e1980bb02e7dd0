//! YAML-backed service configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the server façade, loaded from a YAML file or built
/// in code. Everything has a usable default so tests and demos can run
/// with `ServiceConfig::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// API title reported by the root index.
    pub title: String,
    /// API description reported by the root index.
    pub description: String,
    /// Public base URL (e.g. `http://localhost:8080`). Link embedding only
    /// follows hrefs under this root; relative hrefs are always internal.
    pub root_url: String,
    /// Whether `_jsonp` wrapping is honored.
    pub jsonp_enabled: bool,
    /// Static API key for the sample header-based auth provider.
    pub api_key: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            title: "restgate".to_string(),
            description: String::new(),
            root_url: String::new(),
            jsonp_enabled: true,
            api_key: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: ServiceConfig =
            serde_yaml::from_str("title: Demo API\njsonp_enabled: false\n").unwrap();
        assert_eq!(config.title, "Demo API");
        assert!(!config.jsonp_enabled);
        assert!(config.api_key.is_none());
        assert_eq!(config.root_url, "");
    }
}
