//! Configuration for document codec, merge, and storage settings.
//!
//! Load order: `.scenelib/config.toml` → environment variables → defaults.

use crate::codec::DEFAULT_MAX_DEPTH;
use crate::merge::MergePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub codec: CodecConfig,
    pub merge: MergeConfig,
    pub storage: StorageConfig,
}

/// Document export/import configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum nesting of inlined library sources, scenes, grids, and
    /// overlays before a walk is aborted with `CycleDepthExceeded`.
    pub max_depth: usize,
}

/// Merge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Policy used by `import` when the caller does not pick one.
    pub default_policy: MergePolicy,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Pretty-print JSON on write.
    pub pretty: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

/// Helper to parse an env var and apply it to a config field.
fn env_override<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(n) = v.parse()
    {
        *target = n;
    }
}

impl StoreConfig {
    /// Load config from `.scenelib/config.toml` in the project root, with env var overrides.
    /// Falls back to defaults if no config file exists.
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(".scenelib").join("config.toml");

        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("failed to parse {}", config_path.display()))?
        } else {
            Self::default()
        };

        env_override("SCENELIB_MAX_DEPTH", &mut config.codec.max_depth);
        env_override("SCENELIB_MERGE_POLICY", &mut config.merge.default_policy);
        env_override("SCENELIB_PRETTY", &mut config.storage.pretty);

        if config.codec.max_depth == 0 {
            anyhow::bail!("codec.max_depth must be at least 1");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.codec.max_depth, 32);
        assert_eq!(config.merge.default_policy, MergePolicy::ExactEquality);
        assert!(config.storage.pretty);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[merge]
default_policy = "business_key"

[storage]
pretty = false
"#;
        let config: StoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.merge.default_policy, MergePolicy::BusinessKey);
        assert!(!config.storage.pretty);
        // Defaults for unspecified fields
        assert_eq!(config.codec.max_depth, 32);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let config = StoreConfig::load(Path::new("/nonexistent/path")).unwrap();
        assert_eq!(config.codec.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_load_rejects_zero_depth() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".scenelib");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[codec]\nmax_depth = 0\n").unwrap();

        let err = StoreConfig::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("max_depth"));
    }

    #[test]
    fn test_load_reports_bad_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".scenelib");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[merge]\ndefault_policy = \"fuzzy\"\n").unwrap();

        assert!(StoreConfig::load(tmp.path()).is_err());
    }
}
