//! Configuration loading for Vigil
//!
//! Provides two-tier configuration resolution with ENV → TOML priority.
//! The model API key is the only secret; everything else has compiled
//! defaults suitable for a local deployment.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable holding the model API key
pub const API_KEY_ENV: &str = "VIGIL_GEMINI_API_KEY";

/// Raw TOML configuration file contents
///
/// All fields optional; missing fields fall back to defaults in
/// [`VigilConfig::resolve`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Gemini API key (prefer the environment variable for secrets)
    pub gemini_api_key: Option<String>,
    /// Directory containing per-zone frame subdirectories
    pub frames_dir: Option<PathBuf>,
    /// Directory containing field report text files
    pub reports_dir: Option<PathBuf>,
    /// Monitored zone names, in display order
    pub zones: Option<Vec<String>>,
    /// Maximum frames sampled per zone per run
    pub max_frames_per_zone: Option<usize>,
    /// HTTP bind address
    pub bind_addr: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct VigilConfig {
    /// Gemini API key, if configured anywhere
    pub gemini_api_key: Option<String>,
    pub frames_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub zones: Vec<String>,
    pub max_frames_per_zone: usize,
    pub bind_addr: String,
}

impl VigilConfig {
    /// Resolve final configuration from a TOML config plus environment
    ///
    /// **Priority:** ENV → TOML → compiled default. The API key is the
    /// only value read from the environment.
    pub fn resolve(toml_config: &TomlConfig) -> Self {
        let mut sources = Vec::new();

        let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| is_valid_key(k));
        if env_key.is_some() {
            sources.push("environment");
        }

        let toml_key = toml_config
            .gemini_api_key
            .clone()
            .filter(|k| is_valid_key(k));
        if toml_key.is_some() {
            sources.push("TOML");
        }

        if sources.len() > 1 {
            warn!(
                "Gemini API key found in multiple sources: {}. Using environment (highest priority).",
                sources.join(", ")
            );
        }

        let gemini_api_key = match (env_key, toml_key) {
            (Some(key), _) => {
                info!("Gemini API key loaded from environment variable");
                Some(key)
            }
            (None, Some(key)) => {
                info!("Gemini API key loaded from TOML config");
                Some(key)
            }
            (None, None) => {
                warn!(
                    "Gemini API key not configured. Set {} or gemini_api_key in {}",
                    API_KEY_ENV,
                    default_config_path().display()
                );
                None
            }
        };

        Self {
            gemini_api_key,
            frames_dir: toml_config
                .frames_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("frames")),
            reports_dir: toml_config
                .reports_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("reports")),
            zones: toml_config.zones.clone().unwrap_or_else(default_zones),
            max_frames_per_zone: toml_config.max_frames_per_zone.unwrap_or(10),
            bind_addr: toml_config
                .bind_addr
                .clone()
                .unwrap_or_else(|| "127.0.0.1:5810".to_string()),
        }
    }

    /// Whether the external model backend can be reached at all
    pub fn model_configured(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}

/// Default monitored zones when none are configured
pub fn default_zones() -> Vec<String> {
    vec![
        "Zone A".to_string(),
        "Zone B".to_string(),
        "Zone C".to_string(),
        "Zone D".to_string(),
    ]
}

/// Validate an API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Default configuration file path for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("vigil").join("vigil.toml"))
        .unwrap_or_else(|| PathBuf::from("vigil.toml"))
}

/// Load TOML configuration from the given path
///
/// A missing file is not an error; it yields the default (empty) config.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc123"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_toml_config(Path::new("/nonexistent/vigil.toml")).unwrap();
        assert!(config.gemini_api_key.is_none());
        assert!(config.zones.is_none());
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let resolved = VigilConfig::resolve(&TomlConfig::default());
        assert_eq!(resolved.zones.len(), 4);
        assert_eq!(resolved.max_frames_per_zone, 10);
        assert_eq!(resolved.bind_addr, "127.0.0.1:5810");
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_str = r#"
            gemini_api_key = "key"
            zones = ["Main Stage", "Food Court"]
            max_frames_per_zone = 5
        "#;
        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.zones.as_ref().unwrap().len(), 2);
        assert_eq!(config.max_frames_per_zone, Some(5));
    }
}
