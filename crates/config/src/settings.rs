// Server settings
//
// Built once at startup and passed by reference into the transport layer.
// The engine itself takes no configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP listener binds to.
    #[serde(rename = "server.bindAddr")]
    pub bind_addr: String,

    /// Origins allowed by the CORS policy.
    #[serde(rename = "server.allowedOrigins")]
    pub allowed_origins: Vec<String>,

    /// Maximum accepted request body, in bytes.
    #[serde(rename = "server.maxBodyBytes")]
    pub max_body_bytes: usize,

    /// Worker threads running batch jobs.
    #[serde(rename = "pool.workers")]
    pub workers: usize,

    /// Jobs accepted into the queue beyond the ones being processed.
    /// A full queue rejects the request instead of growing without bound.
    #[serde(rename = "pool.queueDepth")]
    pub queue_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            allowed_origins: vec![
                "http://localhost:4200".to_string(),
                "http://127.0.0.1:4200".to_string(),
            ],
            max_body_bytes: 100 * 1024 * 1024,
            workers: 4,
            queue_depth: 8,
        }
    }
}

impl Settings {
    /// Default settings file location.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("monxml").join("settings.json"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file is missing.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. A missing or unparseable file yields the
    /// defaults; a parse failure is logged, not fatal.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Invalid settings file {}: {} (using defaults)", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr, "0.0.0.0:8000");
        assert!(settings.workers > 0);
        assert!(settings.queue_depth > 0);
        assert!(!settings.allowed_origins.is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "server.bindAddr": "127.0.0.1:9000", "pool.workers": 2 }"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.bind_addr, "127.0.0.1:9000");
        assert_eq!(settings.workers, 2);
        // Untouched fields keep their defaults.
        assert_eq!(settings.queue_depth, Settings::default().queue_depth);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("nope.json"));
        assert_eq!(settings.bind_addr, Settings::default().bind_addr);
    }

    #[test]
    fn test_invalid_json_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.workers, Settings::default().workers);
    }

    #[test]
    fn test_roundtrip() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bind_addr, settings.bind_addr);
        assert_eq!(back.max_body_bytes, settings.max_body_bytes);
    }
}
