//! # Configuration
//!
//! Layered configuration: defaults, then an optional `qdms.toml` file,
//! then `QDMS_API_*` environment variables. CLI flags override all of it
//! at the call site.

use qdms_core::QdmsError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Server configuration as loaded from file and environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bind host for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Path to the redb database file.
    pub database: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database: PathBuf::from("qdms.redb"),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, QdmsError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| QdmsError::IoError(e.to_string()))?;
                toml::from_str(&raw)
                    .map_err(|e| QdmsError::InvalidInput(format!("invalid config file: {e}")))?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `QDMS_API_HOST`, `QDMS_API_PORT`, and `QDMS_API_DATABASE`.
    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("QDMS_API_HOST") {
            if !host.is_empty() {
                self.host = host;
            }
        }
        if let Ok(port) = std::env::var("QDMS_API_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }
        if let Ok(database) = std::env::var("QDMS_API_DATABASE") {
            if !database.is_empty() {
                self.database = PathBuf::from(database);
            }
        }
    }

    /// The bind address string, e.g. `127.0.0.1:8080`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = AppConfig::load(None).expect("load");
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn file_values_are_applied() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("qdms.toml");
        std::fs::write(&path, "host = \"0.0.0.0\"\nport = 9000\n").expect("write");
        let config = AppConfig::load(Some(&path)).expect("load");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.database, PathBuf::from("qdms.redb"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/qdms.toml"))).expect("load");
        assert_eq!(config.port, 8080);
    }
}
