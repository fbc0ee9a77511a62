//! Configuration management for the DeployKit server
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Key clients must send as `Authorization: APIKey <key>`
    pub api_key: String,

    /// Storage root holding one directory per project
    pub app_path: PathBuf,

    /// Maximum number of entries returned by a listing
    pub max_deployments: usize,

    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            api_key: lookup("API_KEY").unwrap_or_default().trim().to_string(),

            app_path: var("APP_PATH", "./data").into(),

            max_deployments: var("MAX_DEPLOYMENTS", "500")
                .parse()
                .context("Invalid MAX_DEPLOYMENTS")?,

            api_host: var("API_HOST", "0.0.0.0"),

            api_port: var("API_PORT", "8000")
                .parse()
                .context("Invalid API_PORT")?,

            max_upload_bytes: var("MAX_UPLOAD_BYTES", "536870912")
                .parse()
                .context("Invalid MAX_UPLOAD_BYTES")?,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            anyhow::bail!("API_KEY is not set or empty");
        }

        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.max_deployments == 0 {
            anyhow::bail!("MAX_DEPLOYMENTS must be greater than 0");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    /// Ensure the storage root exists
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.app_path).with_context(|| {
            format!(
                "Failed to create storage directory: {}",
                self.app_path.display()
            )
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"[REDACTED]")
            .field("app_path", &self.app_path)
            .field("max_deployments", &self.max_deployments)
            .field("api_host", &self.api_host)
            .field("api_port", &self.api_port)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup(&[("API_KEY", "secret")])).unwrap();

        assert_eq!(config.api_key, "secret");
        assert_eq!(config.app_path, PathBuf::from("./data"));
        assert_eq!(config.max_deployments, 500);
        assert_eq!(config.api_address(), "0.0.0.0:8000");
        assert_eq!(config.max_upload_bytes, 512 * 1024 * 1024);
    }

    #[test]
    fn test_api_key_required() {
        for vars in [&[][..], &[("API_KEY", "   ")][..]] {
            let result = Config::from_lookup(lookup(vars));
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("API_KEY is not set or empty"));
        }
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("API_KEY", " padded "),
            ("APP_PATH", "/srv/sites"),
            ("MAX_DEPLOYMENTS", "20"),
            ("API_HOST", "127.0.0.1"),
            ("API_PORT", "9000"),
        ]))
        .unwrap();

        assert_eq!(config.api_key, "padded");
        assert_eq!(config.app_path, PathBuf::from("/srv/sites"));
        assert_eq!(config.max_deployments, 20);
        assert_eq!(config.api_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_numbers() {
        let bad_port = Config::from_lookup(lookup(&[("API_KEY", "k"), ("API_PORT", "http")]));
        assert!(bad_port.unwrap_err().to_string().contains("Invalid API_PORT"));

        let zero_cap = Config::from_lookup(lookup(&[("API_KEY", "k"), ("MAX_DEPLOYMENTS", "0")]));
        assert!(zero_cap
            .unwrap_err()
            .to_string()
            .contains("MAX_DEPLOYMENTS must be greater than 0"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = Config::from_lookup(lookup(&[("API_KEY", "hunter2")])).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
