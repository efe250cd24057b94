use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_API_URL: &str = "RECON_API_URL";
pub const ENV_API_TOKEN: &str = "RECON_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Client settings, read from `recon.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub api_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            api_token: None,
            poll_interval_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl ReconConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<config dir>/recon/recon.toml` on this platform.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "recon")
            .map(|dirs| dirs.config_dir().join("recon.toml"))
    }

    /// An explicit path must exist; the default location is optional.
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.api_token = Some(token);
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_backend_conventions() {
        let c = ReconConfig::default();
        assert_eq!(c.api_base_url, "http://localhost:5000");
        assert_eq!(c.poll_interval(), Duration::from_secs(1));
        assert_eq!(c.request_timeout(), Duration::from_secs(30));
        assert!(c.api_token.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ReconConfig::from_toml("api_base_url = \"https://recon.example.com\"\n").unwrap();
        assert_eq!(c.api_base_url, "https://recon.example.com");
        assert_eq!(c.poll_interval_ms, 1000);
    }

    #[test]
    fn full_toml() {
        let c = ReconConfig::from_toml(
            r#"
api_base_url = "http://10.0.0.5:8080"
api_token = "secret"
poll_interval_ms = 250
request_timeout_secs = 5
"#,
        )
        .unwrap();
        assert_eq!(c.api_token.as_deref(), Some("secret"));
        assert_eq!(c.poll_interval(), Duration::from_millis(250));
        assert_eq!(c.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let c = ReconConfig {
            poll_interval_ms: 0,
            ..ReconConfig::default()
        };
        assert_eq!(c.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "poll_interval_ms = 500").unwrap();
        let c = ReconConfig::from_file(f.path()).unwrap();
        assert_eq!(c.poll_interval_ms, 500);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReconConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "poll_interval_ms = \"soon\"").unwrap();
        let err = ReconConfig::from_file(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn env_overrides_win() {
        let mut c = ReconConfig::default();
        c.apply_overrides(|key| match key {
            ENV_API_URL => Some("https://override.example.com".to_string()),
            ENV_API_TOKEN => Some("tok".to_string()),
            _ => None,
        });
        assert_eq!(c.api_base_url, "https://override.example.com");
        assert_eq!(c.api_token.as_deref(), Some("tok"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut c = ReconConfig::default();
        c.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(c, ReconConfig::default());
    }
}
