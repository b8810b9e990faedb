use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Base of the web front end, used to build share links.
    #[serde(default)]
    pub share_base_url: Option<String>,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            share_base_url: None,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: ClientConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            anyhow::bail!("server_url must be an http(s) URL: {}", self.server_url);
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if let Some(base) = &self.share_base_url {
            if base.is_empty() {
                anyhow::bail!("share_base_url must not be empty when set");
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let toml_str = r#"
server_url = "https://drop.example"
poll_interval_secs = 2
share_base_url = "https://drop.example"
"#;
        let config: ClientConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.share_base_url.as_deref(), Some("https://drop.example"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.poll_interval_secs, 5);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config: ClientConfig = toml::from_str("poll_interval_secs = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_server_rejected() {
        let config: ClientConfig = toml::from_str(r#"server_url = "ftp://host""#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"server_url = "http://10.0.0.2:3000""#).unwrap();

        let config = ClientConfig::load(f.path()).unwrap();
        assert_eq!(config.server_url, "http://10.0.0.2:3000");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ClientConfig::load(&dir.path().join("absent.toml")).is_err());
    }
}
