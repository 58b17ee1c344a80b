//! Client configuration

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7356;

/// Connection settings, loadable from a TOML file.
///
/// ```toml
/// host = "192.168.1.20"
/// port = 7356
/// command_timeout_ms = 1000
/// connect_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub command_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            command_timeout_ms: 1000,
            connect_timeout_ms: 5000,
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7356);
        assert_eq!(config.command_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ClientConfig::from_toml("host = \"sdr.local\"\n").unwrap();
        assert_eq!(config.host, "sdr.local");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.connect_timeout_ms, 5000);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = ClientConfig::from_toml("hots = \"typo\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 7357\ncommand_timeout_ms = 250").unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 7357);
        assert_eq!(config.command_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file() {
        let err = ClientConfig::from_file("/nonexistent/gqrx.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
