//! Server configuration, loaded from TOML with CLI overrides on top.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::origin::OriginPolicy;

/// Top-level config file contents. Every field is optional; the CLI fills
/// in whatever the file leaves out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: Option<ServerConfig>,
    pub tls: Option<TlsConfig>,
    pub users: Option<UsersConfig>,
}

/// `[server]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind address.
    pub bind: Option<SocketAddr>,
    /// HTTPS bind address (requires a `[tls]` section).
    pub tls_bind: Option<SocketAddr>,
    /// Domain or host name advertised to browsers.
    pub hostname: Option<String>,
    /// Policy for mismatched WebSocket Origin headers.
    pub origin_policy: Option<OriginPolicy>,
    /// Seconds a synchronous query waits for the browser before failing.
    pub query_timeout_secs: Option<u64>,
}

/// `[tls]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// `[users]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersConfig {
    /// Directory for account records.
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load config from a TOML file path. Returns None if the file doesn't
    /// exist.
    pub fn load(path: &std::path::Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }
}

/// Errors that can occur when loading config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse config {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.server.is_none());
        assert!(config.tls.is_none());
        assert!(config.users.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:8080"
            tls_bind = "0.0.0.0:8090"
            hostname = "term.example.com"
            origin_policy = "enforce"
            query_timeout_secs = 10

            [tls]
            cert = "/etc/sockterm/cert.pem"
            key = "/etc/sockterm/key.pem"

            [users]
            dir = "/var/lib/sockterm/users"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let server = config.server.unwrap();
        assert_eq!(server.bind.unwrap().port(), 8080);
        assert_eq!(server.hostname.as_deref(), Some("term.example.com"));
        assert_eq!(server.origin_policy, Some(OriginPolicy::Enforce));
        assert_eq!(server.query_timeout_secs, Some(10));
        assert_eq!(
            config.tls.unwrap().cert,
            PathBuf::from("/etc/sockterm/cert.pem")
        );
        assert_eq!(
            config.users.unwrap().dir.unwrap(),
            PathBuf::from("/var/lib/sockterm/users")
        );
    }

    #[test]
    fn load_missing_file_is_none() {
        let loaded = Config::load(std::path::Path::new("/nonexistent/sockterm.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn load_invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sockterm.toml");
        std::fs::write(&path, "not [valid toml").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ParseFailed(_, _))
        ));
    }

    #[test]
    fn load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sockterm.toml");
        std::fs::write(&path, "[server]\nhostname = \"myhost\"\n").unwrap();
        let config = Config::load(&path).unwrap().unwrap();
        assert_eq!(config.server.unwrap().hostname.as_deref(), Some("myhost"));
    }
}
