//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::UpstreamManagerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<UpstreamManagerConfig, ConfigError> {
    let config: UpstreamManagerConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<UpstreamManagerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::op::Protocol;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [admin]
            api_key = "secret"

            [dynamic]
            tick_ms = 500

            [[upstreams]]
            name = "backends"
            dns_update_secs = 5
            state_file = "/tmp/backends.conf"
            servers = [
                { label = "10.0.0.1:80", weight = 2 },
                { label = "10.0.0.2:80", backup = true },
            ]

            [[upstreams]]
            name = "db"
            protocol = "stream"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.admin.api_key.as_deref(), Some("secret"));
        assert_eq!(config.dynamic.tick_ms, 500);
        assert_eq!(config.dynamic.reclaim_interval_ms, 1000);
        assert_eq!(config.upstreams.len(), 2);

        let backends = &config.upstreams[0];
        assert_eq!(backends.protocol, Protocol::Http);
        assert_eq!(backends.dns_update_secs, Some(5));
        assert_eq!(backends.servers[0].weight, 2);
        assert!(backends.servers[1].backup);
        assert_eq!(backends.servers[1].weight, 1);
        assert_eq!(config.upstreams[1].protocol, Protocol::Stream);
    }

    #[test]
    fn test_invalid_config_reports_validation() {
        let err = parse_config(
            r#"
            [[upstreams]]
            name = "web"
            dns_update_secs = 7200
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/upstreams.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
