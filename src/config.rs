use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AlbumRelayError, Result};

/// Default inactivity window before an album is flushed.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

const WAIT_SECONDS_VAR: &str = "ALBUM_BUFFER_WAIT_SECONDS";
const ENABLED_VAR: &str = "ALBUM_BUFFER_ENABLED";

/// Configuration for the album buffer.
///
/// Read once when the buffer is initialized and never changed afterwards.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AlbumBufferConfig {
    /// How long an album may stay idle before it is flushed
    pub wait: Duration,

    /// Whether media albums should be grouped at all
    pub enabled: bool,
}

impl Default for AlbumBufferConfig {
    fn default() -> Self {
        Self {
            wait: DEFAULT_WAIT,
            enabled: true,
        }
    }
}

impl AlbumBufferConfig {
    /// Loads the configuration from the process environment.
    ///
    /// A `.env` file in the working directory is honoured if present. Unset
    /// variables fall back to the defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is the normal case in production.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(WAIT_SECONDS_VAR) {
            let seconds = raw.trim().parse::<u64>().map_err(|_| {
                AlbumRelayError::Configuration(format!(
                    "{WAIT_SECONDS_VAR} must be a whole number of seconds, got {raw:?}"
                ))
            })?;
            config.wait = Duration::from_secs(seconds);
        }

        if let Some(raw) = lookup(ENABLED_VAR) {
            config.enabled = parse_flag(&raw).ok_or_else(|| {
                AlbumRelayError::Configuration(format!(
                    "{ENABLED_VAR} must be a boolean, got {raw:?}"
                ))
            })?;
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Process level configuration for the relay binary.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// Configuration for the album buffer
    pub buffer: AlbumBufferConfig,

    /// Webhook used when a session does not carry its own
    pub webhook_url: Option<String>,
}

impl RelayConfig {
    pub fn new(logs_dir: &Path, buffer: AlbumBufferConfig) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };

        Self {
            logs_dir: logs_dir.join(env_suffix),
            buffer,
            webhook_url: None,
        }
    }

    pub fn with_webhook_url(mut self, webhook_url: Option<String>) -> Self {
        self.webhook_url = webhook_url;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AlbumBufferConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, AlbumBufferConfig::default());
        assert_eq!(config.wait, Duration::from_secs(5));
        assert!(config.enabled);
    }

    #[test]
    fn test_reads_wait_and_flag() {
        let config = AlbumBufferConfig::from_lookup(lookup_from(&[
            ("ALBUM_BUFFER_WAIT_SECONDS", " 12 "),
            ("ALBUM_BUFFER_ENABLED", "No"),
        ]))
        .unwrap();

        assert_eq!(config.wait, Duration::from_secs(12));
        assert!(!config.enabled);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let res = AlbumBufferConfig::from_lookup(lookup_from(&[(
            "ALBUM_BUFFER_WAIT_SECONDS",
            "-3",
        )]));
        assert!(matches!(res, Err(AlbumRelayError::Configuration(_))));

        let res =
            AlbumBufferConfig::from_lookup(lookup_from(&[("ALBUM_BUFFER_ENABLED", "maybe")]));
        assert!(matches!(res, Err(AlbumRelayError::Configuration(_))));
    }

    #[test]
    fn test_relay_config_suffixes_logs_dir() {
        let config = RelayConfig::new(Path::new("/tmp/logs"), AlbumBufferConfig::default())
            .with_webhook_url(Some("http://localhost/hook".to_string()));

        let suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };
        assert_eq!(config.logs_dir, Path::new("/tmp/logs").join(suffix));
        assert_eq!(config.webhook_url.as_deref(), Some("http://localhost/hook"));
    }
}
