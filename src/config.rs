use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_API_URL: &str =
    "https://dashscope-intl.aliyuncs.com/api/v1/services/aigc/text-generation/generation";
pub const DEFAULT_MODEL: &str = "qwen-plus";
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(360);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("POCKETBASE_TOKEN_SECRET is not set")]
    MissingTokenSecret,

    #[error("QWEN_API_KEY is not set")]
    MissingApiKey,

    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Process-wide settings, read once at startup and shared read-only.
///
/// The token secret and the upstream API key stay optional here so the
/// server can boot without them; the routes that need them answer 500
/// instead of silently falling back to a default.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    token_secret: Option<String>,
    api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                expected: "port number",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let upstream_timeout = match var("UPSTREAM_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::Invalid {
                    name: "UPSTREAM_TIMEOUT_SECS",
                    expected: "positive number of seconds",
                    value,
                })?,
            None => DEFAULT_UPSTREAM_TIMEOUT,
        };

        Ok(Config {
            host: var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            token_secret: var("POCKETBASE_TOKEN_SECRET"),
            api_key: var("QWEN_API_KEY"),
            api_url: var("QWEN_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: var("QWEN_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            upstream_timeout,
        })
    }

    pub fn token_secret(&self) -> Result<&str, ConfigError> {
        self.token_secret
            .as_deref()
            .ok_or(ConfigError::MissingTokenSecret)
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    #[cfg(test)]
    pub fn with_token_secret(mut self, secret: impl Into<String>) -> Self {
        self.token_secret = Some(secret.into());
        self
    }

    #[cfg(test)]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

// Hand-written so secrets never end up in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}
