use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
}

/// Reddit API credentials, read from the environment once at startup and
/// passed explicitly to the client.
#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    /// Load credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            username: required_env("REDDIT_USERNAME")?,
            password: required_env("REDDIT_PASSWORD")?,
            client_id: required_env("REDDIT_CLIENT_ID")?,
            client_secret: required_env("REDDIT_CLIENT_SECRET")?,
        })
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingEnvVar(name))
}
