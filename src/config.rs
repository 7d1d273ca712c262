use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Highest volume accepted by the player.
pub const MAX_VOLUME: u16 = 150;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Lavalink
    pub lavalink_host: String,
    pub lavalink_port: u16,
    pub lavalink_password: String,
    pub lavalink_ssl: bool,

    // Audio
    pub default_volume: u16,
}

impl Config {
    /// Loads the configuration from the process environment (and `.env`).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `DISCORD_TOKEN` is the only required key; everything else falls back
    /// to the defaults in [`Config::default`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN must be set")?,
            command_prefix: var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            lavalink_host: var("LAVALINK_HOST").unwrap_or(defaults.lavalink_host),
            lavalink_port: match var("LAVALINK_PORT") {
                Some(port) => port
                    .trim()
                    .parse()
                    .with_context(|| format!("LAVALINK_PORT is not a port number: {port}"))?,
                None => defaults.lavalink_port,
            },
            lavalink_password: var("LAVALINK_PASSWORD").unwrap_or(defaults.lavalink_password),
            lavalink_ssl: match var("LAVALINK_SSL") {
                Some(flag) => flag
                    .trim()
                    .parse()
                    .with_context(|| format!("LAVALINK_SSL must be true or false, got {flag}"))?,
                None => defaults.lavalink_ssl,
            },

            default_volume: match var("DEFAULT_VOLUME") {
                Some(volume) => volume
                    .trim()
                    .parse()
                    .with_context(|| format!("DEFAULT_VOLUME is not a number: {volume}"))?,
                None => defaults.default_volume,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Default volume must be between 0 and 150
    /// - Command prefix must not be empty
    /// - Lavalink host and port must form a valid URL
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > MAX_VOLUME {
            anyhow::bail!(
                "Default volume must be between 0 and {}, got: {}",
                MAX_VOLUME,
                self.default_volume
            );
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        self.lavalink_url()?;

        Ok(())
    }

    /// Base URL of the Lavalink node, e.g. `http://127.0.0.1:2333`.
    pub fn lavalink_url(&self) -> Result<Url> {
        let scheme = if self.lavalink_ssl { "https" } else { "http" };
        Url::parse(&format!(
            "{}://{}:{}",
            scheme, self.lavalink_host, self.lavalink_port
        ))
        .with_context(|| format!("invalid Lavalink address {}:{}", self.lavalink_host, self.lavalink_port))
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and passwords are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix `{}`\n  \
            Lavalink: {}:{} (ssl={})\n  \
            Audio: default volume {}",
            self.command_prefix,
            self.lavalink_host,
            self.lavalink_port,
            self.lavalink_ssl,
            self.default_volume,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (el token no tiene valor por defecto)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            // Valores por defecto de Lavalink
            lavalink_host: "127.0.0.1".to_string(),
            lavalink_port: 2333,
            lavalink_password: "changeme".to_string(),
            lavalink_ssl: false,

            // Valores por defecto de audio
            default_volume: 50,
        }
    }
}
