use anyhow::{anyhow, bail, Result};
use tracing::{info, warn};

use crate::utils::rate::Rate;

use super::{
    entities::{Blackhole, Config, CONFIG_KEY, DEFAULT_RATE},
    store::{read_key, write_key, KeyValueStore},
};

/// Storage keys whose change means the configuration has to be reloaded.
pub const CONFIG_KEYS: [&str; 3] = [CONFIG_KEY, "blackholes", "rate"];

/// Loads the configuration. Missing or unreadable configuration falls back to defaults, the
/// tracker always gets something usable.
pub async fn load_config(store: &impl KeyValueStore) -> Config {
    let document = match store.get(&[CONFIG_KEY]).await {
        Ok(document) => document,
        Err(e) => {
            warn!("Failed to read configuration, using defaults {e:?}");
            return Config::default();
        }
    };

    match read_key::<Config>(&document, CONFIG_KEY) {
        Ok(Some(config)) => sanitize(config),
        Ok(None) => {
            info!("No saved configuration found, using defaults");
            Config::default()
        }
        Err(e) => {
            warn!("Saved configuration is malformed, using defaults {e:?}");
            Config::default()
        }
    }
}

fn sanitize(mut config: Config) -> Config {
    if Rate::new_opt(config.rate).is_none() {
        warn!("Saved rate {} is invalid, using {DEFAULT_RATE}", config.rate);
        config.rate = DEFAULT_RATE;
    }
    config
}

/// Persists the configuration. This is a user action, so failures are returned.
pub async fn save_config(store: &impl KeyValueStore, config: &Config) -> Result<()> {
    if Rate::new_opt(config.rate).is_none() {
        bail!("Rate {} must be a non-negative number", config.rate);
    }
    store
        .modify(|document| write_key(document, CONFIG_KEY, config))
        .await?;
    info!("Saved configuration with {} patterns", config.blackholes.len());
    Ok(())
}

impl Config {
    pub fn set_rate(&mut self, rate: Rate) {
        self.rate = *rate;
    }

    /// Adds a pattern. Blank patterns would match every page and are refused, patterns that
    /// aren't valid regular expressions are kept since the matcher skips them.
    pub fn add_pattern(&mut self, pattern: &str) -> Result<()> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            bail!("Pattern can't be empty");
        }
        if self.blackholes.iter().any(|b| b.url == pattern) {
            bail!("Pattern {pattern} is already tracked");
        }
        if let Err(e) = regex::Regex::new(pattern) {
            warn!("Pattern {pattern} is not a valid regular expression and will never match: {e}");
        }
        self.blackholes.push(Blackhole::new(pattern));
        Ok(())
    }

    pub fn remove_pattern(&mut self, pattern: &str) -> Result<()> {
        let position = self
            .blackholes
            .iter()
            .position(|b| b.url == pattern.trim())
            .ok_or_else(|| anyhow!("Pattern {pattern} is not tracked"))?;
        self.blackholes.remove(position);
        Ok(())
    }
}
