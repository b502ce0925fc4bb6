use std::{collections::HashMap, fs, net::SocketAddr};

use anyhow::{bail, Context};
use url::Url;

pub const SETTINGS_FILE: &str = "relay.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    pub api_key: String,
    pub host: String,
    pub directory_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8005".into(),
            api_key: String::new(),
            host: String::new(),
            directory_url: "https://console.jumpcloud.com".into(),
        }
    }
}

/// Validated settings the relay actually runs with.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub api_key: String,
    pub proxy_host: Url,
    pub directory_url: Url,
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then the environment. `APP__*`
/// variables win over their plain counterparts.
pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.bind_addr = v.clone();
            }
            if let Some(v) = file_cfg.get("api_key") {
                settings.api_key = v.clone();
            }
            if let Some(v) = file_cfg.get("host") {
                settings.host = v.clone();
            }
            if let Some(v) = file_cfg.get("directory_url") {
                settings.directory_url = v.clone();
            }
        }
    }

    for (plain, scoped, slot) in [
        ("RELAY_BIND", "APP__BIND_ADDR", &mut settings.bind_addr),
        ("API_KEY", "APP__API_KEY", &mut settings.api_key),
        ("HOST", "APP__HOST", &mut settings.host),
        ("DIRECTORY_URL", "APP__DIRECTORY_URL", &mut settings.directory_url),
    ] {
        if let Some(v) = env(plain) {
            *slot = v;
        }
        if let Some(v) = env(scoped) {
            *slot = v;
        }
    }

    settings
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<RelayConfig> {
        let proxy_host = Url::parse(self.host.trim())
            .with_context(|| format!("please enter a valid URL for HOST (got '{}')", self.host))?;
        if self.api_key.trim().is_empty() {
            bail!("please enter a value for API_KEY");
        }
        let directory_url = Url::parse(self.directory_url.trim()).with_context(|| {
            format!("invalid DIRECTORY_URL '{}'", self.directory_url)
        })?;
        let bind_addr = self
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.bind_addr))?;

        Ok(RelayConfig {
            bind_addr,
            api_key: self.api_key.trim().to_string(),
            proxy_host,
            directory_url,
        })
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
