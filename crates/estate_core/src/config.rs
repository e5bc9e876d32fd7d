use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::paths::{config_json_path, load_json, session_json_path};

pub const DEFAULT_API_BASE: &str = "http://localhost:3000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub http_proxy: String,
    #[serde(default)]
    pub https_proxy: String,
    #[serde(default)]
    pub http_proxy_auth: Option<ProxyAuth>,
    #[serde(default)]
    pub https_proxy_auth: Option<ProxyAuth>,
    /// Overrides the persisted session location (defaults to ~/.estate/auth.json)
    #[serde(default)]
    pub session_file: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

const CONFIG_FILE_PATH: &str = "config.toml";

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base: default_api_base(),
            http_proxy: String::new(),
            https_proxy: String::new(),
            http_proxy_auth: None,
            https_proxy_auth: None,
            session_file: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Resolves config from ~/.estate/config.json, then ./config.toml, then the environment.
    pub fn new() -> Self {
        let mut config = Config::default();

        let mut loaded = false;
        let json_path = config_json_path();
        if json_path.exists() {
            match load_json::<Config>(&json_path) {
                Ok(file_config) => {
                    config = file_config;
                    loaded = true;
                }
                Err(err) => log::warn!("Ignoring config: {err}"),
            }
        }

        if !loaded && std::path::Path::new(CONFIG_FILE_PATH).exists() {
            if let Ok(content) = std::fs::read_to_string(CONFIG_FILE_PATH) {
                match toml::from_str::<Config>(&content) {
                    Ok(file_config) => config = file_config,
                    Err(err) => log::warn!("Ignoring {CONFIG_FILE_PATH}: {err}"),
                }
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("ESTATE_API_URL") {
            self.api_base = api_base;
        }
        if let Some(http_proxy) = lookup("HTTP_PROXY") {
            self.http_proxy = http_proxy;
        }
        if let Some(https_proxy) = lookup("HTTPS_PROXY") {
            self.https_proxy = https_proxy;
        }
        if let Some(session_file) = lookup("ESTATE_SESSION_FILE") {
            self.session_file = Some(PathBuf::from(session_file));
        }
        if let Some(timeout) = lookup("ESTATE_REQUEST_TIMEOUT") {
            match timeout.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => log::warn!("Ignoring invalid ESTATE_REQUEST_TIMEOUT value {timeout:?}"),
            }
        }
    }

    /// API base without a trailing slash, ready for `format!("{base}{path}")`.
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    pub fn session_path(&self) -> PathBuf {
        self.session_file.clone().unwrap_or_else(session_json_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup_from(&[
            ("ESTATE_API_URL", "https://deals.example.com/"),
            ("HTTPS_PROXY", "http://proxy:8080"),
            ("ESTATE_SESSION_FILE", "/tmp/session.json"),
            ("ESTATE_REQUEST_TIMEOUT", "5"),
        ]));

        assert_eq!(config.api_base(), "https://deals.example.com");
        assert_eq!(config.https_proxy, "http://proxy:8080");
        assert!(config.http_proxy.is_empty());
        assert_eq!(config.session_path(), PathBuf::from("/tmp/session.json"));
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn invalid_timeout_is_ignored() {
        let mut config = Config::default();
        for value in ["0", "soon", ""] {
            config.apply_env_overrides(lookup_from(&[("ESTATE_REQUEST_TIMEOUT", value)]));
            assert_eq!(
                config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS,
                "value {value:?} should be ignored"
            );
        }
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: Config = toml::from_str(r#"http_proxy = "http://corp:3128""#).expect("toml");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.http_proxy, "http://corp:3128");
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(config.session_file.is_none());
    }
}
