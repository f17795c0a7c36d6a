use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::ConfigError;
use crate::generative::{GenerativePolicy, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::rule::{default_stress_keywords, LocalClock, RulePolicy};

pub const DEFAULT_CONFIG_PATH: &str = "./configs/companion.yml";
const FEEDBACK_LOG_FILE: &str = "feedback.log";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

const fn default_timeout_ms() -> u64 {
    10_000
}

fn default_listen_addr() -> String {
    "127.0.0.1:8788".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerativeConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Active policy name; empty or absent selects the generative policy.
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub generative: GenerativeConfig,
    #[serde(default = "default_stress_keywords")]
    pub stress_keywords: Vec<String>,
    /// Fixed offset for the rule policy's hour-of-day; host zone if unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            policy: None,
            generative: GenerativeConfig::default(),
            stress_keywords: default_stress_keywords(),
            utc_offset_minutes: None,
            data_dir: None,
            listen_addr: default_listen_addr(),
        }
    }
}

impl ServiceConfig {
    /// Loads `COMPANION_CONFIG` (or the default path) and applies environment
    /// overrides on top.
    pub fn from_env() -> Self {
        let path =
            std::env::var("COMPANION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = load_config(&path);
        cfg.apply_env_overrides();
        cfg
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup; empty values are ignored.
    pub fn apply_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(policy) = get("COMPANION_POLICY") {
            self.policy = Some(policy);
        }
        if let Some(endpoint) = get("OLLAMA_URL") {
            self.generative.endpoint = endpoint;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            self.generative.model = model;
        }
        if let Some(raw) = get("COMPANION_GENERATE_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.generative.timeout_ms = ms,
                _ => tracing::warn!(
                    "Invalid value for COMPANION_GENERATE_TIMEOUT_MS='{}' – keeping {}",
                    raw,
                    self.generative.timeout_ms
                ),
            }
        }
        if let Some(raw) = get("COMPANION_UTC_OFFSET_MINUTES") {
            match raw.trim().parse::<i32>() {
                Ok(minutes) => self.utc_offset_minutes = Some(minutes),
                Err(_) => tracing::warn!(
                    "Invalid value for COMPANION_UTC_OFFSET_MINUTES='{}' – using host time zone",
                    raw
                ),
            }
        }
        if let Some(dir) = get("COMPANION_DATA") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(addr) = get("COMPANION_ADDR") {
            self.listen_addr = addr;
        }
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_millis(self.generative.timeout_ms)
    }

    pub fn clock(&self) -> LocalClock {
        match self.utc_offset_minutes {
            None => LocalClock::System,
            Some(minutes) => LocalClock::from_offset_minutes(minutes).unwrap_or_else(|| {
                tracing::warn!(minutes, "UTC offset out of range, using host time zone");
                LocalClock::System
            }),
        }
    }

    pub fn rule_policy(&self) -> RulePolicy {
        RulePolicy::new(self.stress_keywords.iter().cloned(), self.clock())
    }

    pub fn generative_policy(&self) -> GenerativePolicy {
        GenerativePolicy::new(
            self.generative.endpoint.clone(),
            self.generative.model.clone(),
            self.generate_timeout(),
        )
    }

    /// `<data_dir>/feedback.log`, where the data dir defaults to `~/.companion`.
    pub fn feedback_log_path(&self) -> PathBuf {
        let base = self.data_dir.clone().unwrap_or_else(|| {
            let home = dirs::home_dir().unwrap_or_else(|| ".".into());
            home.join(".companion")
        });
        base.join(FEEDBACK_LOG_FILE)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|source| ConfigError::ListenAddr {
                addr: self.listen_addr.clone(),
                source,
            })
    }
}

/// Reads a YAML config; a missing or invalid file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> ServiceConfig {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml_ng::from_str(&content) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse companion config, falling back to defaults"
                );
                ServiceConfig::default()
            }
        },
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read companion config, falling back to defaults"
            );
            ServiceConfig::default()
        }
    }
}
