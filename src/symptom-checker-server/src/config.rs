// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration.
//!
//! Everything here is resolved once at process start-up and handed to the handlers through
//! `AppState`. Request handling never reads the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./symptom_checker.db";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const GOOGLE_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-flash-latest",
    "gemini-2.5-flash-lite",
    "gemini-flash-lite-latest",
    "gemini-2.0-flash",
    "gemini-2.0-flash-001",
    "gemini-2.0-flash-lite",
    "gemini-2.0-flash-lite-001",
    "gemini-2.5-flash-preview-09-2025",
    "gemini-2.5-flash-preview-05-20",
    "gemini-2.5-flash-lite-preview-09-2025",
    "gemini-2.5-flash-lite-preview-06-17",
];
const OPENAI_MODELS: &[&str] = &["gpt-4-turbo-preview", "gpt-4o-mini"];
const ANTHROPIC_MODELS: &[&str] = &["claude-3-sonnet-20240229", "claude-3-haiku-20240307"];

/// LLM provider the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding this provider's credential.
    pub fn key_var(&self) -> &'static str {
        match self {
            Provider::Google => "GOOGLE_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Provider-specific model override variable, checked after `LLM_MODEL`.
    pub fn model_var(&self) -> &'static str {
        match self {
            Provider::Google => "GOOGLE_MODEL",
            Provider::OpenAi => "OPENAI_MODEL",
            Provider::Anthropic => "ANTHROPIC_MODEL",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Google => "https://generativelanguage.googleapis.com",
            Provider::OpenAi => "https://api.openai.com",
            Provider::Anthropic => "https://api.anthropic.com",
        }
    }

    pub fn default_models(&self) -> &'static [&'static str] {
        match self {
            Provider::Google => GOOGLE_MODELS,
            Provider::OpenAi => OPENAI_MODELS,
            Provider::Anthropic => ANTHROPIC_MODELS,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gemini" => Ok(Provider::Google),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported LLM provider: {0}")]
    UnsupportedProvider(String),
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Configuration resolved at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub provider: Provider,
    pub api_key: Option<String>,
    /// Ordered candidate models, primary first, no duplicates.
    pub candidate_models: Vec<String>,
    pub base_url: String,
    pub request_timeout: Duration,
    /// Live model calls disabled; every analysis comes from the heuristic stub.
    pub stub_mode: bool,
    /// Operational failures degrade to the heuristic stub instead of a 5xx.
    pub heuristic_fallback: bool,
    /// Honor a client-supplied credential header.
    pub allow_client_api_key: bool,
    pub persistence_enabled: bool,
    pub database_url: String,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider = match get("LLM_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => Provider::Google,
        };

        let override_model = get("LLM_MODEL").or_else(|| get(provider.model_var()));
        let candidate_models = candidate_models(override_model.as_deref(), provider);

        let request_timeout = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    var: "LLM_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
                Duration::from_secs(secs.max(1))
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let bind_addr = get("BIND_ADDR")
            .or_else(|| get("PORT").map(|port| format!("0.0.0.0:{port}")))
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Ok(Self {
            bind_addr,
            provider,
            api_key: get(provider.key_var()),
            candidate_models,
            base_url: get("LLM_BASE_URL")
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            request_timeout,
            stub_mode: flag(get("STUB_MODE"), false),
            heuristic_fallback: flag(get("HEURISTIC_FALLBACK"), true),
            allow_client_api_key: flag(get("ALLOW_CLIENT_API_KEY"), false),
            persistence_enabled: flag(get("ENABLE_PERSISTENCE"), false),
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
        })
    }

    /// Whether a server-side credential is present.
    pub fn llm_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            provider: Provider::Google,
            api_key: None,
            candidate_models: candidate_models(None, Provider::Google),
            base_url: Provider::Google.default_base_url().to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            stub_mode: false,
            heuristic_fallback: true,
            allow_client_api_key: false,
            persistence_enabled: false,
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

/// Override first, then the provider defaults, keeping first occurrences only.
fn candidate_models(override_model: Option<&str>, provider: Provider) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    for name in override_model
        .into_iter()
        .chain(provider.default_models().iter().copied())
    {
        if !models.iter().any(|m| m == name) {
            models.push(name.to_string());
        }
    }
    models
}

fn flag(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => matches!(
            v.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.provider, Provider::Google);
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
        assert!(cfg.api_key.is_none());
        assert!(!cfg.llm_configured());
        assert!(!cfg.stub_mode);
        assert!(cfg.heuristic_fallback);
        assert!(!cfg.allow_client_api_key);
        assert!(!cfg.persistence_enabled);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.candidate_models[0], "gemini-2.5-flash");
    }

    #[test]
    fn test_model_override_goes_first_without_duplicates() {
        let cfg = config_from(&[("GOOGLE_MODEL", "gemini-2.0-flash")]).unwrap();
        assert_eq!(cfg.candidate_models[0], "gemini-2.0-flash");
        let count = cfg
            .candidate_models
            .iter()
            .filter(|m| m.as_str() == "gemini-2.0-flash")
            .count();
        assert_eq!(count, 1);
        assert_eq!(cfg.candidate_models.len(), GOOGLE_MODELS.len());
    }

    #[test]
    fn test_llm_model_beats_provider_specific_override() {
        let cfg = config_from(&[
            ("LLM_PROVIDER", "openai"),
            ("LLM_MODEL", "gpt-4o"),
            ("OPENAI_MODEL", "gpt-3.5-turbo"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(cfg.provider, Provider::OpenAi);
        assert_eq!(cfg.candidate_models[0], "gpt-4o");
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.base_url, "https://api.openai.com");
    }

    #[test]
    fn test_flags_are_case_insensitive() {
        let cfg = config_from(&[
            ("STUB_MODE", "True"),
            ("HEURISTIC_FALLBACK", "no"),
            ("ALLOW_CLIENT_API_KEY", "YES"),
            ("ENABLE_PERSISTENCE", "1"),
        ])
        .unwrap();
        assert!(cfg.stub_mode);
        assert!(!cfg.heuristic_fallback);
        assert!(cfg.allow_client_api_key);
        assert!(cfg.persistence_enabled);
    }

    #[test]
    fn test_blank_key_is_unconfigured() {
        let cfg = config_from(&[("GOOGLE_API_KEY", "   ")]).unwrap();
        assert!(!cfg.llm_configured());
    }

    #[test]
    fn test_port_sets_bind_addr() {
        let cfg = config_from(&[("PORT", "9090")]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_rejects_unknown_provider() {
        assert!(matches!(
            config_from(&[("LLM_PROVIDER", "cohere")]),
            Err(ConfigError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_rejects_bad_timeout() {
        assert!(matches!(
            config_from(&[("LLM_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
