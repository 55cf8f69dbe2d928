//! Configuration for voxtask.
//!
//! Settings are derived from environment variables, read once at startup,
//! and immutable thereafter. Missing credentials are a fatal configuration
//! error — the service refuses to start rather than limp along.

use voxtask_core::Error;

const DEFAULT_STT_URL: &str = "wss://api.deepgram.com/v2/listen";
const DEFAULT_DB_PATH: &str = "voxtask.db";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Which LLM backend serves the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

/// Immutable application settings.
#[derive(Clone)]
pub struct Settings {
    /// Bearer token for the STT provider.
    pub stt_api_key: String,
    /// Base WebSocket URL of the STT provider.
    pub stt_url: String,

    pub provider: ProviderKind,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    /// Model name override; falls back to the provider default.
    pub model: String,

    pub database_path: String,
    /// Optional pricing-table override, a JSON map of
    /// model → [input, cache_write, cache_read, output] $/M rates.
    pub pricing_override: Option<String>,

    pub host: String,
    pub port: u16,

    /// Conversation messages loaded as prompt prefix (2–5 sensible).
    pub history_window: usize,
    /// Tool-loop iteration cap per invocation.
    pub max_iterations: u32,
    /// Wall-clock cap per agent invocation, in seconds.
    pub agent_timeout_secs: u64,
}

impl Settings {
    /// Load from process environment. Fails fast on missing credentials.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary lookup function (injectable for tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let stt_api_key = get("VOXTASK_STT_API_KEY")
            .or_else(|| get("DEEPGRAM_API_KEY"))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config("VOXTASK_STT_API_KEY is required"))?;

        let provider = match get("VOXTASK_PROVIDER").as_deref() {
            None | Some("anthropic") => ProviderKind::Anthropic,
            Some("openai") => ProviderKind::OpenAi,
            Some(other) => {
                return Err(Error::config(format!(
                    "unknown provider '{other}' (expected 'anthropic' or 'openai')"
                )))
            }
        };

        let anthropic_api_key = get("ANTHROPIC_API_KEY").filter(|v| !v.is_empty());
        let openai_api_key = get("OPENAI_API_KEY").filter(|v| !v.is_empty());

        match provider {
            ProviderKind::Anthropic if anthropic_api_key.is_none() => {
                return Err(Error::config("ANTHROPIC_API_KEY is required"));
            }
            ProviderKind::OpenAi if openai_api_key.is_none() => {
                return Err(Error::config("OPENAI_API_KEY is required"));
            }
            _ => {}
        }

        let model = get("VOXTASK_MODEL").unwrap_or_else(|| {
            match provider {
                ProviderKind::Anthropic => DEFAULT_ANTHROPIC_MODEL,
                ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
            }
            .to_string()
        });

        let port = match get("VOXTASK_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::config(format!("invalid VOXTASK_PORT '{raw}'")))?,
            None => 8000,
        };

        let history_window = parse_or(&get, "VOXTASK_HISTORY_WINDOW", 3)?.clamp(2, 5);

        Ok(Self {
            stt_api_key,
            stt_url: get("VOXTASK_STT_URL").unwrap_or_else(|| DEFAULT_STT_URL.into()),
            provider,
            anthropic_api_key,
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL"),
            model,
            database_path: get("VOXTASK_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into()),
            pricing_override: get("VOXTASK_PRICING"),
            host: get("VOXTASK_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port,
            history_window,
            max_iterations: parse_or(&get, "VOXTASK_MAX_ITERATIONS", 3)?,
            agent_timeout_secs: parse_or(&get, "VOXTASK_AGENT_TIMEOUT_SECS", 30)?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, Error> {
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::config(format!("invalid {key} '{raw}'"))),
        None => Ok(default),
    }
}

fn redact(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("stt_api_key", &"[REDACTED]")
            .field("stt_url", &self.stt_url)
            .field("provider", &self.provider)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("model", &self.model)
            .field("database_path", &self.database_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("history_window", &self.history_window)
            .field("max_iterations", &self.max_iterations)
            .field("agent_timeout_secs", &self.agent_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn minimal_anthropic_config() {
        let settings = Settings::from_lookup(env(&[
            ("VOXTASK_STT_API_KEY", "dg-key"),
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
        ]))
        .unwrap();
        assert_eq!(settings.provider, ProviderKind::Anthropic);
        assert_eq!(settings.model, DEFAULT_ANTHROPIC_MODEL);
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.history_window, 3);
        assert_eq!(settings.agent_timeout_secs, 30);
    }

    #[test]
    fn missing_stt_key_is_fatal() {
        let err = Settings::from_lookup(env(&[("ANTHROPIC_API_KEY", "sk")])).unwrap_err();
        assert!(err.to_string().contains("VOXTASK_STT_API_KEY"));
    }

    #[test]
    fn missing_llm_key_is_fatal() {
        let err = Settings::from_lookup(env(&[("VOXTASK_STT_API_KEY", "dg")])).unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn openai_provider_requires_its_key() {
        let err = Settings::from_lookup(env(&[
            ("VOXTASK_STT_API_KEY", "dg"),
            ("VOXTASK_PROVIDER", "openai"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let settings = Settings::from_lookup(env(&[
            ("VOXTASK_STT_API_KEY", "dg"),
            ("VOXTASK_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-oai"),
        ]))
        .unwrap();
        assert_eq!(settings.provider, ProviderKind::OpenAi);
        assert_eq!(settings.model, DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = Settings::from_lookup(env(&[
            ("VOXTASK_STT_API_KEY", "dg"),
            ("VOXTASK_PROVIDER", "groq"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("groq"));
    }

    #[test]
    fn history_window_clamped() {
        let settings = Settings::from_lookup(env(&[
            ("VOXTASK_STT_API_KEY", "dg"),
            ("ANTHROPIC_API_KEY", "sk"),
            ("VOXTASK_HISTORY_WINDOW", "50"),
        ]))
        .unwrap();
        assert_eq!(settings.history_window, 5);
    }

    #[test]
    fn model_override_wins() {
        let settings = Settings::from_lookup(env(&[
            ("VOXTASK_STT_API_KEY", "dg"),
            ("ANTHROPIC_API_KEY", "sk"),
            ("VOXTASK_MODEL", "claude-3-5-haiku-20241022"),
        ]))
        .unwrap();
        assert_eq!(settings.model, "claude-3-5-haiku-20241022");
    }

    #[test]
    fn debug_redacts_secrets() {
        let settings = Settings::from_lookup(env(&[
            ("VOXTASK_STT_API_KEY", "dg-secret"),
            ("ANTHROPIC_API_KEY", "sk-ant-secret"),
        ]))
        .unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("dg-secret"));
        assert!(!debug.contains("sk-ant-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
