//! Service configuration.
//!
//! The listener comes from `service_core::config` (`APP__` variables and an
//! optional `configuration` file); everything else is read from plain
//! environment variables. In production (`ENVIRONMENT=prod`) every key must
//! be set explicitly.

use crate::services::backend::BackendMode;
use crate::services::prompt::{default_persona, HistoryPolicy};
use crate::services::providers::openai::OPENAI_API_BASE;
use crate::services::providers::weaviate::DEFAULT_COLLECTION;
use crate::services::providers::RunPolling;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TITLE: &str = "Repertoire of Practice of the Security Council";
const DEFAULT_CAPTION: &str =
    "Questions are answered from the Repertoire of Practice of the Security Council.";
const DEFAULT_GREETING: &str =
    "Ask me anything about the practice of the Security Council, and I will answer from the Repertoire.";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub common: core_config::Config,
    pub mode: BackendMode,
    pub openai: OpenAiSettings,
    pub assistant: AssistantSettings,
    pub weaviate: WeaviateSettings,
    pub rag: RagSettings,
    pub session: SessionSettings,
    pub ui: UiSettings,
    /// Mark the session cookie `Secure` (production only).
    pub secure_cookies: bool,
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    /// Only set in assistant mode.
    pub assistant_id: Option<String>,
    pub polling: RunPolling,
}

#[derive(Debug, Clone)]
pub struct WeaviateSettings {
    /// Only set in stateless mode.
    pub url: Option<String>,
    pub api_key: Secret<String>,
    pub collection: String,
    pub text_property: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RagSettings {
    pub top_k: usize,
    pub history: HistoryPolicy,
    pub persona: String,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct UiSettings {
    pub title: String,
    pub caption: String,
    pub greeting: String,
}

impl AssistantConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok(), core_config::is_production())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(
        common: core_config::Config,
        lookup: F,
        is_prod: bool,
    ) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: Option<&str>| get_env(&lookup, key, default, is_prod);
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode: BackendMode = parse("ASSISTANT_MODE", get("ASSISTANT_MODE", Some("stateless"))?)?;

        let openai = OpenAiSettings {
            api_key: Secret::new(get("OPENAI_API_KEY", None)?),
            base_url: get("OPENAI_BASE_URL", Some(OPENAI_API_BASE))?,
            embedding_model: get("OPENAI_EMBEDDING_MODEL", Some("text-embedding-3-small"))?,
            chat_model: get("OPENAI_CHAT_MODEL", Some("gpt-4o-mini"))?,
            temperature: parse("OPENAI_TEMPERATURE", get("OPENAI_TEMPERATURE", Some("0.2"))?)?,
            timeout: Duration::from_secs(parse(
                "OPENAI_TIMEOUT_SECS",
                get("OPENAI_TIMEOUT_SECS", Some("60"))?,
            )?),
        };

        let assistant = AssistantSettings {
            assistant_id: match mode {
                BackendMode::Assistant => Some(get("ASSISTANT_ID", None)?),
                BackendMode::Stateless => optional("ASSISTANT_ID"),
            },
            polling: RunPolling {
                interval: Duration::from_millis(parse(
                    "ASSISTANT_POLL_INTERVAL_MS",
                    get("ASSISTANT_POLL_INTERVAL_MS", Some("500"))?,
                )?),
                timeout: Duration::from_secs(parse(
                    "ASSISTANT_RUN_TIMEOUT_SECS",
                    get("ASSISTANT_RUN_TIMEOUT_SECS", Some("120"))?,
                )?),
            },
        };

        let weaviate = match mode {
            BackendMode::Stateless => WeaviateSettings {
                url: Some(get("WEAVIATE_URL", None)?),
                api_key: Secret::new(get("WEAVIATE_API_KEY", None)?),
                collection: get("WEAVIATE_COLLECTION", Some(DEFAULT_COLLECTION))?,
                text_property: get("WEAVIATE_TEXT_PROPERTY", Some("text"))?,
                timeout: Duration::from_secs(parse(
                    "WEAVIATE_TIMEOUT_SECS",
                    get("WEAVIATE_TIMEOUT_SECS", Some("30"))?,
                )?),
            },
            BackendMode::Assistant => WeaviateSettings {
                url: optional("WEAVIATE_URL"),
                api_key: Secret::new(optional("WEAVIATE_API_KEY").unwrap_or_default()),
                collection: optional("WEAVIATE_COLLECTION")
                    .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
                text_property: optional("WEAVIATE_TEXT_PROPERTY")
                    .unwrap_or_else(|| "text".to_string()),
                timeout: Duration::from_secs(30),
            },
        };

        let rag = RagSettings {
            top_k: parse("RAG_TOP_K", get("RAG_TOP_K", Some("10"))?)?,
            history: HistoryPolicy::from_max_turns(parse(
                "HISTORY_MAX_TURNS",
                get("HISTORY_MAX_TURNS", Some("10"))?,
            )?),
            persona: optional("PERSONA_PROMPT").unwrap_or_else(default_persona),
        };

        let session = SessionSettings {
            ttl: Duration::from_secs(parse(
                "SESSION_TTL_SECS",
                get("SESSION_TTL_SECS", Some("86400"))?,
            )?),
            sweep_interval: Duration::from_secs(parse(
                "SESSION_SWEEP_INTERVAL_SECS",
                get("SESSION_SWEEP_INTERVAL_SECS", Some("300"))?,
            )?),
        };

        if rag.top_k == 0 {
            return Err(invalid("RAG_TOP_K", "must be at least 1"));
        }
        if assistant.polling.interval.is_zero() {
            return Err(invalid("ASSISTANT_POLL_INTERVAL_MS", "must be at least 1"));
        }
        if session.sweep_interval.is_zero() {
            return Err(invalid("SESSION_SWEEP_INTERVAL_SECS", "must be at least 1"));
        }

        let ui = UiSettings {
            title: optional("APP_TITLE").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            caption: optional("APP_CAPTION").unwrap_or_else(|| DEFAULT_CAPTION.to_string()),
            greeting: optional("APP_GREETING").unwrap_or_else(|| DEFAULT_GREETING.to_string()),
        };

        Ok(AssistantConfig {
            common,
            mode,
            openai,
            assistant,
            weaviate,
            rag,
            session,
            ui,
            secure_cookies: is_prod,
        })
    }
}

fn get_env<F>(lookup: &F, key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse<T>(key: &str, raw: String) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| invalid(key, &format!("{:?}: {}", raw, e)))
}

fn invalid(key: &str, reason: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, reason))
}
