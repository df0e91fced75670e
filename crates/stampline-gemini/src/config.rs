//! Gemini backend configuration (`[gemini]` table)

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stampline_core::ConfigError;

/// Environment variable consulted when no key is configured
pub const API_KEY_ENV: &str = "GENAI_API_KEY";

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const DEFAULT_PROMPT: &str = "This is a photo of a passport visa stamp. \
Find and extract the date of this stamp. Dates are usually in the center and \
can be presented in any format. Also classify it as an entry stamp, exit stamp \
or general stamp based on the words you read. \
Return it as a tuple: (Date, Classification)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Base URL ending in `/`; the model path is appended
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub prompt: String,
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            timeout_seconds: 120,
        }
    }
}

impl GeminiConfig {
    /// Configured key, else `GENAI_API_KEY`. Blank values count as missing.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::Backend(format!(
                    "Gemini API key missing: set gemini.api_key or {API_KEY_ENV}"
                ))
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// `{api_url}models/{model}:generateContent`
    pub fn endpoint(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        format!("{base}/models/{}:generateContent", self.model)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("gemini.model", "must not be empty"));
        }
        if self.prompt.trim().is_empty() {
            return Err(ConfigError::invalid("gemini.prompt", "must not be empty"));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::invalid("gemini.timeout_seconds", "must be > 0"));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::invalid(
                "gemini.api_url",
                format!("not an http(s) URL: {}", self.api_url),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_model() {
        let cfg = GeminiConfig::default();
        assert_eq!(
            cfg.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        let cfg = GeminiConfig {
            api_url: "http://localhost:8080".into(),
            model: "gemini-2.0-flash".into(),
            ..Default::default()
        };
        assert_eq!(
            cfg.endpoint(),
            "http://localhost:8080/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn configured_key_wins() {
        let cfg = GeminiConfig {
            api_key: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_api_key().unwrap(), "abc");
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(GeminiConfig::default().validate().is_ok());
        let cases = [
            GeminiConfig {
                model: " ".into(),
                ..Default::default()
            },
            GeminiConfig {
                timeout_seconds: 0,
                ..Default::default()
            },
            GeminiConfig {
                api_url: "ftp://example".into(),
                ..Default::default()
            },
        ];
        for cfg in cases {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let cfg: GeminiConfig = serde_json::from_str(r#"{"model": "gemini-2.0-flash"}"#).unwrap();
        assert_eq!(cfg.model, "gemini-2.0-flash");
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.timeout_seconds, 120);
    }
}
