use crate::error::SearchError;
use std::time::Duration;
use url::Url;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1/";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Explicit client configuration passed into constructors; there is no
/// ambient global state.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub embed_model: String,
    pub chat_model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Reads `OPENAI_API_KEY` plus optional model/endpoint overrides.
    /// Returns `None` when no usable key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return None;
        }

        let mut config = Self::new(api_key);
        if let Some(model) = non_empty_env("OPENAI_EMBED_MODEL") {
            config.embed_model = model;
        }
        if let Some(model) = non_empty_env("OPENAI_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Some(base_url) = non_empty_env("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        Some(config)
    }

    pub fn base_url(&self) -> Result<Url, SearchError> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// The base URL must end with a slash for endpoint joins to land under
    /// the configured path.
    pub fn endpoint(&self, route: &str) -> Result<Url, SearchError> {
        Ok(self.base_url()?.join(route)?)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_the_public_api() {
        let config = OpenAiConfig::new("sk-test");
        assert_eq!(config.embed_model, DEFAULT_EMBED_MODEL);
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        let endpoint = config.endpoint("embeddings").expect("endpoint should parse");
        assert_eq!(endpoint.as_str(), "https://api.openai.com/v1/embeddings");
    }

    #[test]
    fn chat_endpoint_joins_under_the_base_path() {
        let config = OpenAiConfig::new("sk-test");
        let endpoint = config
            .endpoint("chat/completions")
            .expect("endpoint should parse");
        assert_eq!(
            endpoint.as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn invalid_base_url_is_an_error() {
        let mut config = OpenAiConfig::new("sk-test");
        config.base_url = "not a url".to_string();
        assert!(config.base_url().is_err());
    }
}
