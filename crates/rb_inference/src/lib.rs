use std::fmt;
use std::str::FromStr;

use rb_core::{Error, Result};

pub mod analysis;
pub mod chat;
pub mod json;
pub mod models;
pub mod research;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAi,
    Dummy,
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" | "deepseek" => Ok(Provider::OpenAi),
            "dummy" | "offline" => Ok(Provider::Dummy),
            other => Err(Error::Validation(format!("Unknown model provider: {}", other))),
        }
    }
}

#[derive(Clone, Default)]
pub struct Config {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub base_url: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("model_name", &self.model_name)
            .field("base_url", &self.base_url)
            .finish()
    }
}

pub mod prelude {
    pub use super::analysis::AnalysisGenerator;
    pub use super::chat::ChatAssistant;
    pub use super::models::create_model;
    pub use super::research::{ResearchGaps, ResearchScope};
    pub use super::{Config, Provider};
    pub use rb_core::{Error, LanguageModel, Result};
}

pub use analysis::AnalysisGenerator;
pub use chat::ChatAssistant;
pub use models::create_model;
pub use research::{ResearchGaps, ResearchScope};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names() {
        assert_eq!("Gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("deepseek".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("llama".parse::<Provider>().is_err());
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = Config {
            api_key: Some("secret-key".to_string()),
            ..Config::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret-key"));
        assert!(printed.contains("<redacted>"));
    }
}
