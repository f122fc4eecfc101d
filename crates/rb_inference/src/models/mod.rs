use std::sync::Arc;

use rb_core::{LanguageModel, Result};

use crate::{Config, Provider};

pub mod dummy;
pub mod gemini;
pub mod openai;

pub use dummy::DummyModel;
pub use gemini::GeminiModel;
pub use openai::OpenAiModel;

/// Build the configured model. Hosted providers without an API key fall back
/// to the offline model so the service still answers.
pub async fn create_model(config: Option<Config>) -> Result<Arc<dyn LanguageModel>> {
    let config = config.unwrap_or_default();
    let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());

    let model: Arc<dyn LanguageModel> = match (config.provider, api_key) {
        (Provider::Dummy, _) => Arc::new(DummyModel::new()),
        (Provider::Gemini, Some(key)) => Arc::new(GeminiModel::new(
            key,
            config.model_name.clone(),
            config.base_url.clone(),
        )?),
        (Provider::OpenAi, Some(key)) => Arc::new(OpenAiModel::new(
            key,
            config.model_name.clone(),
            config.base_url.clone(),
        )?),
        (provider, None) => {
            tracing::warn!(
                "No API key configured for {:?}, using the offline model",
                provider
            );
            Arc::new(DummyModel::new())
        }
    };
    tracing::debug!("Language model ready: {}", model.name());
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_falls_back_to_dummy() {
        let model = create_model(None).await.unwrap();
        assert_eq!(model.name(), "dummy");

        let model = create_model(Some(Config {
            provider: Provider::Gemini,
            api_key: Some("key".to_string()),
            ..Config::default()
        }))
        .await
        .unwrap();
        assert_eq!(model.name(), "gemini");
    }
}
