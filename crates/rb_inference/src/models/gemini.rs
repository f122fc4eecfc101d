use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rb_core::{ChatRole, Error, LanguageModel, Prompt, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

fn build_request(prompt: &Prompt) -> GenerateRequest {
    let mut contents: Vec<Content> = prompt
        .history
        .iter()
        .map(|message| Content {
            role: Some(match message.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            }),
            parts: vec![Part { text: message.content.clone() }],
        })
        .collect();
    contents.push(Content {
        role: Some("user"),
        parts: vec![Part { text: prompt.user.clone() }],
    });

    GenerateRequest {
        contents,
        system_instruction: prompt.system.as_ref().map(|system| Content {
            role: None,
            parts: vec![Part { text: system.clone() }],
        }),
        generation_config: GenerationConfig {
            temperature: prompt.temperature,
            top_p: 0.8,
            max_output_tokens: prompt.max_output_tokens,
        },
    }
}

fn response_text(response: GenerateResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidResponse("Gemini returned no candidates".to_string()))?;
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(Error::InvalidResponse(format!(
            "Gemini returned an empty reply (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

/// Google Gemini through the public `generateContent` REST endpoint.
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiModel {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&build_request(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Gemini request failed with {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        response_text(response.json::<GenerateResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rb_core::{ChatMessage, PromptTask};

    #[test]
    fn test_request_shape() {
        let prompt = Prompt::new(PromptTask::PaperChat, "What is the method?")
            .with_system("You are a research assistant.")
            .with_history(vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]);
        let json = serde_json::to_value(build_request(&prompt)).unwrap();

        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "What is the method?");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You are a research assistant.");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn test_response_text() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "world"}], "role": "model"}, "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(response).unwrap(), "Hello world");

        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        let err = response_text(blocked).unwrap_err().to_string();
        assert!(err.contains("SAFETY"));

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(response_text(empty).is_err());
    }

    #[tokio::test]
    async fn test_request_errors_do_not_leak_key() {
        let model = GeminiModel::new(
            "SECRET-KEY-123".to_string(),
            None,
            Some("http://127.0.0.1:9".to_string()),
        )
        .unwrap();
        let err = model
            .generate(&Prompt::new(PromptTask::PaperChat, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
        assert!(!format!("{:?}", err).contains("SECRET-KEY-123"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let model = GeminiModel::new("top-secret".to_string(), None, None).unwrap();
        assert!(!format!("{:?}", model).contains("top-secret"));
    }
}
