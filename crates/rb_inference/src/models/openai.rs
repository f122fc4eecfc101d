use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rb_core::{ChatRole, Error, LanguageModel, Prompt, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
const DEFAULT_MODEL: &str = "deepseek-chat";

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions against any OpenAI-compatible endpoint (DeepSeek by default).
pub struct OpenAiModel {
    client: Arc<Client>,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiModel {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            client: Arc::new(Client::new()),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn build_request(&self, prompt: &Prompt) -> ChatRequest {
        let mut messages = Vec::with_capacity(prompt.history.len() + 2);
        if let Some(system) = &prompt.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.extend(prompt.history.iter().map(|m| ChatMessage {
            role: match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: m.content.clone(),
        }));
        messages.push(ChatMessage {
            role: "user",
            content: prompt.user.clone(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: prompt.temperature,
            max_tokens: prompt.max_output_tokens,
        }
    }
}

impl fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.build_request(prompt))
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::InvalidResponse("Completion contained no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rb_core::PromptTask;

    #[test]
    fn test_request_includes_system_and_history() {
        let model = OpenAiModel::new("key".to_string(), None, Some("http://localhost:8080/v1/".to_string())).unwrap();
        assert_eq!(model.base_url, "http://localhost:8080/v1");

        let prompt = Prompt::new(PromptTask::PaperChat, "And the results?")
            .with_system("Be brief.")
            .with_history(vec![rb_core::ChatMessage::user("Summarise it")]);
        let request = serde_json::to_value(model.build_request(&prompt)).unwrap();
        let roles: Vec<_> = request["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(roles, vec!["system", "user", "user"]);
        assert_eq!(request["model"], "deepseek-chat");
    }
}
