use std::fmt;

use async_trait::async_trait;

use crate::types::ChatMessage;
use crate::Result;

/// What a prompt asks the model to produce. Offline backends answer by task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTask {
    PaperAnalysis,
    PaperChat,
    ResearchGaps,
    ResearchScope,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub task: PromptTask,
    pub system: Option<String>,
    /// Earlier turns, oldest first.
    pub history: Vec<ChatMessage>,
    pub user: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Prompt {
    pub fn new(task: PromptTask, user: impl Into<String>) -> Self {
        Self {
            task,
            system: None,
            history: Vec::new(),
            user: user.into(),
            temperature: 0.3,
            max_output_tokens: 4096,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Send one prompt and return the raw text of the reply.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}
