use std::sync::Arc;

use rb_core::{ChatMessage, Error, LanguageModel, Paper, Prompt, PromptTask, Result};

pub const MAX_MESSAGE_CHARS: usize = 2000;
const DEFAULT_CONTEXT_WINDOW: usize = 20;

pub fn validate_message(message: &str) -> Result<&str> {
    let message = message.trim();
    let len = message.chars().count();
    if len == 0 || len > MAX_MESSAGE_CHARS {
        return Err(Error::Validation(format!(
            "Message must be between 1 and {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(message)
}

fn paper_context(paper: &Paper) -> String {
    let mut context = format!(
        "You are a helpful research assistant discussing one paper with a researcher. \
         Base your answers on the paper details below and say so when they do not cover a question.\n\n\
         Title: {}\nAuthors: {}\nPublished: {}\nSource: {}\n",
        paper.title,
        paper.authors.join(", "),
        paper.published,
        paper.source.display_name()
    );
    if let Some(venue) = &paper.venue {
        context.push_str(&format!("Venue: {}\n", venue));
    }
    if let Some(doi) = &paper.doi {
        context.push_str(&format!("DOI: {}\n", doi));
    }
    context.push_str(&format!("Abstract: {}\n", paper.abstract_text));
    context
}

/// Answers questions about a single paper, carrying recent conversation turns.
#[derive(Debug, Clone)]
pub struct ChatAssistant {
    model: Arc<dyn LanguageModel>,
    context_window: usize,
}

impl ChatAssistant {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    pub fn chat_prompt(&self, paper: &Paper, history: &[ChatMessage], message: &str) -> Prompt {
        let skip = history.len().saturating_sub(self.context_window);
        Prompt::new(PromptTask::PaperChat, message)
            .with_system(paper_context(paper))
            .with_history(history[skip..].to_vec())
            .with_temperature(0.7)
            .with_max_output_tokens(2048)
    }

    pub async fn reply(&self, paper: &Paper, history: &[ChatMessage], message: &str) -> Result<String> {
        let message = validate_message(message)?;
        let reply = self
            .model
            .generate(&self.chat_prompt(paper, history, message))
            .await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(Error::InvalidResponse("empty chat reply".to_string()));
        }
        Ok(reply.to_string())
    }
}
