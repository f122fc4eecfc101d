use std::sync::Arc;
use std::time::Duration;

use rb_core::{LanguageModel, SessionStore};
use rb_inference::{AnalysisGenerator, ChatAssistant};
use rb_sources::SearchAggregator;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `*` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Terminal sessions older than this are purged.
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    /// Messages kept per (user, paper) chat.
    pub chat_history_limit: usize,
    /// Messages replayed to the model with each question.
    pub chat_context_window: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            session_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            chat_history_limit: 100,
            chat_context_window: 20,
        }
    }
}

pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub aggregator: Arc<SearchAggregator>,
    pub analysis: AnalysisGenerator,
    pub chat: ChatAssistant,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        aggregator: SearchAggregator,
        model: Arc<dyn LanguageModel>,
        config: ServerConfig,
    ) -> Self {
        Self {
            store,
            aggregator: Arc::new(aggregator),
            analysis: AnalysisGenerator::new(model.clone()),
            chat: ChatAssistant::new(model).with_context_window(config.chat_context_window),
            config,
        }
    }
}
