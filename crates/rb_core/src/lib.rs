pub mod error;
pub mod models;
pub mod sources;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use models::{LanguageModel, Prompt, PromptTask};
pub use sources::{PaperSearcher, SourceQuery};
pub use storage::{retained_chat_messages, SessionFilter, SessionStore};
pub use types::*;
