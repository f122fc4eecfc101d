use async_trait::async_trait;

use crate::types::{DateRange, Paper, PaperSource};
use crate::Result;

#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub query: String,
    pub max_results: usize,
    pub date_range: Option<DateRange>,
    pub user_id: String,
}

impl SourceQuery {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results,
            date_range: None,
            user_id: "anonymous".to_string(),
        }
    }
}

#[async_trait]
pub trait PaperSearcher: Send + Sync {
    /// The source every returned paper is tagged with
    fn source(&self) -> PaperSource;

    /// Fail with `RateLimited` when `user_id` may not search this source right now
    fn check_quota(&self, _user_id: &str) -> Result<()> {
        Ok(())
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<Paper>>;
}
