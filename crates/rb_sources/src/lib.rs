pub mod aggregator;
pub mod logging;
pub mod quota;
pub mod searchers;

use std::sync::Arc;
use std::time::Duration;

use rb_core::{PaperSearcher, Result};

pub use aggregator::{AggregateResult, SearchAggregator, SourceOutcome};
pub use searchers::{ArxivSearcher, IeeeSearcher, PubmedSearcher, ScholarSearcher};

/// Settings shared by every searcher.
#[derive(Debug, Clone)]
pub struct SourcesConfig {
    pub serp_api_key: Option<String>,
    pub ieee_api_key: Option<String>,
    pub scholar_daily_limit: u32,
    pub source_timeout: Duration,
    /// Sent to NCBI with every E-utilities request.
    pub contact_email: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            serp_api_key: None,
            ieee_api_key: None,
            scholar_daily_limit: 1,
            source_timeout: Duration::from_secs(30),
            contact_email: "research@example.com".to_string(),
        }
    }
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("research-buddy/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}

/// One searcher per supported source, sharing a single HTTP client.
pub fn default_searchers(config: &SourcesConfig) -> Result<Vec<Arc<dyn PaperSearcher>>> {
    let client = http_client(config.source_timeout)?;
    let arxiv: Arc<dyn PaperSearcher> = Arc::new(ArxivSearcher::new(client.clone()));
    let pubmed: Arc<dyn PaperSearcher> =
        Arc::new(PubmedSearcher::new(client.clone(), &config.contact_email));
    let scholar: Arc<dyn PaperSearcher> = Arc::new(ScholarSearcher::new(
        client.clone(),
        config.serp_api_key.clone(),
        config.scholar_daily_limit,
    ));
    let ieee: Arc<dyn PaperSearcher> =
        Arc::new(IeeeSearcher::new(client, config.ieee_api_key.clone()));
    Ok(vec![arxiv, pubmed, scholar, ieee])
}

pub mod prelude {
    pub use super::{SearchAggregator, SourcesConfig};
    pub use rb_core::{Error, Paper, PaperSearcher, PaperSource, Result, SourceQuery};
}
