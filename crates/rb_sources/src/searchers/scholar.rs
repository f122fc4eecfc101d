use async_trait::async_trait;
use chrono::{Datelike, Utc};
use rb_core::{Error, Paper, PaperSearcher, PaperSource, Result, SourceQuery};
use serde::Deserialize;
use url::Url;

use super::{find_year, synthetic_id, year_start};
use crate::logging::Logger;
use crate::quota::DailyQuota;

const SERP_URL: &str = "https://serpapi.com/search.json";
/// Google Scholar pages hold at most 20 results.
const PAGE_LIMIT: usize = 20;
const PLACEHOLDER_LIMIT: usize = 3;

#[derive(Debug, Default, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    publication_info: PublicationInfo,
    #[serde(default)]
    resources: Vec<Resource>,
    #[serde(default)]
    inline_links: InlineLinks,
}

#[derive(Debug, Default, Deserialize)]
struct PublicationInfo {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    authors: Vec<NamedAuthor>,
}

#[derive(Debug, Deserialize)]
struct NamedAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(default)]
    file_format: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InlineLinks {
    #[serde(default)]
    cited_by: Option<CitedBy>,
}

#[derive(Debug, Deserialize)]
struct CitedBy {
    #[serde(default)]
    total: Option<u64>,
}

/// Pull a DOI out of a result link (`doi.org/...`, `doi=...` or `/doi/...`).
fn doi_from_link(link: &str) -> Option<String> {
    if let Some(idx) = link.find("doi.org/") {
        let doi = &link[idx + "doi.org/".len()..];
        return (!doi.is_empty()).then(|| doi.to_string());
    }
    let lower = link.to_ascii_lowercase();
    ["doi=", "doi/"].iter().find_map(|marker| {
        let idx = lower.find(marker)?;
        let rest = &link[idx + marker.len()..];
        let doi: String = rest
            .chars()
            .take_while(|c| *c != '&' && !c.is_whitespace())
            .collect();
        (!doi.is_empty()).then_some(doi)
    })
}

impl OrganicResult {
    fn into_paper(self) -> Option<Paper> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return None;
        }
        let summary = self.publication_info.summary.trim().to_string();
        let published = year_start(find_year(&summary).unwrap_or_else(|| Utc::now().year()));
        let pdf_url = self
            .resources
            .into_iter()
            .find(|r| r.file_format.as_deref() == Some("PDF"))
            .and_then(|r| r.link);

        Some(Paper {
            id: synthetic_id("scholar", &title),
            authors: self.publication_info.authors.into_iter().map(|a| a.name).collect(),
            abstract_text: self.snippet.trim().to_string(),
            published,
            source: PaperSource::GoogleScholar,
            venue: (!summary.is_empty()).then_some(summary),
            citation_count: self.inline_links.cited_by.and_then(|c| c.total),
            pdf_url,
            doi: self.link.as_deref().and_then(doi_from_link),
            keywords: vec![],
            title,
        })
    }
}

pub fn parse_response(body: &str) -> Result<Vec<Paper>> {
    let response: SerpResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(Error::Source(format!("SerpAPI error: {}", error)));
    }
    Ok(response
        .organic_results
        .into_iter()
        .filter_map(OrganicResult::into_paper)
        .collect())
}

/// Deterministic stand-ins used when no SerpAPI key is configured.
pub fn placeholder_results(query: &str, max_results: usize) -> Vec<Paper> {
    let first_word = query.split_whitespace().next().unwrap_or("research");
    (0..max_results.min(PLACEHOLDER_LIMIT))
        .map(|i| {
            let n = i + 1;
            Paper {
                id: synthetic_id("scholar", &format!("placeholder {} {}", query, i)),
                title: format!("Google Scholar result {} for '{}'", n, query),
                authors: vec![format!("Author {}A", n), format!("Author {}B", n)],
                abstract_text: format!(
                    "Placeholder abstract for result {} of a Google Scholar search about {}.",
                    n, query
                ),
                published: year_start(2023 - i as i32),
                source: PaperSource::GoogleScholar,
                venue: Some(format!("Journal {}", n)),
                citation_count: Some(50 - 10 * i as u64),
                pdf_url: None,
                doi: Some(format!("10.1000/placeholder.scholar.{}", n)),
                keywords: vec![format!("keyword{}", n), first_word.to_string()],
            }
        })
        .collect()
}

pub struct ScholarSearcher {
    client: reqwest::Client,
    api_key: Option<String>,
    quota: DailyQuota,
    logger: Logger,
}

impl ScholarSearcher {
    pub fn new(client: reqwest::Client, api_key: Option<String>, daily_limit: u32) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            quota: DailyQuota::new(daily_limit),
            logger: Logger::for_source(PaperSource::GoogleScholar),
        }
    }

    pub fn quota(&self) -> &DailyQuota {
        &self.quota
    }

    fn request_url(api_key: &str, query: &SourceQuery) -> Result<Url> {
        let mut params = vec![
            ("engine", "google_scholar".to_string()),
            ("q", query.query.clone()),
            ("num", query.max_results.min(PAGE_LIMIT).to_string()),
            ("hl", "en".to_string()),
            ("start", "0".to_string()),
            ("api_key", api_key.to_string()),
        ];
        if let Some(range) = &query.date_range {
            if let Some(start) = range.start {
                params.push(("as_ylo", start.year().to_string()));
            }
            if let Some(end) = range.end {
                params.push(("as_yhi", end.year().to_string()));
            }
        }
        Url::parse_with_params(SERP_URL, &params)
            .map_err(|e| Error::Source(format!("Failed to build SerpAPI URL: {}", e)))
    }
}

#[async_trait]
impl PaperSearcher for ScholarSearcher {
    fn source(&self) -> PaperSource {
        PaperSource::GoogleScholar
    }

    fn check_quota(&self, user_id: &str) -> Result<()> {
        self.quota.check(user_id)
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<Paper>> {
        let logger = self.logger.clone().with_prefix(format!("user={}", query.user_id));
        if let Err(e) = self.quota.consume(&query.user_id) {
            logger.warn("Daily limit reached");
            return Err(e);
        }

        let Some(api_key) = self.api_key.as_deref() else {
            logger.warn("No SerpAPI key configured, returning placeholder results");
            return Ok(placeholder_results(&query.query, query.max_results));
        };

        logger.info(&format!(
            "Searching for '{}' (max {})",
            query.query, query.max_results
        ));
        let body = self
            .client
            .get(Self::request_url(api_key, query)?)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let papers = parse_response(&body)?;
        logger.info(&format!("Found {} papers", papers.len()));
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn searcher(limit: u32) -> ScholarSearcher {
        ScholarSearcher::new(reqwest::Client::new(), None, limit)
    }

    #[test]
    fn test_parse_serp_response() {
        let body = r#"{
            "search_metadata": {"status": "Success"},
            "organic_results": [
                {
                    "position": 0,
                    "title": "Deep residual learning for image recognition",
                    "link": "https://doi.org/10.1109/CVPR.2016.90",
                    "snippet": "Deeper neural networks are more difficult to train.",
                    "publication_info": {
                        "summary": "K He, X Zhang, S Ren, J Sun - Proceedings of the IEEE, 2016 - openaccess.thecvf.com",
                        "authors": [{"name": "K He"}, {"name": "X Zhang"}]
                    },
                    "resources": [{"title": "thecvf.com", "file_format": "PDF", "link": "https://example.org/resnet.pdf"}],
                    "inline_links": {"cited_by": {"total": 200000}}
                },
                {"title": "", "snippet": "dropped"},
                {"title": "Bare result"}
            ]
        }"#;

        let papers = parse_response(body).unwrap();
        assert_eq!(papers.len(), 2);
        let resnet = &papers[0];
        assert_eq!(resnet.authors, vec!["K He", "X Zhang"]);
        assert_eq!(resnet.published, "2016-01-01T00:00:00Z");
        assert_eq!(resnet.citation_count, Some(200000));
        assert_eq!(resnet.doi.as_deref(), Some("10.1109/CVPR.2016.90"));
        assert_eq!(resnet.pdf_url.as_deref(), Some("https://example.org/resnet.pdf"));
        assert!(resnet.id.starts_with("scholar_"));
        assert!(papers[1].citation_count.is_none());
    }

    #[test]
    fn test_serp_error_is_reported() {
        assert!(parse_response(r#"{"error": "Invalid API key."}"#).is_err());
    }

    #[test]
    fn test_doi_from_link() {
        assert_eq!(
            doi_from_link("https://dl.acm.org/doi/10.1145/3292500.3330701").as_deref(),
            Some("10.1145/3292500.3330701")
        );
        assert_eq!(
            doi_from_link("https://x.org/view?DOI=10.1/abc&x=1").as_deref(),
            Some("10.1/abc")
        );
        assert_eq!(doi_from_link("https://arxiv.org/abs/1234.5678"), None);
    }

    #[tokio::test]
    async fn test_placeholders_without_key() {
        let searcher = searcher(5);
        let papers = searcher.search(&SourceQuery::new("quantum computing", 10)).await.unwrap();
        assert_eq!(papers.len(), 3);
        assert!(papers.iter().all(|p| p.source == PaperSource::GoogleScholar));

        let again = searcher.search(&SourceQuery::new("quantum computing", 2)).await.unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].id, papers[0].id);
    }

    #[tokio::test]
    async fn test_daily_limit_is_enforced_per_user() {
        let searcher = searcher(1);
        assert!(searcher.check_quota("anonymous").is_ok());
        searcher.search(&SourceQuery::new("protein design", 3)).await.unwrap();

        assert!(matches!(searcher.check_quota("anonymous"), Err(Error::RateLimited(_))));
        assert!(matches!(
            searcher.search(&SourceQuery::new("protein design", 3)).await,
            Err(Error::RateLimited(_))
        ));

        let mut other = SourceQuery::new("protein design", 3);
        other.user_id = "bob".to_string();
        assert!(searcher.search(&other).await.is_ok());
    }
}
