use async_trait::async_trait;
use chrono::{Datelike, Utc};
use rb_core::{Error, Paper, PaperSearcher, PaperSource, Result, SourceQuery};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{synthetic_id, year_start};
use crate::logging::Logger;

const API_URL: &str = "https://ieeexploreapi.ieee.org/api/v1/search/articles";
const PAGE_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: String,
    #[serde(default)]
    article_number: Option<Value>,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
    #[serde(default)]
    authors: Option<AuthorList>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    publication_title: Option<String>,
    #[serde(default)]
    conference_location: Option<String>,
    #[serde(default)]
    pdf_url: Option<String>,
    #[serde(default)]
    index_terms: Option<Value>,
    #[serde(default)]
    citing_paper_count: Option<u64>,
    #[serde(default)]
    publication_date: Option<Value>,
    #[serde(default)]
    publication_year: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    #[serde(default)]
    authors: Vec<Value>,
}

/// Numbers and strings both show up for the same field.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `YYYY`, `YYYY-MM...` or `YYYY/MM...`; month precision at best.
fn parse_date(text: &str) -> Option<String> {
    let year: i32 = text.get(..4)?.parse().ok()?;
    let month = text
        .get(4..7)
        .filter(|s| s.starts_with('-') || s.starts_with('/'))
        .and_then(|s| s[1..].parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m));
    Some(match month {
        Some(m) => format!("{:04}-{:02}-01T00:00:00Z", year, m),
        None => year_start(year),
    })
}

impl Article {
    fn keywords(&self) -> Vec<String> {
        match &self.index_terms {
            Some(Value::Object(terms)) => ["ieee_terms", "author_terms"]
                .iter()
                .filter_map(|kind| terms.get(*kind)?.get("terms")?.as_array())
                .flatten()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect(),
            Some(Value::Array(terms)) => terms
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect(),
            _ => vec![],
        }
    }

    fn into_paper(self) -> Option<Paper> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return None;
        }
        let number = self.article_number.as_ref().and_then(value_text);
        let id = match &number {
            Some(n) => format!("ieee_{}", n),
            None => synthetic_id("ieee", &title),
        };

        let published = self
            .publication_date
            .as_ref()
            .and_then(value_text)
            .and_then(|d| parse_date(&d))
            .or_else(|| self.publication_year.as_ref().and_then(value_text).and_then(|y| parse_date(&y)))
            .unwrap_or_else(|| year_start(Utc::now().year()));

        let authors = self
            .authors
            .as_ref()
            .map(|list| {
                list.authors
                    .iter()
                    .filter_map(|a| match a {
                        Value::Object(o) => o.get("full_name").and_then(Value::as_str).map(str::to_string),
                        Value::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let venue: Vec<String> = [&self.publication_title, &self.conference_location]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect();

        let pdf_url = self.pdf_url.clone().or_else(|| {
            number
                .as_ref()
                .map(|n| format!("https://ieeexplore.ieee.org/stamp/stamp.jsp?arnumber={}", n))
        });

        Some(Paper {
            id,
            title,
            keywords: self.keywords(),
            authors,
            abstract_text: self.abstract_text.trim().to_string(),
            published,
            source: PaperSource::Ieee,
            venue: (!venue.is_empty()).then(|| venue.join(", ")),
            citation_count: self.citing_paper_count,
            pdf_url,
            doi: self.doi.filter(|d| !d.is_empty()),
        })
    }
}

pub fn parse_response(body: &str) -> Result<Vec<Paper>> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response
        .articles
        .into_iter()
        .filter_map(Article::into_paper)
        .collect())
}

pub struct IeeeSearcher {
    client: reqwest::Client,
    api_key: Option<String>,
    logger: Logger,
}

impl IeeeSearcher {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            logger: Logger::for_source(PaperSource::Ieee),
        }
    }

    fn request_url(api_key: &str, query: &SourceQuery) -> Result<Url> {
        let mut params = vec![
            ("apikey", api_key.to_string()),
            ("querytext", query.query.clone()),
            ("max_records", query.max_results.min(PAGE_LIMIT).to_string()),
            ("start_record", "1".to_string()),
            ("sort_order", "desc".to_string()),
            ("format", "json".to_string()),
        ];
        if let Some(range) = &query.date_range {
            if let Some(start) = range.start {
                params.push(("start_year", start.year().to_string()));
            }
            if let Some(end) = range.end {
                params.push(("end_year", end.year().to_string()));
            }
        }
        Url::parse_with_params(API_URL, &params)
            .map_err(|e| Error::Source(format!("Failed to build IEEE URL: {}", e)))
    }
}

#[async_trait]
impl PaperSearcher for IeeeSearcher {
    fn source(&self) -> PaperSource {
        PaperSource::Ieee
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<Paper>> {
        let Some(api_key) = self.api_key.as_deref() else {
            self.logger.debug("No API key configured, skipping");
            return Ok(Vec::new());
        };

        self.logger.info(&format!(
            "Searching for '{}' (max {})",
            query.query, query.max_results
        ));
        let response = self
            .client
            .get(Self::request_url(api_key, query)?)
            .send()
            .await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            self.logger.warn("API rate limit exceeded");
            return Err(Error::RateLimited("IEEE Xplore API".to_string()));
        }
        let body = response.error_for_status()?.text().await?;
        let papers = parse_response(&body)?;
        self.logger.info(&format!("Found {} papers", papers.len()));
        Ok(papers)
    }
}
