use async_trait::async_trait;
use rb_core::{DateRange, Error, Paper, PaperSearcher, PaperSource, Result, SourceQuery};
use serde::Deserialize;
use url::Url;

use super::squash_whitespace;
use crate::logging::Logger;

const API_URL: &str = "https://export.arxiv.org/api/query";

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    published: String,
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
    #[serde(rename = "link", default)]
    links: Vec<Link>,
    #[serde(rename = "category", default)]
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@title", default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(rename = "@term")]
    term: String,
}

impl Entry {
    fn into_paper(self) -> Paper {
        let pdf_url = self
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("pdf"))
            .map(|l| l.href.clone())
            .or_else(|| Some(self.id.replace("/abs/", "/pdf/")));

        Paper {
            title: squash_whitespace(&self.title),
            abstract_text: squash_whitespace(&self.summary),
            authors: self.authors.into_iter().map(|a| squash_whitespace(&a.name)).collect(),
            published: self.published.trim().to_string(),
            source: PaperSource::Arxiv,
            venue: Some("arXiv".to_string()),
            citation_count: None,
            pdf_url,
            doi: None,
            keywords: self.categories.into_iter().map(|c| c.term).collect(),
            id: self.id.trim().to_string(),
        }
    }
}

/// Parse an arXiv Atom feed, keeping entries published within `date_range`.
pub fn parse_feed(xml: &str, date_range: Option<&DateRange>) -> Result<Vec<Paper>> {
    let feed: Feed = quick_xml::de::from_str(xml)
        .map_err(|e| Error::Source(format!("Invalid arXiv feed: {}", e)))?;

    Ok(feed
        .entries
        .into_iter()
        .map(Entry::into_paper)
        .filter(|paper| match (date_range, paper.published_date()) {
            (Some(range), Some(date)) => range.contains(date),
            _ => true,
        })
        .collect())
}

pub struct ArxivSearcher {
    client: reqwest::Client,
    logger: Logger,
}

impl ArxivSearcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            logger: Logger::for_source(PaperSource::Arxiv),
        }
    }

    fn request_url(query: &SourceQuery) -> Result<Url> {
        Url::parse_with_params(
            API_URL,
            &[
                ("search_query", format!("all:{}", query.query)),
                ("start", "0".to_string()),
                ("max_results", query.max_results.to_string()),
                ("sortBy", "relevance".to_string()),
                ("sortOrder", "descending".to_string()),
            ],
        )
        .map_err(|e| Error::Source(format!("Failed to build arXiv URL: {}", e)))
    }
}

#[async_trait]
impl PaperSearcher for ArxivSearcher {
    fn source(&self) -> PaperSource {
        PaperSource::Arxiv
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<Paper>> {
        self.logger.info(&format!(
            "Searching for '{}' (max {})",
            query.query, query.max_results
        ));
        let body = self
            .client
            .get(Self::request_url(query)?)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let papers = parse_feed(&body, query.date_range.as_ref())?;
        self.logger.info(&format!("Found {} papers", papers.len()));
        Ok(papers)
    }
}
