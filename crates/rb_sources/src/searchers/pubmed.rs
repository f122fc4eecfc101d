use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rb_core::{DateRange, Error, Paper, PaperSearcher, PaperSource, Result, SourceQuery};
use serde::Deserialize;
use url::Url;

use super::{squash_whitespace, synthetic_id};
use crate::logging::Logger;

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
const TOOL: &str = "research_buddy";
const FETCH_CHUNK: usize = 200;
const CHUNK_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

/// `YYYY/MM/DD:YYYY/MM/DD[PDAT]`, open ends filled with far-away dates.
pub fn date_filter(range: &DateRange) -> Option<String> {
    if range.start.is_none() && range.end.is_none() {
        return None;
    }
    let fmt = |d: NaiveDate| d.format("%Y/%m/%d").to_string();
    let start = range.start.map(fmt).unwrap_or_else(|| "1800/01/01".to_string());
    let end = range.end.map(fmt).unwrap_or_else(|| "3000/12/31".to_string());
    Some(format!("{}:{}[PDAT]", start, end))
}

fn month_number(month: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let month = month.trim();
    if let Ok(n) = month.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let lower = month.to_lowercase();
    MONTHS
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

#[derive(Debug, Default)]
struct PartialDate {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
}

impl PartialDate {
    fn to_iso(&self) -> Option<String> {
        let year = self.year?;
        let month = self.month.unwrap_or(1);
        let day = self.day.filter(|d| (1..=31).contains(d)).unwrap_or(1);
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))?;
        Some(format!("{}T00:00:00Z", date.format("%Y-%m-%d")))
    }
}

#[derive(Debug, Default)]
struct ArticleBuilder {
    pmid: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    abstract_label: Option<String>,
    abstract_text: String,
    authors: Vec<String>,
    fore_name: String,
    last_name: String,
    journal: Option<String>,
    pub_date: PartialDate,
    article_date: PartialDate,
    doi: Option<String>,
    elocation_doi: Option<String>,
    pmc: Option<String>,
    keywords: Vec<String>,
    id_type: Option<String>,
    eid_type: Option<String>,
}

impl ArticleBuilder {
    fn push_author(&mut self) {
        let fore = squash_whitespace(&self.fore_name);
        let last = squash_whitespace(&self.last_name);
        match (fore.is_empty(), last.is_empty()) {
            (false, false) => self.authors.push(format!("{} {}", fore, last)),
            (true, false) => self.authors.push(last),
            _ => {}
        }
        self.fore_name.clear();
        self.last_name.clear();
    }

    fn push_abstract(&mut self) {
        let text = squash_whitespace(&self.abstract_text);
        if !text.is_empty() {
            match self.abstract_label.take() {
                Some(label) if !label.is_empty() => {
                    self.abstract_parts.push(format!("{}: {}", label, text))
                }
                _ => self.abstract_parts.push(text),
            }
        }
        self.abstract_text.clear();
    }

    fn build(self) -> Option<Paper> {
        let title = squash_whitespace(&self.title);
        if title.is_empty() {
            return None;
        }
        let id = match &self.pmid {
            Some(pmid) => format!("pubmed_{}", pmid),
            None => synthetic_id("pubmed", &title),
        };
        let published = self
            .pub_date
            .to_iso()
            .or_else(|| self.article_date.to_iso())
            .unwrap_or_else(|| super::year_start(Utc::now().year()));

        Some(Paper {
            id,
            title,
            authors: self.authors,
            abstract_text: self.abstract_parts.join(" "),
            published,
            source: PaperSource::Pubmed,
            venue: self.journal,
            citation_count: None,
            pdf_url: self
                .pmc
                .map(|pmc| format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{}/pdf/", pmc)),
            doi: self.doi.or(self.elocation_doi),
            keywords: self.keywords,
        })
    }
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_error(e: quick_xml::Error) -> Error {
    Error::Source(format!("Invalid PubMed XML: {}", e))
}

/// Parse an efetch `PubmedArticleSet` document.
pub fn parse_articles(xml: &str) -> Result<Vec<Paper>> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<ArticleBuilder> = None;
    let mut papers = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if let Some(article) = current.as_mut() {
                    match name.as_str() {
                        "AbstractText" => article.abstract_label = attribute(&e, "Label"),
                        "ArticleId" => article.id_type = attribute(&e, "IdType"),
                        "ELocationID" => article.eid_type = attribute(&e, "EIdType"),
                        _ => {}
                    }
                } else if name == "PubmedArticle" {
                    current = Some(ArticleBuilder::default());
                }
                path.push(name);
            }
            Event::End(e) => {
                let name = e.name();
                if let Some(article) = current.as_mut() {
                    match name.as_ref() {
                        b"Author" => article.push_author(),
                        b"AbstractText" => article.push_abstract(),
                        b"ArticleId" => article.id_type = None,
                        b"ELocationID" => article.eid_type = None,
                        _ => {}
                    }
                }
                if name.as_ref() == b"PubmedArticle" {
                    if let Some(paper) = current.take().and_then(ArticleBuilder::build) {
                        papers.push(paper);
                    }
                }
                path.pop();
            }
            Event::Text(e) => {
                if let Some(article) = current.as_mut() {
                    let text = e.unescape().map_err(xml_error)?;
                    collect_text(article, &path, &text);
                }
            }
            Event::CData(e) => {
                if let Some(article) = current.as_mut() {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    collect_text(article, &path, &text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(papers)
}

fn collect_text(article: &mut ArticleBuilder, path: &[String], text: &str) {
    let within = |name: &str| path.iter().any(|p| p == name);
    let leaf = path.last().map(String::as_str).unwrap_or_default();
    let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
    let grandparent = path.len().checked_sub(3).map(|i| path[i].as_str());

    // inline markup (<i>, <sup>) inside titles and abstracts keeps its text
    if within("ArticleTitle") && !within("CommentsCorrections") {
        article.title.push_str(text);
        return;
    }
    if within("AbstractText") {
        article.abstract_text.push_str(text);
        return;
    }

    let value = text.trim();
    if value.is_empty() {
        return;
    }
    match (leaf, parent) {
        ("PMID", Some("MedlineCitation")) if article.pmid.is_none() => {
            article.pmid = Some(value.to_string())
        }
        ("ForeName", Some("Author")) => article.fore_name.push_str(value),
        ("LastName", Some("Author")) => article.last_name.push_str(value),
        ("Title", Some("Journal")) => article.journal = Some(squash_whitespace(value)),
        ("Year", Some("PubDate")) => article.pub_date.year = value.parse().ok(),
        ("Month", Some("PubDate")) => article.pub_date.month = month_number(value),
        ("Day", Some("PubDate")) => article.pub_date.day = value.parse().ok(),
        ("MedlineDate", Some("PubDate")) => article.pub_date.year = super::find_year(value),
        ("Year", Some("ArticleDate")) => article.article_date.year = value.parse().ok(),
        ("Month", Some("ArticleDate")) => article.article_date.month = month_number(value),
        ("Day", Some("ArticleDate")) => article.article_date.day = value.parse().ok(),
        ("DescriptorName", Some("MeshHeading")) => article.keywords.push(value.to_string()),
        ("ELocationID", _) if article.eid_type.as_deref() == Some("doi") => {
            article.elocation_doi = Some(value.to_string())
        }
        // references carry their own ArticleIdList, only the article's own counts
        ("ArticleId", Some("ArticleIdList")) if grandparent == Some("PubmedData") => {
            match article.id_type.as_deref() {
                Some("doi") => article.doi = Some(value.to_string()),
                Some("pmc") => article.pmc = Some(value.to_string()),
                _ => {}
            }
        }
        _ => {}
    }
}

pub struct PubmedSearcher {
    client: reqwest::Client,
    email: String,
    logger: Logger,
}

impl PubmedSearcher {
    pub fn new(client: reqwest::Client, email: &str) -> Self {
        Self {
            client,
            email: email.to_string(),
            logger: Logger::for_source(PaperSource::Pubmed),
        }
    }

    fn search_term(query: &SourceQuery) -> String {
        match query.date_range.as_ref().and_then(date_filter) {
            Some(filter) => format!("({}) AND {}", query.query, filter),
            None => query.query.clone(),
        }
    }

    async fn search_ids(&self, query: &SourceQuery) -> Result<Vec<String>> {
        let url = Url::parse_with_params(
            ESEARCH_URL,
            &[
                ("db", "pubmed".to_string()),
                ("term", Self::search_term(query)),
                ("retmax", query.max_results.to_string()),
                ("retmode", "json".to_string()),
                ("sort", "relevance".to_string()),
                ("tool", TOOL.to_string()),
                ("email", self.email.clone()),
            ],
        )
        .map_err(|e| Error::Source(format!("Failed to build PubMed URL: {}", e)))?;

        let response: SearchResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.esearchresult.idlist)
    }

    async fn fetch_chunk(&self, pmids: &[String]) -> Result<Vec<Paper>> {
        let url = Url::parse_with_params(
            EFETCH_URL,
            &[
                ("db", "pubmed".to_string()),
                ("id", pmids.join(",")),
                ("retmode", "xml".to_string()),
                ("rettype", "abstract".to_string()),
                ("tool", TOOL.to_string()),
                ("email", self.email.clone()),
            ],
        )
        .map_err(|e| Error::Source(format!("Failed to build PubMed URL: {}", e)))?;

        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_articles(&body)
    }
}

#[async_trait]
impl PaperSearcher for PubmedSearcher {
    fn source(&self) -> PaperSource {
        PaperSource::Pubmed
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<Paper>> {
        self.logger.info(&format!(
            "Searching for '{}' (max {})",
            query.query, query.max_results
        ));
        let pmids = self.search_ids(query).await?;
        if pmids.is_empty() {
            self.logger.info("No PMIDs found");
            return Ok(Vec::new());
        }

        let mut papers = Vec::with_capacity(pmids.len());
        let chunks: Vec<_> = pmids.chunks(FETCH_CHUNK).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(CHUNK_DELAY).await;
            }
            papers.extend(self.fetch_chunk(chunk).await?);
        }

        self.logger.info(&format!("Found {} papers", papers.len()));
        Ok(papers)
    }
}
