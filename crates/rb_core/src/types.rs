use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// External academic database a paper was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperSource {
    Arxiv,
    Pubmed,
    GoogleScholar,
    Ieee,
}

impl PaperSource {
    pub const ALL: [PaperSource; 4] = [
        PaperSource::Arxiv,
        PaperSource::Pubmed,
        PaperSource::GoogleScholar,
        PaperSource::Ieee,
    ];

    /// Sources queried when a request does not name any.
    pub fn defaults() -> Vec<PaperSource> {
        vec![PaperSource::Arxiv, PaperSource::Pubmed, PaperSource::GoogleScholar]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaperSource::Arxiv => "arxiv",
            PaperSource::Pubmed => "pubmed",
            PaperSource::GoogleScholar => "google_scholar",
            PaperSource::Ieee => "ieee",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaperSource::Arxiv => "arXiv",
            PaperSource::Pubmed => "PubMed",
            PaperSource::GoogleScholar => "Google Scholar",
            PaperSource::Ieee => "IEEE Xplore",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PaperSource::Arxiv => "Physics, Mathematics, Computer Science papers",
            PaperSource::Pubmed => "Biomedical and life science literature",
            PaperSource::GoogleScholar => "Multidisciplinary academic search (rate limited)",
            PaperSource::Ieee => "Electrical engineering and computing literature",
        }
    }
}

impl fmt::Display for PaperSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "arxiv" => Ok(PaperSource::Arxiv),
            "pubmed" => Ok(PaperSource::Pubmed),
            "google_scholar" | "scholar" | "google-scholar" => Ok(PaperSource::GoogleScholar),
            "ieee" => Ok(PaperSource::Ieee),
            other => Err(Error::Validation(format!("Unknown source: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    #[serde(alias = "date")]
    Recent,
    #[serde(alias = "citations")]
    Cited,
}

impl FromStr for SortBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "relevance" => Ok(SortBy::Relevance),
            "recent" | "date" => Ok(SortBy::Recent),
            "cited" | "citations" => Ok(SortBy::Cited),
            other => Err(Error::Validation(format!("Unknown sort order: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return Err(Error::Validation("End date must be after start date".to_string()));
            }
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    /// ISO-8601 publication date as reported by the source.
    pub published: String,
    pub source: PaperSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl Paper {
    pub fn published_date(&self) -> Option<NaiveDate> {
        let head = self.published.get(..10)?;
        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub paper_id: String,
    pub summary: String,
    #[serde(default)]
    pub key_contributions: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub research_gaps: Vec<String>,
    #[serde(default)]
    pub future_scope: Vec<String>,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub main_findings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperWithAnalysis {
    pub paper: Paper,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

impl PaperWithAnalysis {
    pub fn bare(paper: Paper) -> Self {
        Self { paper, analysis: None, analysis_error: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SearchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SearchStatus::Completed | SearchStatus::Failed)
    }

    /// Statuses only ever move forward: pending, running, then one terminal state.
    pub fn can_transition_to(&self, next: SearchStatus) -> bool {
        matches!(
            (self, next),
            (SearchStatus::Pending, SearchStatus::Running)
                | (SearchStatus::Pending, SearchStatus::Failed)
                | (SearchStatus::Running, SearchStatus::Completed)
                | (SearchStatus::Running, SearchStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStatus::Pending => "pending",
            SearchStatus::Running => "running",
            SearchStatus::Completed => "completed",
            SearchStatus::Failed => "failed",
        }
    }
}

impl FromStr for SearchStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SearchStatus::Pending),
            "running" | "processing" => Ok(SearchStatus::Running),
            "completed" => Ok(SearchStatus::Completed),
            "failed" => Ok(SearchStatus::Failed),
            other => Err(Error::Validation(format!("Unknown status: {}", other))),
        }
    }
}

fn default_max_results() -> usize {
    20
}

/// Body of a session-backed search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "PaperSource::defaults")]
    pub sources: Vec<PaperSource>,
    #[serde(default = "default_max_results", alias = "max_papers")]
    pub max_results: usize,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub generate_analysis: bool,
    #[serde(default)]
    pub dedupe: bool,
}

impl SearchRequest {
    pub const MAX_RESULTS_LIMIT: usize = 100;

    pub fn new(query: impl Into<String>, sources: Vec<PaperSource>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            sources,
            max_results,
            sort_by: SortBy::default(),
            date_range: None,
            generate_analysis: false,
            dedupe: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let query_len = self.query.trim().chars().count();
        if !(3..=500).contains(&query_len) {
            return Err(Error::Validation(
                "Query must be between 3 and 500 characters".to_string(),
            ));
        }
        if self.sources.is_empty() {
            return Err(Error::Validation("At least one source must be specified".to_string()));
        }
        if !(1..=Self::MAX_RESULTS_LIMIT).contains(&self.max_results) {
            return Err(Error::Validation(format!(
                "max_results must be between 1 and {}",
                Self::MAX_RESULTS_LIMIT
            )));
        }
        if let Some(range) = &self.date_range {
            range.validate()?;
        }
        Ok(())
    }
}

/// Server-tracked record of one search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    pub session_id: String,
    pub user_id: String,
    pub query: String,
    pub sources: Vec<PaperSource>,
    pub max_results: usize,
    pub sort_by: SortBy,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub generate_analysis: bool,
    #[serde(default)]
    pub dedupe: bool,
    pub status: SearchStatus,
    #[serde(default)]
    pub results_count: usize,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub papers: Vec<PaperWithAnalysis>,
}

impl SearchSession {
    pub fn new(user_id: impl Into<String>, request: &SearchRequest) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            query: request.query.trim().to_string(),
            sources: request.sources.clone(),
            max_results: request.max_results,
            sort_by: request.sort_by,
            date_range: request.date_range,
            generate_analysis: request.generate_analysis,
            dedupe: request.dedupe,
            status: SearchStatus::Pending,
            results_count: 0,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            papers: Vec::new(),
        }
    }

    fn transition(&mut self, next: SearchStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Validation(format!(
                "Session {} cannot move from {} to {}",
                self.session_id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(SearchStatus::Running)
    }

    pub fn complete(&mut self, papers: Vec<PaperWithAnalysis>) -> Result<()> {
        self.transition(SearchStatus::Completed)?;
        self.results_count = papers.len();
        if papers.is_empty() {
            self.error_message = Some("No papers found for the given query".to_string());
        }
        self.papers = papers;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(SearchStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn status_view(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.session_id.clone(),
            status: self.status,
            query: self.query.clone(),
            sources: self.sources.clone(),
            results_count: self.results_count,
            error_message: self.error_message.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Session record without its result payload, as returned by status polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub status: SearchStatus,
    pub query: String,
    pub sources: Vec<PaperSource>,
    pub results_count: usize,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub paper_id: String,
    pub paper: Paper,
    pub category_id: String,
    #[serde(default)]
    pub notes: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    #[serde(default)]
    pub is_default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SearchRequest {
        SearchRequest::new("machine learning", vec![PaperSource::Arxiv], 5)
    }

    #[test]
    fn test_source_round_trips_through_strings() {
        for source in PaperSource::ALL {
            assert_eq!(source.as_str().parse::<PaperSource>().unwrap(), source);
        }
        assert_eq!("scholar".parse::<PaperSource>().unwrap(), PaperSource::GoogleScholar);
        assert!("jstor".parse::<PaperSource>().is_err());
        assert_eq!(
            serde_json::to_string(&PaperSource::GoogleScholar).unwrap(),
            "\"google_scholar\""
        );
    }

    #[test]
    fn test_search_request_validation() {
        assert!(request().validate().is_ok());

        let mut short = request();
        short.query = "ml".to_string();
        assert!(matches!(short.validate(), Err(Error::Validation(_))));

        let mut no_sources = request();
        no_sources.sources.clear();
        assert!(no_sources.validate().is_err());

        let mut too_many = request();
        too_many.max_results = 101;
        assert!(too_many.validate().is_err());

        let mut backwards = request();
        backwards.date_range = Some(DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 1),
            end: NaiveDate::from_ymd_opt(2023, 1, 1),
        });
        assert!(backwards.validate().is_err());
    }

    #[test]
    fn test_search_request_defaults() {
        let parsed: SearchRequest = serde_json::from_str(r#"{"query": "graph neural networks"}"#).unwrap();
        assert_eq!(parsed.max_results, 20);
        assert_eq!(parsed.sort_by, SortBy::Relevance);
        assert_eq!(parsed.sources, PaperSource::defaults());
        assert!(!parsed.generate_analysis);
    }

    #[test]
    fn test_session_status_only_moves_forward() {
        let mut session = SearchSession::new("alice", &request());
        assert_eq!(session.status, SearchStatus::Pending);
        assert!(session.complete(vec![]).is_err());

        session.start().unwrap();
        assert_eq!(session.status, SearchStatus::Running);
        assert!(session.start().is_err());

        session.complete(vec![]).unwrap();
        assert_eq!(session.status, SearchStatus::Completed);
        assert!(session.completed_at.is_some());
        assert!(session.fail("late failure").is_err());
        assert!(session.start().is_err());
        assert_eq!(session.status, SearchStatus::Completed);
    }

    #[test]
    fn test_failed_session_keeps_message() {
        let mut session = SearchSession::new("alice", &request());
        session.start().unwrap();
        session.fail("all sources down").unwrap();
        let view = session.status_view();
        assert_eq!(view.status, SearchStatus::Failed);
        assert_eq!(view.error_message.as_deref(), Some("all sources down"));
    }

    #[test]
    fn test_paper_abstract_field_name() {
        let paper = Paper {
            id: "http://arxiv.org/abs/1234.5678v1".to_string(),
            title: "A Paper".to_string(),
            authors: vec!["Ada Lovelace".to_string()],
            abstract_text: "We study things.".to_string(),
            published: "2023-05-04T00:00:00Z".to_string(),
            source: PaperSource::Arxiv,
            venue: None,
            citation_count: None,
            pdf_url: None,
            doi: None,
            keywords: vec![],
        };
        let json = serde_json::to_value(&paper).unwrap();
        assert_eq!(json["abstract"], "We study things.");
        assert_eq!(json["source"], "arxiv");
        assert_eq!(paper.published_date(), NaiveDate::from_ymd_opt(2023, 5, 4));
    }

    #[test]
    fn test_date_range_contains() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2020, 1, 1),
            end: None,
        };
        assert!(range.contains(NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2019, 12, 31).unwrap()));
    }
}
