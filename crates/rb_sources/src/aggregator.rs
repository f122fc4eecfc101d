use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rb_core::{
    Error, Paper, PaperSearcher, PaperSource, Result, SearchRequest, SortBy, SourceQuery,
};
use serde::Serialize;

use crate::logging::Logger;
use crate::{default_searchers, SourcesConfig};

const TITLE_SIMILARITY_THRESHOLD: f64 = 0.85;

/// How a single source fared during a fan-out search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    pub source: PaperSource,
    pub papers_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub papers: Vec<Paper>,
    pub outcomes: Vec<SourceOutcome>,
}

impl AggregateResult {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

pub struct SearchAggregator {
    searchers: Vec<Arc<dyn PaperSearcher>>,
    source_timeout: Duration,
}

impl SearchAggregator {
    pub fn new(searchers: Vec<Arc<dyn PaperSearcher>>, source_timeout: Duration) -> Self {
        Self {
            searchers,
            source_timeout,
        }
    }

    pub fn from_config(config: &SourcesConfig) -> Result<Self> {
        Ok(Self::new(default_searchers(config)?, config.source_timeout))
    }

    pub fn available_sources(&self) -> Vec<PaperSource> {
        self.searchers.iter().map(|s| s.source()).collect()
    }

    fn searcher(&self, source: PaperSource) -> Option<&Arc<dyn PaperSearcher>> {
        self.searchers.iter().find(|s| s.source() == source)
    }

    /// Fail early when any of `sources` would refuse this user right now.
    pub fn check_quotas(&self, sources: &[PaperSource], user_id: &str) -> Result<()> {
        for source in sources {
            if let Some(searcher) = self.searcher(*source) {
                searcher.check_quota(user_id)?;
            }
        }
        Ok(())
    }

    async fn run_one(&self, searcher: Arc<dyn PaperSearcher>, query: SourceQuery) -> (PaperSource, Result<Vec<Paper>>) {
        let source = searcher.source();
        let result = match tokio::time::timeout(self.source_timeout, searcher.search(&query)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Source(format!("timed out after {:?}", self.source_timeout))),
        };
        (source, result)
    }

    pub async fn search_single_source(&self, source: PaperSource, query: &SourceQuery) -> Result<Vec<Paper>> {
        let searcher = self
            .searcher(source)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("Unknown source: {}", source)))?;
        self.run_one(searcher, query.clone()).await.1
    }

    /// Query every requested source at once. Failing sources contribute no papers.
    pub async fn search(&self, request: &SearchRequest, user_id: &str) -> AggregateResult {
        let mut seen = BTreeSet::new();
        let sources: Vec<PaperSource> = request
            .sources
            .iter()
            .copied()
            .filter(|s| seen.insert(*s))
            .collect();
        if sources.is_empty() {
            return AggregateResult::default();
        }

        let per_source = (request.max_results / sources.len()).max(1);
        let query = SourceQuery {
            query: request.query.trim().to_string(),
            max_results: per_source,
            date_range: request.date_range,
            user_id: user_id.to_string(),
        };

        let mut outcomes = Vec::new();
        let mut futures = Vec::new();
        for source in &sources {
            match self.searcher(*source) {
                Some(searcher) => futures.push(self.run_one(searcher.clone(), query.clone())),
                None => {
                    Logger::for_source(*source).warn("Source not configured, skipping");
                    outcomes.push(SourceOutcome {
                        source: *source,
                        papers_found: 0,
                        error: Some("source not configured".to_string()),
                    });
                }
            }
        }

        let mut papers = Vec::new();
        for (source, result) in join_all(futures).await {
            let logger = Logger::for_source(source);
            match result {
                Ok(found) => {
                    logger.debug(&format!("Returned {} papers", found.len()));
                    outcomes.push(SourceOutcome {
                        source,
                        papers_found: found.len(),
                        error: None,
                    });
                    papers.extend(found);
                }
                Err(e) => {
                    logger.error(&format!("Search failed: {}", e));
                    outcomes.push(SourceOutcome {
                        source,
                        papers_found: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if request.dedupe {
            let before = papers.len();
            papers = dedupe(papers);
            tracing::debug!("Deduplicated {} papers to {}", before, papers.len());
        }
        let mut papers = sort_papers(papers, request.sort_by);
        papers.truncate(request.max_results);

        tracing::info!(
            "Search '{}' returned {} papers from {} sources",
            query.query,
            papers.len(),
            sources.len()
        );
        AggregateResult { papers, outcomes }
    }
}

/// Lowercase, strip punctuation and squash whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Jaccard similarity of the word sets of two normalised titles.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let shared = words_a.intersection(&words_b).count();
    let total = words_a.union(&words_b).count();
    shared as f64 / total as f64
}

/// Drop papers whose DOI was already seen or whose title is near-identical to an earlier one.
pub fn dedupe(papers: Vec<Paper>) -> Vec<Paper> {
    let mut dois = HashSet::new();
    let mut titles: Vec<String> = Vec::new();
    let mut unique = Vec::with_capacity(papers.len());

    for paper in papers {
        if let Some(doi) = paper.doi.as_deref().map(|d| d.trim().to_lowercase()) {
            if !doi.is_empty() && !dois.insert(doi) {
                continue;
            }
        }
        let title = normalize_title(&paper.title);
        if !title.is_empty()
            && titles
                .iter()
                .any(|seen| title_similarity(&title, seen) > TITLE_SIMILARITY_THRESHOLD)
        {
            continue;
        }
        titles.push(title);
        unique.push(paper);
    }
    unique
}

pub fn sort_papers(mut papers: Vec<Paper>, sort_by: SortBy) -> Vec<Paper> {
    match sort_by {
        SortBy::Recent => {
            papers.sort_by(|a, b| b.published_date().cmp(&a.published_date()));
            papers
        }
        SortBy::Cited => {
            // None sorts below every count, so unknown counts end up last
            papers.sort_by(|a, b| {
                (b.citation_count, b.published_date()).cmp(&(a.citation_count, a.published_date()))
            });
            papers
        }
        SortBy::Relevance => interleave_by_source(papers),
    }
}

/// Round-robin over sources, keeping each source's own ranking.
fn interleave_by_source(papers: Vec<Paper>) -> Vec<Paper> {
    let mut groups: Vec<(PaperSource, Vec<Paper>)> = Vec::new();
    for paper in papers {
        match groups.iter_mut().find(|(source, _)| *source == paper.source) {
            Some((_, group)) => group.push(paper),
            None => groups.push((paper.source, vec![paper])),
        }
    }

    let total = groups.iter().map(|(_, g)| g.len()).sum();
    let mut iters: Vec<_> = groups.into_iter().map(|(_, g)| g.into_iter()).collect();
    let mut ordered = Vec::with_capacity(total);
    while ordered.len() < total {
        for iter in iters.iter_mut() {
            if let Some(paper) = iter.next() {
                ordered.push(paper);
            }
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn paper(source: PaperSource, title: &str, published: &str, citations: Option<u64>) -> Paper {
        Paper {
            id: format!("{}-{}", source, title),
            title: title.to_string(),
            authors: vec![],
            abstract_text: String::new(),
            published: published.to_string(),
            source,
            venue: None,
            citation_count: citations,
            pdf_url: None,
            doi: None,
            keywords: vec![],
        }
    }

    struct StubSearcher {
        source: PaperSource,
        count: usize,
        fail: bool,
        delay: Option<Duration>,
        requested: AtomicUsize,
    }

    impl StubSearcher {
        fn new(source: PaperSource, count: usize) -> Self {
            Self {
                source,
                count,
                fail: false,
                delay: None,
                requested: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PaperSearcher for StubSearcher {
        fn source(&self) -> PaperSource {
            self.source
        }

        async fn search(&self, query: &SourceQuery) -> Result<Vec<Paper>> {
            self.requested.store(query.max_results, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(Error::Source("boom".to_string()));
            }
            Ok((0..self.count.min(query.max_results))
                .map(|i| {
                    paper(
                        self.source,
                        &format!("{} paper {}", self.source, i),
                        &format!("202{}-01-01T00:00:00Z", i % 10),
                        None,
                    )
                })
                .collect())
        }
    }

    fn shared(searcher: StubSearcher) -> Arc<dyn PaperSearcher> {
        Arc::new(searcher)
    }

    fn aggregator(searchers: Vec<Arc<dyn PaperSearcher>>) -> SearchAggregator {
        SearchAggregator::new(searchers, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_failed_source_does_not_fail_search() {
        let mut broken = StubSearcher::new(PaperSource::Pubmed, 5);
        broken.fail = true;
        let agg = aggregator(vec![shared(StubSearcher::new(PaperSource::Arxiv, 5)), shared(broken)]);

        let request = SearchRequest::new("neural nets", vec![PaperSource::Arxiv, PaperSource::Pubmed], 10);
        let result = agg.search(&request, "anonymous").await;
        assert_eq!(result.papers.len(), 5);
        assert!(result.papers.iter().all(|p| p.source == PaperSource::Arxiv));
        let failed: Vec<_> = result.failed_sources().map(|o| o.source).collect();
        assert_eq!(failed, vec![PaperSource::Pubmed]);
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let mut slow = StubSearcher::new(PaperSource::GoogleScholar, 5);
        slow.delay = Some(Duration::from_secs(5));
        let agg = aggregator(vec![shared(StubSearcher::new(PaperSource::Arxiv, 2)), shared(slow)]);

        let request = SearchRequest::new(
            "neural nets",
            vec![PaperSource::Arxiv, PaperSource::GoogleScholar],
            10,
        );
        let result = agg.search(&request, "anonymous").await;
        assert_eq!(result.papers.len(), 2);
        let scholar = result
            .outcomes
            .iter()
            .find(|o| o.source == PaperSource::GoogleScholar)
            .unwrap();
        assert!(scholar.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cap_split_across_sources_and_truncated() {
        let arxiv = Arc::new(StubSearcher::new(PaperSource::Arxiv, 50));
        let pubmed = Arc::new(StubSearcher::new(PaperSource::Pubmed, 50));
        let agg = aggregator(vec![
            arxiv.clone() as Arc<dyn PaperSearcher>,
            pubmed.clone() as Arc<dyn PaperSearcher>,
        ]);

        let request = SearchRequest::new("neural nets", vec![PaperSource::Arxiv, PaperSource::Pubmed], 7);
        let result = agg.search(&request, "anonymous").await;
        assert_eq!(arxiv.requested.load(Ordering::SeqCst), 3);
        assert_eq!(pubmed.requested.load(Ordering::SeqCst), 3);
        assert!(result.papers.len() <= 7);

        let tiny = SearchRequest::new("neural nets", vec![PaperSource::Arxiv, PaperSource::Pubmed], 1);
        let result = agg.search(&tiny, "anonymous").await;
        assert_eq!(arxiv.requested.load(Ordering::SeqCst), 1);
        assert_eq!(result.papers.len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_source_is_skipped() {
        let agg = aggregator(vec![shared(StubSearcher::new(PaperSource::Arxiv, 2))]);
        let request = SearchRequest::new("neural nets", vec![PaperSource::Arxiv, PaperSource::Ieee], 10);
        let result = agg.search(&request, "anonymous").await;
        assert_eq!(result.papers.len(), 2);
        assert_eq!(result.failed_sources().count(), 1);

        assert!(matches!(
            agg.search_single_source(PaperSource::Ieee, &SourceQuery::new("x", 1)).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(agg.available_sources(), vec![PaperSource::Arxiv]);
    }

    #[test]
    fn test_relevance_interleaves_sources() {
        let papers = vec![
            paper(PaperSource::Arxiv, "a1", "2020-01-01", None),
            paper(PaperSource::Arxiv, "a2", "2020-01-01", None),
            paper(PaperSource::Arxiv, "a3", "2020-01-01", None),
            paper(PaperSource::Pubmed, "p1", "2020-01-01", None),
            paper(PaperSource::GoogleScholar, "s1", "2020-01-01", None),
            paper(PaperSource::GoogleScholar, "s2", "2020-01-01", None),
        ];
        let titles: Vec<_> = sort_papers(papers, SortBy::Relevance)
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["a1", "p1", "s1", "a2", "s2", "a3"]);
    }

    #[test]
    fn test_recent_sort() {
        let papers = vec![
            paper(PaperSource::Arxiv, "old", "2019-05-01T00:00:00Z", None),
            paper(PaperSource::Arxiv, "undated", "unknown", None),
            paper(PaperSource::Pubmed, "new", "2024-02-01T00:00:00Z", None),
        ];
        let titles: Vec<_> = sort_papers(papers, SortBy::Recent)
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["new", "old", "undated"]);
    }

    #[test]
    fn test_cited_sort_puts_unknown_last() {
        let papers = vec![
            paper(PaperSource::Arxiv, "unknown", "2024-01-01", None),
            paper(PaperSource::GoogleScholar, "few", "2020-01-01", Some(3)),
            paper(PaperSource::GoogleScholar, "many-old", "2018-01-01", Some(90)),
            paper(PaperSource::Ieee, "many-new", "2022-01-01", Some(90)),
            paper(PaperSource::Ieee, "zero", "2022-01-01", Some(0)),
        ];
        let titles: Vec<_> = sort_papers(papers, SortBy::Cited)
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["many-new", "many-old", "few", "zero", "unknown"]);
    }

    #[test]
    fn test_dedupe_by_doi_and_title() {
        let mut a = paper(PaperSource::Arxiv, "Attention Is All You Need", "2017-01-01", None);
        a.doi = Some("10.5555/3295222".to_string());
        let mut b = paper(PaperSource::GoogleScholar, "Something else entirely", "2017-01-01", None);
        b.doi = Some("10.5555/3295222".to_string());
        let c = paper(PaperSource::Pubmed, "Attention is all you need!", "2017-01-01", None);
        let d = paper(PaperSource::Pubmed, "Attention is not all you need", "2021-01-01", None);

        let titles: Vec<_> = dedupe(vec![a, b, c, d]).into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["Attention Is All You Need", "Attention is not all you need"]);
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("a b c", "a b c"), 1.0);
        assert_eq!(title_similarity("", "a"), 0.0);
        assert!((title_similarity("a b", "b c") - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(normalize_title("  Deep   Learning: A Review! "), "deep learning a review");
    }
}
