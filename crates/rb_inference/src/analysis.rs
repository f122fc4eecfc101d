use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use rb_core::{Analysis, Error, LanguageModel, Paper, PaperWithAnalysis, Prompt, PromptTask, Result};
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::json::parse_reply;

const DEFAULT_CONCURRENCY: usize = 3;

const ANALYSIS_SYSTEM: &str = "You are an expert research analyst. \
Answer with a single JSON object and nothing else.";

/// Fields the model is asked to return; everything but `summary` may be absent.
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_contributions: Vec<String>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    research_gaps: Vec<String>,
    #[serde(default)]
    future_scope: Vec<String>,
    #[serde(default)]
    methodology: String,
    #[serde(default)]
    main_findings: Vec<String>,
}

pub fn analysis_prompt(paper: &Paper) -> Prompt {
    let user = format!(
        "Analyze the following research paper.\n\n\
         Title: {}\n\
         Authors: {}\n\
         Published: {}\n\
         Source: {}\n\
         Venue: {}\n\
         Abstract: {}\n\n\
         Return JSON with the keys: summary (2-3 sentences), key_contributions, \
         strengths, weaknesses, research_gaps, future_scope (lists of strings), \
         methodology (string) and main_findings (list of strings).",
        paper.title,
        if paper.authors.is_empty() { "Unknown".to_string() } else { paper.authors.join(", ") },
        paper.published,
        paper.source.display_name(),
        paper.venue.as_deref().unwrap_or("Unknown"),
        paper.abstract_text,
    );
    Prompt::new(PromptTask::PaperAnalysis, user)
        .with_system(ANALYSIS_SYSTEM)
        .with_temperature(0.3)
}

/// Decode a model reply into an [`Analysis`] for `paper_id`.
pub fn parse_analysis(paper_id: &str, raw: &str) -> Result<Analysis> {
    let payload: AnalysisPayload = parse_reply(raw, "analysis")?;
    if payload.summary.trim().is_empty() {
        return Err(Error::InvalidResponse("analysis is missing a summary".to_string()));
    }
    Ok(Analysis {
        paper_id: paper_id.to_string(),
        summary: payload.summary.trim().to_string(),
        key_contributions: payload.key_contributions,
        strengths: payload.strengths,
        weaknesses: payload.weaknesses,
        research_gaps: payload.research_gaps,
        future_scope: payload.future_scope,
        methodology: payload.methodology,
        main_findings: payload.main_findings,
        generated_at: Utc::now(),
    })
}

/// Turns papers into structured analyses with a shared language model.
#[derive(Debug, Clone)]
pub struct AnalysisGenerator {
    pub(crate) model: Arc<dyn LanguageModel>,
    concurrency: usize,
}

impl AnalysisGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub async fn analyze(&self, paper: &Paper) -> Result<Analysis> {
        let raw = self.model.generate(&analysis_prompt(paper)).await?;
        parse_analysis(&paper.id, &raw)
    }

    /// Analyze every paper, at most `concurrency` at a time. Output order
    /// matches input order and a failed paper carries its error instead of
    /// an analysis.
    pub async fn analyze_batch(&self, papers: Vec<Paper>) -> Vec<PaperWithAnalysis> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let tasks = papers.into_iter().map(|paper| {
            let permits = permits.clone();
            async move {
                let _permit = match permits.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return PaperWithAnalysis {
                            analysis_error: Some(e.to_string()),
                            ..PaperWithAnalysis::bare(paper)
                        }
                    }
                };
                match self.analyze(&paper).await {
                    Ok(analysis) => PaperWithAnalysis {
                        analysis: Some(analysis),
                        ..PaperWithAnalysis::bare(paper)
                    },
                    Err(e) => {
                        tracing::warn!("Analysis failed for {}: {}", paper.id, e);
                        PaperWithAnalysis {
                            analysis_error: Some(e.to_string()),
                            ..PaperWithAnalysis::bare(paper)
                        }
                    }
                }
            }
        });

        let results = join_all(tasks).await;
        tracing::info!(
            "Generated {} of {} analyses with {}",
            results.iter().filter(|r| r.analysis.is_some()).count(),
            results.len(),
            self.model.name()
        );
        results
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::DummyModel;
    use async_trait::async_trait;
    use rb_core::PaperSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn paper(id: &str, title: &str) -> Paper {
        Paper {
            id: id.to_string(),
            title: title.to_string(),
            authors: vec!["Ada Lovelace".to_string()],
            abstract_text: "We study things.".to_string(),
            published: "2024-01-15".to_string(),
            source: PaperSource::Arxiv,
            venue: Some("arXiv".to_string()),
            citation_count: None,
            pdf_url: None,
            doi: None,
            keywords: vec![],
        }
    }

    /// Answers with prose for titles containing "broken", JSON otherwise.
    #[derive(Debug, Default)]
    struct ScriptedModel {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &Prompt) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if prompt.user.contains("broken") {
                Ok("Sorry, I cannot analyze this paper.".to_string())
            } else {
                Ok("```json\n{\"summary\": \"Fine.\", \"strengths\": [\"clear\"]}\n```".to_string())
            }
        }
    }

    #[test]
    fn test_prompt_carries_paper_fields() {
        let prompt = analysis_prompt(&paper("p1", "Graph Learning"));
        assert_eq!(prompt.task, PromptTask::PaperAnalysis);
        assert!(prompt.user.contains("Title: Graph Learning"));
        assert!(prompt.user.contains("Authors: Ada Lovelace"));
        assert!(prompt.user.contains("Venue: arXiv"));
    }

    #[test]
    fn test_parse_analysis_requires_summary() {
        let analysis = parse_analysis("p1", r#"{"summary": " Good. ", "methodology": "survey"}"#).unwrap();
        assert_eq!(analysis.summary, "Good.");
        assert_eq!(analysis.paper_id, "p1");
        assert!(analysis.key_contributions.is_empty());

        assert!(matches!(
            parse_analysis("p1", r#"{"strengths": ["x"]}"#),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_and_keeps_order() {
        let model = Arc::new(ScriptedModel::default());
        let generator = AnalysisGenerator::new(model.clone());
        let papers = vec![
            paper("a", "First"),
            paper("b", "A broken one"),
            paper("c", "Third"),
            paper("d", "Fourth"),
            paper("e", "Fifth"),
        ];

        let results = generator.analyze_batch(papers).await;
        let ids: Vec<_> = results.iter().map(|r| r.paper.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert!(results[1].analysis.is_none());
        assert!(results[1].analysis_error.is_some());
        assert_eq!(results.iter().filter(|r| r.analysis.is_some()).count(), 4);
        assert!(model.peak.load(Ordering::SeqCst) <= DEFAULT_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_dummy_model_analysis() {
        let generator = AnalysisGenerator::new(Arc::new(DummyModel::new()));
        let analysis = generator.analyze(&paper("p1", "Graph Learning")).await.unwrap();
        assert!(analysis.summary.contains("Graph Learning"));
        assert!(!analysis.strengths.is_empty());
    }
}
