use rb_core::{Error, Paper, Prompt, PromptTask, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisGenerator;
use crate::json::parse_reply;

const GAPS_PAPER_LIMIT: usize = 10;
const GAPS_ABSTRACT_CHARS: usize = 500;
const SCOPE_PAPER_LIMIT: usize = 8;
const SCOPE_ABSTRACT_CHARS: usize = 400;

/// Importance, feasibility, priority or risk as rated by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Level {
    High,
    Medium,
    Low,
}

impl From<String> for Level {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" | "critical" => Level::High,
            "low" => Level::Low,
            _ => Level::Medium,
        }
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        match level {
            Level::High => "high",
            Level::Medium => "medium",
            Level::Low => "low",
        }
        .to_string()
    }
}

fn default_level() -> Level {
    Level::Medium
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub gap: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_level")]
    pub importance: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_level")]
    pub feasibility: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchGaps {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub current_trends: Vec<String>,
    #[serde(default)]
    pub research_gaps: Vec<Gap>,
    #[serde(default)]
    pub methodology_gaps: Vec<String>,
    #[serde(default)]
    pub future_opportunities: Vec<Opportunity>,
    #[serde(default)]
    pub cross_domain_connections: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub objective: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_level")]
    pub priority: Level,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Methodology {
    #[serde(default)]
    pub approach: String,
    #[serde(default)]
    pub data_collection: Vec<String>,
    #[serde(default)]
    pub analysis_methods: Vec<String>,
    #[serde(default)]
    pub tools_required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub phase: String,
    #[serde(default)]
    pub duration_months: f64,
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default)]
    pub deliverables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge: String,
    #[serde(default)]
    pub mitigation: String,
    #[serde(default = "default_level")]
    pub risk_level: Level,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub personnel: Vec<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub software: Vec<String>,
    #[serde(default)]
    pub estimated_budget: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchScope {
    #[serde(default)]
    pub research_question: String,
    #[serde(default)]
    pub timeline_months: u32,
    #[serde(default)]
    pub research_objectives: Vec<Objective>,
    #[serde(default)]
    pub methodology: Methodology,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub expected_challenges: Vec<Challenge>,
    #[serde(default)]
    pub resources_needed: Resources,
    #[serde(default)]
    pub success_metrics: Vec<String>,
    #[serde(default)]
    pub potential_outcomes: Vec<String>,
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn paper_digest(papers: &[Paper], limit: usize, abstract_chars: usize) -> String {
    papers
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, paper)| {
            format!(
                "Paper {}:\nTitle: {}\nAuthors: {}\nAbstract: {}\n",
                i + 1,
                paper.title,
                paper.authors.join(", "),
                truncate(&paper.abstract_text, abstract_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn gaps_prompt(papers: &[Paper], domain: &str) -> Prompt {
    let user = format!(
        "Identify research gaps across the papers below.\n\n\
         Research domain: {}\n\n{}\n\
         Return JSON with the keys: domain, current_trends (list), research_gaps \
         (list of {{gap, description, importance: high|medium|low}}), methodology_gaps (list), \
         future_opportunities (list of {{opportunity, description, feasibility: high|medium|low}}), \
         cross_domain_connections (list) and recommendations (list).",
        domain,
        paper_digest(papers, GAPS_PAPER_LIMIT, GAPS_ABSTRACT_CHARS)
    );
    Prompt::new(PromptTask::ResearchGaps, user)
        .with_system("You are a senior researcher mapping open problems. Answer with JSON only.")
        .with_temperature(0.4)
}

pub fn scope_prompt(papers: &[Paper], question: &str, timeline_months: u32) -> Prompt {
    let user = format!(
        "Draft a research plan grounded in the papers below.\n\n\
         Research question: {}\n\
         Timeline: {} months\n\n{}\n\
         Return JSON with the keys: research_question, timeline_months, research_objectives \
         (list of {{objective, description, priority}}), methodology {{approach, data_collection, \
         analysis_methods, tools_required}}, phases (list of {{phase, duration_months, activities, \
         deliverables}}), expected_challenges (list of {{challenge, mitigation, risk_level}}), \
         resources_needed {{personnel, equipment, software, estimated_budget}}, success_metrics \
         and potential_outcomes.",
        question,
        timeline_months,
        paper_digest(papers, SCOPE_PAPER_LIMIT, SCOPE_ABSTRACT_CHARS)
    );
    Prompt::new(PromptTask::ResearchScope, user)
        .with_system("You are a research planning advisor. Answer with JSON only.")
        .with_temperature(0.5)
        .with_max_output_tokens(6000)
}

pub fn parse_gaps(raw: &str, domain: &str) -> Result<ResearchGaps> {
    let mut gaps: ResearchGaps = parse_reply(raw, "research gaps")?;
    if gaps.research_gaps.is_empty() {
        return Err(Error::InvalidResponse("research gaps reply lists no gaps".to_string()));
    }
    gaps.domain = domain.to_string();
    Ok(gaps)
}

pub fn parse_scope(raw: &str, question: &str, timeline_months: u32) -> Result<ResearchScope> {
    let mut scope: ResearchScope = parse_reply(raw, "research scope")?;
    if scope.research_objectives.is_empty() {
        return Err(Error::InvalidResponse("research scope reply lists no objectives".to_string()));
    }
    scope.research_question = question.to_string();
    scope.timeline_months = timeline_months;
    Ok(scope)
}

impl AnalysisGenerator {
    pub async fn research_gaps(&self, papers: &[Paper], domain: &str) -> Result<ResearchGaps> {
        if papers.is_empty() {
            return Err(Error::Validation("No papers to analyze for research gaps".to_string()));
        }
        let raw = self.model.generate(&gaps_prompt(papers, domain)).await?;
        parse_gaps(&raw, domain)
    }

    pub async fn research_scope(
        &self,
        papers: &[Paper],
        question: &str,
        timeline_months: u32,
    ) -> Result<ResearchScope> {
        if papers.is_empty() {
            return Err(Error::Validation("No papers to ground the research scope".to_string()));
        }
        let raw = self
            .model
            .generate(&scope_prompt(papers, question, timeline_months))
            .await?;
        parse_scope(&raw, question, timeline_months)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::paper;
    use crate::models::DummyModel;
    use std::sync::Arc;

    #[test]
    fn test_level_is_lenient() {
        let gap: Gap = serde_json::from_str(r#"{"gap": "x", "importance": "HIGH"}"#).unwrap();
        assert_eq!(gap.importance, Level::High);
        let gap: Gap = serde_json::from_str(r#"{"gap": "x", "importance": "moderate"}"#).unwrap();
        assert_eq!(gap.importance, Level::Medium);
        assert_eq!(serde_json::to_value(Level::Low).unwrap(), "low");
    }

    #[test]
    fn test_prompts_limit_papers_and_abstracts() {
        let mut papers: Vec<Paper> = (0..12).map(|i| paper(&format!("p{}", i), &format!("Paper {}", i))).collect();
        papers[0].abstract_text = "a".repeat(900);

        let prompt = gaps_prompt(&papers, "NLP");
        assert!(prompt.user.contains("Paper 10:"));
        assert!(!prompt.user.contains("Paper 11:"));
        assert!(prompt.user.contains(&format!("{}...", "a".repeat(500))));
        assert!(!prompt.user.contains(&"a".repeat(501)));

        let prompt = scope_prompt(&papers, "Why?", 6);
        assert!(prompt.user.contains("Paper 8:"));
        assert!(!prompt.user.contains("Paper 9:"));
        assert_eq!(prompt.max_output_tokens, 6000);
    }

    #[test]
    fn test_parse_rejects_empty_sections() {
        assert!(parse_gaps(r#"{"current_trends": ["x"]}"#, "NLP").is_err());
        assert!(parse_scope(r#"{"phases": []}"#, "Why?", 12).is_err());
        assert!(parse_gaps("not json", "NLP").is_err());
    }

    #[tokio::test]
    async fn test_request_values_override_reply() {
        let generator = AnalysisGenerator::new(Arc::new(DummyModel::new()));
        let papers = vec![paper("p1", "Transformers")];

        let gaps = generator.research_gaps(&papers, "Machine Learning").await.unwrap();
        assert_eq!(gaps.domain, "Machine Learning");
        assert!(!gaps.research_gaps.is_empty());

        let scope = generator
            .research_scope(&papers, "Can transformers reason?", 18)
            .await
            .unwrap();
        assert_eq!(scope.research_question, "Can transformers reason?");
        assert_eq!(scope.timeline_months, 18);
        assert!(!scope.research_objectives.is_empty());

        assert!(generator.research_gaps(&[], "x").await.is_err());
    }
}
