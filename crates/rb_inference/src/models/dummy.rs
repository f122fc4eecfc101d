use async_trait::async_trait;
use rb_core::{LanguageModel, Prompt, PromptTask, Result};
use serde_json::json;

/// Offline stand-in that answers every task with well-formed, deterministic output.
#[derive(Debug, Default)]
pub struct DummyModel;

impl DummyModel {
    pub fn new() -> Self {
        Self
    }
}

/// Value of the first `label: value` line in the prompt.
fn field<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(label))
        .map(|rest| rest.trim_start_matches(':').trim())
        .filter(|value| !value.is_empty())
}

fn analysis(prompt: &Prompt) -> String {
    let title = field(&prompt.user, "Title").unwrap_or("this paper");
    json!({
        "summary": format!("{} addresses its research problem and reports its main results in the abstract.", title),
        "key_contributions": [format!("Introduces the approach described in {}", title)],
        "strengths": ["Clearly stated problem"],
        "weaknesses": ["Evaluation details are limited to the abstract"],
        "research_gaps": ["Broader evaluation across datasets"],
        "future_scope": ["Apply the approach to related domains"],
        "methodology": "Not determinable from the abstract alone",
        "main_findings": ["Results are summarised in the abstract"]
    })
    .to_string()
}

fn gaps(prompt: &Prompt) -> String {
    let domain = field(&prompt.user, "Research domain").unwrap_or("General Research");
    json!({
        "domain": domain,
        "current_trends": [format!("Growing interest in {}", domain)],
        "research_gaps": [{
            "gap": "Limited longitudinal evaluation",
            "description": "Most studies evaluate on short time horizons.",
            "importance": "high"
        }],
        "methodology_gaps": ["Few controlled comparisons"],
        "future_opportunities": [{
            "opportunity": "Shared benchmarks",
            "description": "Common datasets would make results comparable.",
            "feasibility": "medium"
        }],
        "cross_domain_connections": ["Statistics"],
        "recommendations": ["Publish datasets alongside results"]
    })
    .to_string()
}

fn scope(prompt: &Prompt) -> String {
    let question = field(&prompt.user, "Research question").unwrap_or("the research question");
    let months: u32 = field(&prompt.user, "Timeline")
        .and_then(|t| t.split_whitespace().next()?.parse().ok())
        .unwrap_or(12);
    let review = (months / 4).max(1);
    json!({
        "research_question": question,
        "timeline_months": months,
        "research_objectives": [{
            "objective": "Map the existing literature",
            "description": format!("Survey prior work relevant to: {}", question),
            "priority": "high"
        }],
        "methodology": {
            "approach": "Mixed methods",
            "data_collection": ["Literature corpus"],
            "analysis_methods": ["Thematic analysis"],
            "tools_required": ["Reference manager"]
        },
        "phases": [
            {
                "phase": "Phase 1: Literature Review",
                "duration_months": review,
                "activities": ["Collect and read papers"],
                "deliverables": ["Annotated bibliography"]
            },
            {
                "phase": "Phase 2: Study",
                "duration_months": months.saturating_sub(review),
                "activities": ["Run the study"],
                "deliverables": ["Report"]
            }
        ],
        "expected_challenges": [{
            "challenge": "Data availability",
            "mitigation": "Identify alternative datasets early",
            "risk_level": "medium"
        }],
        "resources_needed": {
            "personnel": ["Researcher"],
            "equipment": [],
            "software": ["Statistics package"],
            "estimated_budget": "Not estimated"
        },
        "success_metrics": ["Peer-reviewed publication"],
        "potential_outcomes": ["A clearer answer to the research question"]
    })
    .to_string()
}

fn chat(prompt: &Prompt) -> String {
    let title = field(&prompt.user, "Title")
        .or_else(|| prompt.system.as_deref().and_then(|s| field(s, "Title")))
        .unwrap_or("this paper");
    let question = field(&prompt.user, "Question").unwrap_or(prompt.user.trim());
    format!(
        "Regarding \"{}\": the abstract is the best available source for \"{}\". Configure a language model API key for detailed answers.",
        title, question
    )
}

#[async_trait]
impl LanguageModel for DummyModel {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        tracing::debug!("Dummy model answering {:?}", prompt.task);
        Ok(match prompt.task {
            PromptTask::PaperAnalysis => analysis(prompt),
            PromptTask::ResearchGaps => gaps(prompt),
            PromptTask::ResearchScope => scope(prompt),
            PromptTask::PaperChat => chat(prompt),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup() {
        let text = "Analyze this paper\n  Title: Deep Nets\nAuthors: A, B\nTimeline: 6 months";
        assert_eq!(field(text, "Title"), Some("Deep Nets"));
        assert_eq!(field(text, "Timeline"), Some("6 months"));
        assert_eq!(field(text, "Venue"), None);
    }

    #[tokio::test]
    async fn test_answers_are_deterministic_json() {
        let model = DummyModel::new();
        let prompt = Prompt::new(PromptTask::PaperAnalysis, "Title: Deep Nets\nAbstract: ...");
        let first = model.generate(&prompt).await.unwrap();
        assert_eq!(first, model.generate(&prompt).await.unwrap());
        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert!(value["summary"].as_str().unwrap().contains("Deep Nets"));

        let scope = model
            .generate(&Prompt::new(PromptTask::ResearchScope, "Research question: Why?\nTimeline: 8 months"))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&scope).unwrap();
        assert_eq!(value["timeline_months"], 8);
        assert_eq!(value["phases"][0]["duration_months"], 2);
    }
}
