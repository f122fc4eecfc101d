//! PDF research reports: papers, their analyses, and optional gap and scope sections.

use chrono::Utc;
use rb_core::{PaperWithAnalysis, Result};
use rb_inference::{ResearchGaps, ResearchScope};

pub mod pdf;

use pdf::{Font, PdfWriter};

const TITLE_SIZE: f32 = 22.0;
const SECTION_SIZE: f32 = 16.0;
const SUBHEADING_SIZE: f32 = 12.5;
const BODY_SIZE: f32 = 10.5;

#[derive(Debug, Clone, Default)]
pub struct ReportInput {
    pub title: String,
    pub query: String,
    pub papers: Vec<PaperWithAnalysis>,
    pub gaps: Option<ResearchGaps>,
    pub scope: Option<ResearchScope>,
}

/// Attachment filename derived from the query, e.g. `research_report_graph_neural_networks.pdf`.
pub fn report_filename(query: &str) -> String {
    let slug: String = query
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .take(8)
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() {
        "research_report.pdf".to_string()
    } else {
        format!("research_report_{}.pdf", slug)
    }
}

fn title_page(writer: &mut PdfWriter, input: &ReportInput) {
    writer.space(180.0);
    writer.centered(&input.title, Font::Bold, TITLE_SIZE);
    writer.space(24.0);
    writer.centered(&format!("Query: {}", input.query), Font::Regular, 12.0);
    writer.space(12.0);
    writer.centered(
        &format!("Generated on {}", Utc::now().format("%B %d, %Y at %H:%M UTC")),
        Font::Regular,
        11.0,
    );
    writer.centered(&format!("Papers analyzed: {}", input.papers.len()), Font::Regular, 11.0);
    writer.new_page();
}

fn papers_overview(writer: &mut PdfWriter, papers: &[PaperWithAnalysis]) {
    writer.heading("Papers Overview", SECTION_SIZE);
    for (i, entry) in papers.iter().enumerate() {
        let paper = &entry.paper;
        writer.paragraph(&format!("{}. {}", i + 1, paper.title), Font::Bold, SUBHEADING_SIZE, 0.0);
        let authors = match paper.authors.len() {
            0 => "Unknown authors".to_string(),
            1..=3 => paper.authors.join(", "),
            _ => format!("{} et al.", paper.authors[..3].join(", ")),
        };
        writer.paragraph(&format!("Authors: {}", authors), Font::Regular, BODY_SIZE, 12.0);
        writer.paragraph(
            &format!("Source: {}  |  Published: {}", paper.source.display_name(), paper.published),
            Font::Regular,
            BODY_SIZE,
            12.0,
        );
        if let Some(venue) = &paper.venue {
            writer.paragraph(&format!("Venue: {}", venue), Font::Regular, BODY_SIZE, 12.0);
        }
        if let Some(doi) = &paper.doi {
            writer.paragraph(&format!("DOI: {}", doi), Font::Regular, BODY_SIZE, 12.0);
        }
        writer.space(8.0);
    }
}

fn analyses(writer: &mut PdfWriter, papers: &[PaperWithAnalysis]) {
    let analyzed: Vec<_> = papers
        .iter()
        .filter_map(|entry| entry.analysis.as_ref().map(|a| (&entry.paper, a)))
        .collect();
    if analyzed.is_empty() {
        return;
    }
    writer.new_page();
    writer.heading("Paper Analyses", SECTION_SIZE);
    for (paper, analysis) in analyzed {
        writer.heading(&paper.title, SUBHEADING_SIZE);
        writer.paragraph("Summary", Font::Bold, BODY_SIZE, 0.0);
        writer.paragraph(&analysis.summary, Font::Regular, BODY_SIZE, 0.0);
        if !analysis.key_contributions.is_empty() {
            writer.space(4.0);
            writer.paragraph("Key Contributions", Font::Bold, BODY_SIZE, 0.0);
            writer.bullets(&analysis.key_contributions, BODY_SIZE);
        }
        if !analysis.strengths.is_empty() {
            writer.space(4.0);
            writer.paragraph("Strengths", Font::Bold, BODY_SIZE, 0.0);
            writer.bullets(&analysis.strengths, BODY_SIZE);
        }
        writer.space(12.0);
    }
}

fn gaps_section(writer: &mut PdfWriter, gaps: &ResearchGaps) {
    writer.new_page();
    writer.heading(&format!("Research Gaps: {}", gaps.domain), SECTION_SIZE);
    if !gaps.current_trends.is_empty() {
        writer.paragraph("Current Trends", Font::Bold, SUBHEADING_SIZE, 0.0);
        writer.bullets(&gaps.current_trends, BODY_SIZE);
        writer.space(8.0);
    }
    writer.paragraph("Identified Gaps", Font::Bold, SUBHEADING_SIZE, 0.0);
    for gap in &gaps.research_gaps {
        let importance: String = gap.importance.into();
        writer.paragraph(
            &format!("{} (importance: {})", gap.gap, importance),
            Font::Bold,
            BODY_SIZE,
            12.0,
        );
        if !gap.description.is_empty() {
            writer.paragraph(&gap.description, Font::Regular, BODY_SIZE, 12.0);
        }
        writer.space(4.0);
    }
}

fn scope_section(writer: &mut PdfWriter, scope: &ResearchScope) {
    writer.new_page();
    writer.heading("Research Scope", SECTION_SIZE);
    writer.paragraph(
        &format!("Research question: {}", scope.research_question),
        Font::Regular,
        BODY_SIZE,
        0.0,
    );
    writer.paragraph(
        &format!("Timeline: {} months", scope.timeline_months),
        Font::Regular,
        BODY_SIZE,
        0.0,
    );
    writer.space(8.0);
    writer.paragraph("Objectives", Font::Bold, SUBHEADING_SIZE, 0.0);
    for (i, objective) in scope.research_objectives.iter().enumerate() {
        writer.paragraph(
            &format!("{}. {}", i + 1, objective.objective),
            Font::Bold,
            BODY_SIZE,
            12.0,
        );
        if !objective.description.is_empty() {
            writer.paragraph(&objective.description, Font::Regular, BODY_SIZE, 24.0);
        }
    }
}

/// Render the report as PDF bytes.
pub fn render_pdf(input: &ReportInput) -> Result<Vec<u8>> {
    let mut writer = PdfWriter::new();
    title_page(&mut writer, input);
    papers_overview(&mut writer, &input.papers);
    analyses(&mut writer, &input.papers);
    if let Some(gaps) = &input.gaps {
        gaps_section(&mut writer, gaps);
    }
    if let Some(scope) = &input.scope {
        scope_section(&mut writer, scope);
    }

    let pages = writer.page_count();
    let bytes = writer.finish()?;
    tracing::info!(
        "Rendered report \"{}\": {} papers, {} pages, {} bytes",
        input.title,
        input.papers.len(),
        pages,
        bytes.len()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rb_core::{Analysis, Paper, PaperSource};
    use rb_inference::research::{Gap, Level, Objective};

    fn entry(i: usize) -> PaperWithAnalysis {
        let paper = Paper {
            id: format!("p{}", i),
            title: format!("A study of caf\u{e9} networks, part {}", i),
            authors: vec!["A. Author".to_string(), "B. Author".to_string()],
            abstract_text: "Abstract.".to_string(),
            published: "2023-05-01".to_string(),
            source: PaperSource::Pubmed,
            venue: Some("Journal of Tests".to_string()),
            citation_count: Some(3),
            pdf_url: None,
            doi: Some("10.1000/test".to_string()),
            keywords: vec![],
        };
        PaperWithAnalysis {
            analysis: Some(Analysis {
                paper_id: paper.id.clone(),
                summary: "word ".repeat(400),
                key_contributions: vec!["One".to_string()],
                strengths: vec!["Two".to_string()],
                weaknesses: vec![],
                research_gaps: vec![],
                future_scope: vec![],
                methodology: String::new(),
                main_findings: vec![],
                generated_at: Utc::now(),
            }),
            ..PaperWithAnalysis::bare(paper)
        }
    }

    #[test]
    fn test_report_filename() {
        assert_eq!(
            report_filename("Graph Neural Networks / drug discovery"),
            "research_report_graph_neural_networks_drug_discovery.pdf"
        );
        assert_eq!(report_filename("???"), "research_report.pdf");
    }

    #[test]
    fn test_render_full_report() {
        let input = ReportInput {
            title: "Comprehensive Research Report".to_string(),
            query: "caf\u{e9} networks".to_string(),
            papers: (0..8).map(entry).collect(),
            gaps: Some(ResearchGaps {
                domain: "Networks".to_string(),
                current_trends: vec!["Scale".to_string()],
                research_gaps: vec![Gap {
                    gap: "Evaluation".to_string(),
                    description: "Few benchmarks.".to_string(),
                    importance: Level::High,
                }],
                methodology_gaps: vec![],
                future_opportunities: vec![],
                cross_domain_connections: vec![],
                recommendations: vec![],
            }),
            scope: Some(rb_inference::ResearchScope {
                research_question: "Why?".to_string(),
                timeline_months: 12,
                research_objectives: vec![Objective {
                    objective: "Survey".to_string(),
                    description: "Map the field.".to_string(),
                    priority: Level::Medium,
                }],
                methodology: Default::default(),
                phases: vec![],
                expected_challenges: vec![],
                resources_needed: Default::default(),
                success_metrics: vec![],
                potential_outcomes: vec![],
            }),
        };

        let bytes = render_pdf(&input).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 3);
    }

    #[test]
    fn test_render_minimal_report() {
        let bytes = render_pdf(&ReportInput {
            title: "Empty".to_string(),
            ..ReportInput::default()
        })
        .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
