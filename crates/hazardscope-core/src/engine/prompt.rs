//! Prompt-context assembly
//!
//! The engine owns prompt construction; the answer generator only ever sees
//! the finished [`PromptContext`]. The visual analysis, when present, leads
//! the reference material so the generator can cite it first.

use crate::llm::PromptContext;
use crate::rerank::RerankedResult;

/// Instruction given to the vision analyzer for hazard photos
pub const VISION_ANALYSIS_PROMPT: &str = "\
Inspect this photo for urban safety hazards. Report three parts: \
the hazard category (dimension and indicator), the specific problem \
observed, and a detailed description. Keep the description objective and \
quantitative: state what is visible, its extent, and any measurable signs \
of deterioration. Do not speculate beyond the photo.";

const REPORT_SYSTEM_PROMPT: &str = "\
You are an urban safety inspection assistant. Write a hazard assessment \
report based strictly on the reference material provided by the user. \
Cover: the hazard category, a severity judgment, the applicable standards \
(cite the bracketed source names), and recommended remediation steps. If \
the reference material does not cover the hazard, state that explicitly \
instead of inventing regulations.";

/// Build the generation prompt from the query, the visual analysis, and the
/// reranked evidence set.
pub fn assemble_prompt(
    query_text: Option<&str>,
    visual_analysis: Option<&str>,
    evidence: &RerankedResult,
) -> PromptContext {
    let mut references = Vec::new();

    if let Some(analysis) = visual_analysis {
        references.push(format!("[visual analysis]: \"{}\"", analysis));
    }

    for entry in &evidence.entries {
        let source = entry
            .candidate
            .source_path
            .as_deref()
            .map(base_name)
            .unwrap_or("retrieved document");
        references.push(format!("[{}]: \"{}\"", source, entry.candidate.content));
    }

    let question = query_text
        .filter(|q| !q.trim().is_empty())
        .or(visual_analysis)
        .unwrap_or("Assess the hazard shown in the reference material.");

    let user = format!(
        "{}\n\nReference material:\n{}",
        question,
        references.join("\n")
    );

    PromptContext {
        system: REPORT_SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Degraded answer used when both retrieval paths come back empty: the
/// visual analysis stands alone, with an explicit no-reference notice.
pub fn no_reference_answer(analysis: &str) -> String {
    format!(
        "Analysis result:\n\n{}\n\nNo matching reference material was found in \
         the knowledge base. Please consult a qualified professional for \
         further assessment.",
        analysis
    )
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
