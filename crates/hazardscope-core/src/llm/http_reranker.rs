//! HTTP-based relevance model using an external LLM service
//!
//! Scores query/document pairs with a single JSON-prompted chat call. A
//! malformed model response degrades to neutral scores rather than failing
//! the whole retrieval pass.

use super::{ChatMessage, OpenAiClient, RelevanceDocument, RelevanceModel, RelevanceScore};
use crate::config::LLMServiceConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Maximum documents scored per call, to bound prompt size
const MAX_SCORED_DOCS: usize = 10;

/// Maximum characters of each document included in the scoring prompt
const MAX_DOC_CHARS: usize = 200;

/// Relevance model backed by an external chat service
pub struct HttpRelevanceModel {
    client: Arc<OpenAiClient>,
}

impl HttpRelevanceModel {
    /// Create from a shared client
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }

    /// Create from configuration
    pub fn from_config(config: LLMServiceConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(OpenAiClient::new(config)?)))
    }
}

#[async_trait]
impl RelevanceModel for HttpRelevanceModel {
    async fn score(
        &self,
        query: &str,
        documents: &[RelevanceDocument],
    ) -> Result<Vec<RelevanceScore>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let docs_to_score = if documents.len() > MAX_SCORED_DOCS {
            &documents[..MAX_SCORED_DOCS]
        } else {
            documents
        };

        let prompt = build_scoring_prompt(query, docs_to_score);

        let messages = vec![
            ChatMessage::system(
                "Score document relevance to the query. Output ONLY JSON: \
                 {\"scores\": [0.0-1.0, ...]} with one score per document, in order.",
            ),
            ChatMessage::user(prompt),
        ];

        let response = self
            .client
            .chat_completion(&self.client.config().model, messages)
            .await?;

        Ok(parse_scoring_response(&response, docs_to_score))
    }

    fn model_name(&self) -> &str {
        &self.client.config().model
    }
}

fn build_scoring_prompt(query: &str, documents: &[RelevanceDocument]) -> String {
    let mut prompt = format!("Q: \"{}\"\nDocs:\n", query);

    for (idx, doc) in documents.iter().enumerate() {
        let text: String = doc.text.chars().take(MAX_DOC_CHARS).collect();
        prompt.push_str(&format!("[{}] {}\n", idx, text));
    }

    prompt.push_str("\nScore 0-1 JSON:\n{\"scores\":[0.0,...]}\n");
    prompt
}

fn parse_scoring_response(response: &str, documents: &[RelevanceDocument]) -> Vec<RelevanceScore> {
    let neutral = |documents: &[RelevanceDocument]| {
        documents
            .iter()
            .map(|doc| RelevanceScore {
                id: doc.id.clone(),
                score: 0.5,
            })
            .collect()
    };

    // Extract the JSON object from a possibly chatty response
    let json_str = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => {
            tracing::warn!("no JSON in relevance response, using neutral scores");
            return neutral(documents);
        }
    };

    let parsed: serde_json::Value = match serde_json::from_str(json_str) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse relevance JSON, using neutral scores");
            return neutral(documents);
        }
    };

    match parsed["scores"].as_array() {
        Some(scores) => documents
            .iter()
            .enumerate()
            .map(|(idx, doc)| RelevanceScore {
                id: doc.id.clone(),
                score: scores.get(idx).and_then(|v| v.as_f64()).unwrap_or(0.5),
            })
            .collect(),
        None => neutral(documents),
    }
}
