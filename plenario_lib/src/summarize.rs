//! Contract for the generative text service.
//!
//! The service itself lives elsewhere and is consumed as a black box:
//! text in, summary out; summary in, structured JSON score out. It may
//! fail or return malformed JSON, which maps onto the record-level error
//! policy — the caller keeps the record unsummarized and moves on.

use serde_json::Value;

use crate::error::PipelineError;
use crate::sources::BoxFuture;

pub trait Summarizer: Send + Sync {
    /// Produces a short summary of `text`.
    fn summarize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<String, PipelineError>>;

    /// Scores a summary, returning the service's structured JSON verbatim.
    fn score<'a>(&'a self, summary: &'a str) -> BoxFuture<'a, Result<Value, PipelineError>>;
}

/// Interprets a raw service response as the structured score JSON.
/// Services are known to wrap JSON in prose or return junk; anything that
/// does not parse as a JSON object is malformed source data.
pub fn parse_score_response(raw: &str) -> Result<Value, PipelineError> {
    let trimmed = raw.trim();
    // Tolerate responses that wrap the object in surrounding prose.
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    };
    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| PipelineError::MalformedSourceData(format!("score is not JSON: {}", e)))?;
    if !value.is_object() {
        return Err(PipelineError::MalformedSourceData(
            "score is not a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Canned summarizer for wiring and tests.
pub struct StaticSummarizer {
    summary: String,
    score: Value,
}

impl StaticSummarizer {
    pub fn new(summary: &str, score: Value) -> Self {
        Self {
            summary: summary.to_string(),
            score,
        }
    }
}

impl Summarizer for StaticSummarizer {
    fn summarize<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<String, PipelineError>> {
        Box::pin(async move { Ok(self.summary.clone()) })
    }

    fn score<'a>(&'a self, _summary: &'a str) -> BoxFuture<'a, Result<Value, PipelineError>> {
        Box::pin(async move { Ok(self.score.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json_parses() {
        let value = parse_score_response(r#"{"relevance": 8, "impact": "alto"}"#).unwrap();
        assert_eq!(value["relevance"], 8);
    }

    #[test]
    fn wrapped_json_is_extracted() {
        let raw = "Aqui está a análise:\n{\"relevance\": 3}\nEspero ter ajudado.";
        let value = parse_score_response(raw).unwrap();
        assert_eq!(value["relevance"], 3);
    }

    #[test]
    fn junk_is_malformed() {
        assert!(matches!(
            parse_score_response("desculpe, não consegui"),
            Err(PipelineError::MalformedSourceData(_))
        ));
        assert!(matches!(
            parse_score_response("[1, 2, 3]"),
            Err(PipelineError::MalformedSourceData(_))
        ));
    }
}
