//! services/api/src/adapters/interview.rs
//!
//! This module contains the adapter for the "next question" endpoint of the
//! interview deployments. It implements the `InterviewService` port.

use async_trait::async_trait;
use mindspark_core::{
    domain::ModelTier,
    ports::{InterviewService, UpstreamError, UpstreamResult},
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::upstream::{post_json, preview, ModelRouter};

/// Reply used when the deployment recognises the message but has no question.
pub const NO_RELEVANT_QUESTION: &str = "I couldn't find a relevant question.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `InterviewService` over the `/get_questions` endpoint.
#[derive(Clone)]
pub struct HttpInterviewAdapter {
    client: reqwest::Client,
    router: ModelRouter,
}

impl HttpInterviewAdapter {
    pub fn new(client: reqwest::Client, router: ModelRouter) -> Self {
        Self { client, router }
    }
}

/// Normalizes the two reply shapes the deployments use:
/// `{"questions": [..]}` (first entry wins) and `{"question": ".."}`.
/// A question is only recognised when it is non-empty text.
pub fn decode_question(body: &Value) -> UpstreamResult<String> {
    if let Some(questions) = body.get("questions").and_then(Value::as_array) {
        return match questions.first() {
            None => Ok(NO_RELEVANT_QUESTION.to_string()),
            Some(Value::String(question)) if !question.trim().is_empty() => Ok(question.clone()),
            Some(_) => Err(UpstreamError::UnexpectedShape(preview(body))),
        };
    }
    match body.get("question") {
        Some(Value::String(question)) if !question.trim().is_empty() => Ok(question.clone()),
        _ => Err(UpstreamError::UnexpectedShape(preview(body))),
    }
}

//=========================================================================================
// `InterviewService` Trait Implementation
//=========================================================================================

#[async_trait]
impl InterviewService for HttpInterviewAdapter {
    /// Only the latest message is forwarded; the deployments keep no history.
    async fn next_question(&self, tier: ModelTier, history: &[String]) -> UpstreamResult<String> {
        let latest = history.last().map(String::as_str).unwrap_or_default();
        let url = self.router.endpoint(tier, "get_questions");
        debug!("Requesting next question from {}", url);

        let body = post_json(self.client.post(&url), &json!({ "message": latest })).await?;
        let decoded = decode_question(&body);
        if decoded.is_err() {
            warn!("Unexpected get_questions reply from {}: {}", url, preview(&body));
        }
        decoded
    }
}
