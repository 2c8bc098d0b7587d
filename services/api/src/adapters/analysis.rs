//! services/api/src/adapters/analysis.rs
//!
//! This module contains the adapter for the closeout endpoints of the inference
//! deployments: disorder detection, treatment recommendation and summarization.
//! It implements the `ClinicalAnalysisService` port.

use async_trait::async_trait;
use mindspark_core::{
    domain::{ModelTier, Treatment},
    ports::{ClinicalAnalysisService, UpstreamError, UpstreamResult},
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::upstream::{post_json, preview, ModelRouter};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct HttpAnalysisAdapter {
    client: reqwest::Client,
    router: ModelRouter,
}

impl HttpAnalysisAdapter {
    pub fn new(client: reqwest::Client, router: ModelRouter) -> Self {
        Self { client, router }
    }

    async fn call<T>(
        &self,
        tier: ModelTier,
        path: &str,
        payload: Value,
        decode: fn(&Value) -> UpstreamResult<T>,
    ) -> UpstreamResult<T> {
        let url = self.router.endpoint(tier, path);
        debug!("Calling {}", url);
        let body = post_json(self.client.post(&url), &payload).await?;
        let decoded = decode(&body);
        if decoded.is_err() {
            warn!("Unexpected {} reply from {}: {}", path, url, preview(&body));
        }
        decoded
    }
}

//=========================================================================================
// Reply decoders
//=========================================================================================

/// `{"disorders": [..]}`. Non-string labels are kept in their JSON form.
pub fn decode_disorders(body: &Value) -> UpstreamResult<Vec<String>> {
    let list = body
        .get("disorders")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::UnexpectedShape(preview(body)))?;
    Ok(list
        .iter()
        .map(|label| match label {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect())
}

/// `{"treatments": {disorder: text}}`, in the mapping's own order. A value that
/// is not text leaves the recommendation empty.
pub fn decode_treatments(body: &Value) -> UpstreamResult<Vec<Treatment>> {
    let map = body
        .get("treatments")
        .and_then(Value::as_object)
        .ok_or_else(|| UpstreamError::UnexpectedShape(preview(body)))?;
    Ok(map
        .iter()
        .map(|(disorder, text)| Treatment {
            disorder: disorder.clone(),
            recommendation: text.as_str().filter(|t| !t.is_empty()).map(str::to_string),
        })
        .collect())
}

/// `{"summary": ".."}`.
pub fn decode_summary(body: &Value) -> UpstreamResult<String> {
    body.get("summary")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| UpstreamError::UnexpectedShape(preview(body)))
}

//=========================================================================================
// `ClinicalAnalysisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ClinicalAnalysisService for HttpAnalysisAdapter {
    async fn detect_disorders(&self, tier: ModelTier, history: &[String]) -> UpstreamResult<Vec<String>> {
        self.call(tier, "detect_disorders", json!({ "chat_history": history }), decode_disorders)
            .await
    }

    /// The endpoint reuses the `chat_history` field name for the disorder list.
    async fn recommend_treatments(
        &self,
        tier: ModelTier,
        disorders: &[String],
    ) -> UpstreamResult<Vec<Treatment>> {
        self.call(tier, "get_treatment", json!({ "chat_history": disorders }), decode_treatments)
            .await
    }

    async fn summarize(&self, tier: ModelTier, history: &[String]) -> UpstreamResult<String> {
        self.call(tier, "summarize_chat", json!({ "chat_history": history }), decode_summary)
            .await
    }
}
