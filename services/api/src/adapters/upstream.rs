//! services/api/src/adapters/upstream.rs
//!
//! Shared plumbing for the third-party inference endpoints: the HTTP client,
//! the model-tier router and a JSON POST helper that classifies failures.

use mindspark_core::{domain::ModelTier, ports::{UpstreamError, UpstreamResult}};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::ModelUrls;

/// Builds the client every upstream adapter shares. Every request is bounded
/// by `timeout`.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
}

//=========================================================================================
// Model Router
//=========================================================================================

/// Maps a model tier to the base URL of the deployment serving it.
#[derive(Clone, Debug)]
pub struct ModelRouter {
    urls: ModelUrls,
}

impl ModelRouter {
    pub fn new(urls: ModelUrls) -> Self {
        let trim = |url: String| url.trim_end_matches('/').to_string();
        Self {
            urls: ModelUrls {
                premium: trim(urls.premium),
                economical: trim(urls.economical),
                default: trim(urls.default),
            },
        }
    }

    pub fn base_url(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Premium => &self.urls.premium,
            ModelTier::Economical => &self.urls.economical,
            ModelTier::Default => &self.urls.default,
        }
    }

    /// Full URL of `path` on the deployment for `tier`.
    pub fn endpoint(&self, tier: ModelTier, path: &str) -> String {
        format!("{}/{}", self.base_url(tier), path.trim_start_matches('/'))
    }
}

//=========================================================================================
// JSON transport
//=========================================================================================

/// POSTs `body` as JSON and returns the decoded JSON reply.
///
/// Connect errors, timeouts and non-success statuses are `Transport`; a reply
/// that is not JSON at all is `UnexpectedShape`.
pub async fn post_json<B: Serialize + ?Sized>(
    request: reqwest::RequestBuilder,
    body: &B,
) -> UpstreamResult<Value> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| UpstreamError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(UpstreamError::Transport(format!("HTTP status {}", status)));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| UpstreamError::Transport(e.to_string()))?;

    serde_json::from_slice::<Value>(&bytes)
        .map_err(|e| UpstreamError::UnexpectedShape(format!("body is not JSON: {}", e)))
}

/// Renders a JSON value for log lines without dumping huge payloads.
pub(crate) fn preview(value: &Value) -> String {
    let mut text = value.to_string();
    if text.len() > 200 {
        let cut = (0..=200).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        text.truncate(cut);
        text.push('…');
    }
    text
}
