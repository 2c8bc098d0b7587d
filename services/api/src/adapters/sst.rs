//! services/api/src/adapters/sst.rs
//!
//! This module contains the adapter for the Hugging Face hosted Whisper model.
//! It implements the `SpeechToTextService` port from the `core` crate.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use mindspark_core::ports::{SpeechToTextService, UpstreamError, UpstreamResult};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::upstream::{post_json, preview};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SpeechToTextService` port using the Whisper inference API.
#[derive(Clone)]
pub struct WhisperSstAdapter {
    client: reqwest::Client,
    url: String,
    access_token: Option<String>,
}

impl WhisperSstAdapter {
    /// Creates a new `WhisperSstAdapter`.
    pub fn new(client: reqwest::Client, url: String, access_token: Option<String>) -> Self {
        Self {
            client,
            url,
            access_token,
        }
    }
}

/// `{"text": ".."}` is the only shape the inference API answers with on success.
pub fn decode_transcription(body: &Value) -> UpstreamResult<String> {
    match body.get("text").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(UpstreamError::UnexpectedShape(preview(body))),
    }
}

//=========================================================================================
// `SpeechToTextService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechToTextService for WhisperSstAdapter {
    /// Sends the clip base64-encoded as `{"inputs": ..}`.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> UpstreamResult<String> {
        debug!("Sending {} bytes of audio to {}", audio_data.len(), self.url);
        let payload = json!({ "inputs": STANDARD.encode(audio_data) });

        let mut request = self.client.post(&self.url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let body = post_json(request, &payload).await?;
        let decoded = decode_transcription(&body);
        if decoded.is_err() {
            warn!("Unexpected transcription reply: {}", preview(&body));
        }
        decoded
    }
}
