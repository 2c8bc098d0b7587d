//! services/api/src/web/message_task.rs
//!
//! The chat message lifecycle: produce the AI reply (or run the session
//! closeout), then persist the incoming message and the reply together.

use mindspark_core::{
    domain::{is_closeout_command, Chat, ClinicalReport, ModelTier, Sender},
    ports::{PortError, UpstreamError, UpstreamResult},
};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::UpstreamFailurePolicy;
use crate::error::ApiError;
use crate::web::state::AppState;

pub const UNEXPECTED_REPLY: &str = "I'm not sure how to respond to that.";
pub const UNREACHABLE_REPLY: &str = "Sorry, I couldn't process your request.";
pub const SUMMARY_FALLBACK: &str = "Could not generate summary.";

/// A new message for an existing chat.
pub struct IncomingMessage<'a> {
    pub chat_id: Uuid,
    pub sender: Sender,
    pub text: &'a str,
    pub tier: ModelTier,
    /// Demographics the client sent along; only used when the chat lacks them.
    pub username: Option<&'a str>,
    pub age: Option<&'a str>,
}

/// Applies the configured failure policy to one upstream stage.
///
/// Under `Fallback` the failure is logged and replaced; under `Surface` it
/// becomes a `502` naming the stage.
pub fn settle<T>(
    policy: UpstreamFailurePolicy,
    stage: &'static str,
    result: UpstreamResult<T>,
    fallback: impl FnOnce(&UpstreamError) -> T,
) -> Result<T, ApiError> {
    match result {
        Ok(value) => Ok(value),
        Err(source) => match policy {
            UpstreamFailurePolicy::Fallback => {
                warn!("Upstream stage '{}' degraded to fallback: {}", stage, source);
                Ok(fallback(&source))
            }
            UpstreamFailurePolicy::Surface => Err(ApiError::Upstream { stage, source }),
        },
    }
}

/// The markdown link posted as the AI reply once the report exists.
pub fn download_link(public_base_url: &str, chat_id: Uuid) -> String {
    format!(
        "[Download PDF Report]({}/api/chat/download-pdf/{})",
        public_base_url, chat_id
    )
}

/// Appends the message and the reply it provokes, returning the updated chat.
///
/// The whole exchange holds the chat's lock, so every user message is
/// followed directly by its AI reply. The reply is produced before anything
/// is stored: a failed exchange leaves the chat untouched.
pub async fn process_message(state: &AppState, incoming: IncomingMessage<'_>) -> Result<Chat, ApiError> {
    let chat_id = incoming.chat_id;
    let result = {
        let _guard = state.chat_locks.acquire(chat_id).await;
        exchange(state, incoming).await
    };
    state.chat_locks.forget(chat_id);
    result
}

async fn exchange(state: &AppState, incoming: IncomingMessage<'_>) -> Result<Chat, ApiError> {
    let chat = state.db.get_chat(incoming.chat_id).await.map_err(chat_not_found)?;
    let mut history = chat.history();
    history.push(incoming.text.to_string());

    let reply = if is_closeout_command(incoming.text) {
        run_closeout(state, incoming.tier, &chat, &history, incoming.username, incoming.age).await?
    } else {
        next_reply(state, incoming.tier, chat.id, &history).await?
    };

    Ok(state
        .db
        .append_exchange(chat.id, incoming.sender, incoming.text, &reply)
        .await
        .map_err(chat_not_found)?)
}

fn chat_not_found(e: PortError) -> ApiError {
    match e {
        PortError::NotFound(_) => ApiError::not_found("Chat not found"),
        other => other.into(),
    }
}

/// Asks the interview deployment for the next question.
async fn next_reply(
    state: &AppState,
    tier: ModelTier,
    chat_id: Uuid,
    history: &[String],
) -> Result<String, ApiError> {
    let started = Instant::now();
    let result = state.interview_adapter.next_question(tier, history).await;
    info!("Next question for chat {} ({} tier) took {:?}", chat_id, tier.as_str(), started.elapsed());

    settle(state.config.upstream_failure_policy, "get_questions", result, |e| match e {
        UpstreamError::UnexpectedShape(_) => UNEXPECTED_REPLY.to_string(),
        UpstreamError::Transport(_) => UNREACHABLE_REPLY.to_string(),
    })
}

/// Builds the closeout report for the chat and returns the reply linking to it.
/// `history` is the stored conversation followed by the closing message.
///
/// Summarization runs concurrently with the detection -> treatment chain. Each
/// stage degrades on its own, so a report is produced even if all of them fail.
pub async fn run_closeout(
    state: &AppState,
    tier: ModelTier,
    chat: &Chat,
    history: &[String],
    username: Option<&str>,
    age: Option<&str>,
) -> Result<String, ApiError> {
    let started = Instant::now();
    info!("Closing out chat {} with {} messages", chat.id, history.len());

    let policy = state.config.upstream_failure_policy;
    let analysis = &state.analysis_adapter;

    let findings = async {
        let disorders = settle(
            policy,
            "detect_disorders",
            analysis.detect_disorders(tier, history).await,
            |_| Vec::new(),
        )?;
        let treatments = settle(
            policy,
            "get_treatment",
            analysis.recommend_treatments(tier, &disorders).await,
            |_| Vec::new(),
        )?;
        Ok::<_, ApiError>((disorders, treatments))
    };
    let summary = async {
        settle(
            policy,
            "summarize_chat",
            analysis.summarize(tier, history).await,
            |_| SUMMARY_FALLBACK.to_string(),
        )
    };
    let (findings, summary) = futures::join!(findings, summary);
    let (disorders, treatments) = findings?;
    let summary = summary?;

    let report = ClinicalReport {
        patient_name: non_empty(&chat.patient_name).or(username).map(str::to_string),
        patient_age: non_empty(&chat.patient_age).or(age).map(str::to_string),
        summary,
        disorders,
        treatments,
    };

    let pdf = state.report_renderer.render(&report).await?;
    state.report_store.save_report(chat.id, &pdf).await?;
    info!("Closeout for chat {} finished in {:?}", chat.id, started.elapsed());

    Ok(download_link(&state.config.public_base_url, chat.id))
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.trim().is_empty())
}
