//! crates/mindspark_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Chat, ClinicalReport, ModelTier, NewUser, Sender, Treatment, User, UserCredentials};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for the persistence and rendering ports.
/// This abstracts away the specific errors from external services (e.g., database, filesystem).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Item already exists: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Why a third-party inference call did not produce a recognised value.
///
/// `Ok` is the recognised case; callers decide whether to substitute a fallback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Connect failure, timeout or a non-success HTTP status.
    #[error("upstream unreachable: {0}")]
    Transport(String),
    /// The service answered, but not in any shape we understand.
    #[error("upstream returned an unexpected shape: {0}")]
    UnexpectedShape(String),
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    /// Fails with `PortError::Conflict` when the email is already registered.
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    // --- Chat Management ---
    /// Chats owned by the user, most recently updated first.
    async fn list_chats_for_user(&self, user_id: Uuid) -> PortResult<Vec<Chat>>;

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<Chat>;

    async fn create_chat(
        &self,
        user_id: Uuid,
        patient_name: &str,
        patient_age: &str,
    ) -> PortResult<Chat>;

    /// Appends a message and the reply to it as one step, bumps `updated_at`
    /// and returns the updated chat. Either both messages are stored or neither.
    async fn append_exchange(
        &self,
        chat_id: Uuid,
        sender: Sender,
        text: &str,
        reply: &str,
    ) -> PortResult<Chat>;

    async fn rename_chat(&self, chat_id: Uuid, new_name: &str) -> PortResult<Chat>;

    async fn delete_chat(&self, chat_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes a recorded clip into text.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> UpstreamResult<String>;
}

#[async_trait]
pub trait InterviewService: Send + Sync {
    /// Asks the selected deployment for the next interview question.
    async fn next_question(&self, tier: ModelTier, history: &[String]) -> UpstreamResult<String>;
}

#[async_trait]
pub trait ClinicalAnalysisService: Send + Sync {
    async fn detect_disorders(&self, tier: ModelTier, history: &[String]) -> UpstreamResult<Vec<String>>;

    async fn recommend_treatments(
        &self,
        tier: ModelTier,
        disorders: &[String],
    ) -> UpstreamResult<Vec<Treatment>>;

    async fn summarize(&self, tier: ModelTier, history: &[String]) -> UpstreamResult<String>;
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Lays out the closeout report and returns the finished PDF bytes.
    async fn render(&self, report: &ClinicalReport) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Replaces any existing artifact for the chat.
    async fn save_report(&self, chat_id: Uuid, pdf: &[u8]) -> PortResult<()>;

    /// `PortError::NotFound` until a closeout has run for the chat.
    async fn load_report(&self, chat_id: Uuid) -> PortResult<Vec<u8>>;

    async fn remove_report(&self, chat_id: Uuid) -> PortResult<()>;
}
