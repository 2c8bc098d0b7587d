//! crates/mindspark_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a registered clinician account. Never carries the password hash.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub age: i32,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub hashed_password: String,
}

/// Everything needed to insert a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub hashed_password: String,
    pub age: i32,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
        }
    }

    /// Parses the wire/storage literal. Only `user` and `ai` are accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Sender::User),
            "ai" => Some(Sender::Ai),
            _ => None,
        }
    }
}

/// A single, immutable entry in a chat.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A patient interview session owned by exactly one user.
/// `messages` is in chronological (insertion) order.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub patient_name: String,
    pub patient_age: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// The text of every message so far, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.text.clone()).collect()
    }
}

/// Which upstream inference deployment answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelTier {
    Premium,
    Economical,
    #[default]
    Default,
}

impl ModelTier {
    /// Total over all inputs: anything unrecognised (or absent) is the default tier.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some("premium") => ModelTier::Premium,
            Some("economical") => ModelTier::Economical,
            _ => ModelTier::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Premium => "premium",
            ModelTier::Economical => "economical",
            ModelTier::Default => "default",
        }
    }
}

/// True when the utterance ends the interview and triggers the closeout.
pub fn is_closeout_command(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered == "quit" || lowered == "end"
}

/// One row of the treatment block. Order follows the upstream mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Treatment {
    pub disorder: String,
    pub recommendation: Option<String>,
}

/// The inputs of a rendered closeout report.
#[derive(Debug, Clone, Default)]
pub struct ClinicalReport {
    pub patient_name: Option<String>,
    pub patient_age: Option<String>,
    pub summary: String,
    pub disorders: Vec<String>,
    pub treatments: Vec<Treatment>,
}
