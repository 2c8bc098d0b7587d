//! services/api/src/web/protocol.rs
//!
//! Defines the JSON documents exchanged between the browser client and the API
//! server. Field names follow the wire format the frontend already speaks
//! (`_id`, camelCase).

use chrono::{DateTime, Utc};
use mindspark_core::domain::{Chat, Message};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Documents Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct MessageDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// Either `user` or `ai`.
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for MessageDocument {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender.as_str().to_string(),
            text: message.text.clone(),
            timestamp: message.timestamp,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// The owning user's id.
    pub user: Uuid,
    pub patient_name: String,
    pub patient_age: String,
    pub messages: Vec<MessageDocument>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Chat> for ChatDocument {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id,
            user: chat.user_id,
            patient_name: chat.patient_name.clone(),
            patient_age: chat.patient_age.clone(),
            messages: chat.messages.iter().map(MessageDocument::from).collect(),
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        }
    }
}

/// The trimmed projection used by the chat list.
#[derive(Serialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatListEntry {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub patient_name: String,
    pub patient_age: String,
    pub messages: Vec<MessageDocument>,
}

impl From<&Chat> for ChatListEntry {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id,
            patient_name: chat.patient_name.clone(),
            patient_age: chat.patient_age.clone(),
            messages: chat.messages.iter().map(MessageDocument::from).collect(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct StatusMessage {
    pub message: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct RenameResponse {
    pub message: String,
    pub chat: ChatDocument,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub message: String,
    pub shareable_link: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

//=========================================================================================
// Payloads Sent FROM the Client TO the Server
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    #[serde(default)]
    pub patient_name: Option<String>,
    /// Accepts `"34"` as well as `34`.
    #[serde(default, deserialize_with = "text_or_number")]
    #[schema(value_type = Option<String>)]
    pub patient_age: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMessageRequest {
    /// A missing id is answered like an unknown one.
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub text: String,
    /// Defaults to `user`.
    #[serde(default)]
    pub sender: Option<String>,
    /// Sent by the frontend; the chat's own patient fields are authoritative.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    #[schema(value_type = Option<String>)]
    pub age: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameChatRequest {
    #[serde(default)]
    pub new_chat_name: Option<String>,
}

/// Deserializes an optional JSON string or number into text.
fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrNumber {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<TextOrNumber>::deserialize(deserializer)? {
        Some(TextOrNumber::Text(text)) => Some(text),
        Some(TextOrNumber::Number(number)) => Some(number.to_string()),
        None => None,
    })
}
