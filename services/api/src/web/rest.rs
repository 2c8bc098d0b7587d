//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the chat REST endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::{
    auth,
    extract::ApiJson,
    message_task::{self, IncomingMessage},
    protocol::{
        AddMessageRequest, ChatDocument, ChatListEntry, CreateChatRequest, MessageDocument,
        RenameChatRequest, RenameResponse, ShareResponse, StatusMessage, TranscriptionResponse,
    },
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use bytes::Bytes;
use mindspark_core::{
    domain::{ModelTier, Sender},
    ports::{PortError, UpstreamError},
};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use uuid::Uuid;

/// Transcription when the service answered without any text.
pub const NO_TRANSCRIPTION: &str = "Could not transcribe audio.";
/// Transcription when the service could not be reached.
pub const TRANSCRIPTION_FAILED: &str = "Speech-to-text conversion failed.";

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        list_chats_handler,
        get_chat_messages_handler,
        create_chat_handler,
        add_message_handler,
        speech_to_text_handler,
        download_pdf_handler,
        rename_chat_handler,
        delete_chat_handler,
        share_chat_handler,
    ),
    components(
        schemas(
            auth::RegisterRequest, auth::LoginRequest, auth::RegisterResponse, auth::LoginResponse,
            ChatDocument, ChatListEntry, MessageDocument, CreateChatRequest, AddMessageRequest,
            RenameChatRequest, RenameResponse, ShareResponse, StatusMessage, TranscriptionResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "MindSpark API", description = "Authenticated psychiatric interview chat with closeout reports.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme the protected chat routes refer to.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Chat ids are UUIDs; anything else cannot name a chat.
fn parse_chat_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::not_found("Chat not found"))
}

fn chat_not_found(e: PortError) -> ApiError {
    match e {
        PortError::NotFound(_) => ApiError::not_found("Chat not found"),
        other => other.into(),
    }
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

//=========================================================================================
// Chat REST API Handlers
//=========================================================================================

/// List the caller's chats, most recently updated first.
#[utoipa::path(
    get,
    path = "/api/chat",
    responses(
        (status = 200, description = "Chats of the caller", body = [ChatListEntry]),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer" = []))
)]
pub async fn list_chats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<ChatListEntry>>, ApiError> {
    let chats = state.db.list_chats_for_user(user_id).await?;
    Ok(Json(chats.iter().map(ChatListEntry::from).collect()))
}

/// The messages of one chat.
#[utoipa::path(
    get,
    path = "/api/chat/{chatId}",
    params(("chatId" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Messages in chronological order", body = [MessageDocument]),
        (status = 404, description = "Chat not found")
    ),
    security(("bearer" = []))
)]
pub async fn get_chat_messages_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<MessageDocument>>, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    let chat = state.db.get_chat(chat_id).await.map_err(chat_not_found)?;
    Ok(Json(chat.messages.iter().map(MessageDocument::from).collect()))
}

/// Start a new interview session for a patient.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = CreateChatRequest,
    responses(
        (status = 201, description = "Chat created", body = ChatDocument),
        (status = 400, description = "Patient name or age missing")
    ),
    security(("bearer" = []))
)]
pub async fn create_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    ApiJson(req): ApiJson<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(patient_name), Some(patient_age)) =
        (required(req.patient_name), required(req.patient_age))
    else {
        return Err(ApiError::bad_request("Patient name and age are required."));
    };

    let chat = state.db.create_chat(user_id, &patient_name, &patient_age).await?;
    info!("User {} created chat {}", user_id, chat.id);
    Ok((StatusCode::CREATED, Json(ChatDocument::from(&chat))))
}

/// Post a message; the reply (or the closeout report link) is appended too.
///
/// The `selected-model` header picks the inference tier.
#[utoipa::path(
    post,
    path = "/api/chat/message",
    request_body = AddMessageRequest,
    params(
        ("selected-model" = Option<String>, Header, description = "premium, economical or default")
    ),
    responses(
        (status = 200, description = "Updated chat", body = ChatDocument),
        (status = 400, description = "Empty text, unknown sender or malformed body"),
        (status = 404, description = "Chat not found"),
        (status = 502, description = "Upstream failed while failures are surfaced")
    ),
    security(("bearer" = []))
)]
pub async fn add_message_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<AddMessageRequest>,
) -> Result<Json<ChatDocument>, ApiError> {
    let chat_id = req
        .chat_id
        .as_deref()
        .ok_or_else(|| ApiError::not_found("Chat not found"))
        .and_then(parse_chat_id)?;
    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("Message text is required."));
    }
    let sender = match req.sender.as_deref() {
        None => Sender::User,
        Some(raw) => Sender::parse(raw)
            .ok_or_else(|| ApiError::bad_request("Sender must be either 'user' or 'ai'."))?,
    };
    let tier = ModelTier::from_token(headers.get("selected-model").and_then(|v| v.to_str().ok()));

    let chat = message_task::process_message(
        &state,
        IncomingMessage {
            chat_id,
            sender,
            text: &req.text,
            tier,
            username: req.username.as_deref(),
            age: req.age.as_deref(),
        },
    )
    .await?;
    Ok(Json(ChatDocument::from(&chat)))
}

/// Transcribe an uploaded clip. Always answers with some text.
#[utoipa::path(
    post,
    path = "/api/chat/speech-to-text",
    request_body(content = String, content_type = "multipart/form-data", description = "The recording in an `audio` field."),
    responses(
        (status = 200, description = "Transcribed text", body = TranscriptionResponse),
        (status = 400, description = "No audio file uploaded")
    )
)]
pub async fn speech_to_text_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let mut audio: Option<Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart data: {}", e)))?
    {
        if field.name() == Some("audio") {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read audio bytes: {}", e)))?;
            audio = Some(data);
            break;
        }
    }

    let audio = audio
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("No audio file uploaded"))?;
    info!("Received {} bytes for transcription", audio.len());

    let transcription = match state.sst_adapter.transcribe_audio(&audio).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Speech-to-text degraded: {}", e);
            match e {
                UpstreamError::UnexpectedShape(_) => NO_TRANSCRIPTION.to_string(),
                UpstreamError::Transport(_) => TRANSCRIPTION_FAILED.to_string(),
            }
        }
    };
    Ok(Json(TranscriptionResponse { transcription }))
}

/// Download the closeout report of a chat.
#[utoipa::path(
    get,
    path = "/api/chat/download-pdf/{chatId}",
    params(("chatId" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "The PDF report", body = Vec<u8>, content_type = "application/pdf"),
        (status = 404, description = "PDF not found")
    )
)]
pub async fn download_pdf_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Response, ApiError> {
    let chat_id = Uuid::parse_str(chat_id.trim()).map_err(|_| ApiError::not_found("PDF not found"))?;
    let pdf = state.report_store.load_report(chat_id).await.map_err(|e| match e {
        PortError::NotFound(_) => ApiError::not_found("PDF not found"),
        other => other.into(),
    })?;

    let disposition = format!("attachment; filename=\"{}-ChatSummary.pdf\"", chat_id);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(pdf))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Rename a chat (the name is the patient name).
#[utoipa::path(
    put,
    path = "/api/chat/rename/{chatId}",
    params(("chatId" = String, Path, description = "Chat id")),
    request_body = RenameChatRequest,
    responses(
        (status = 200, description = "Chat renamed", body = RenameResponse),
        (status = 400, description = "New chat name missing"),
        (status = 404, description = "Chat not found")
    )
)]
pub async fn rename_chat_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    ApiJson(req): ApiJson<RenameChatRequest>,
) -> Result<Json<RenameResponse>, ApiError> {
    let new_name =
        required(req.new_chat_name).ok_or_else(|| ApiError::bad_request("New chat name is required."))?;
    let chat_id = parse_chat_id(&chat_id)?;
    let chat = state.db.rename_chat(chat_id, &new_name).await.map_err(chat_not_found)?;
    Ok(Json(RenameResponse {
        message: "Chat renamed successfully".to_string(),
        chat: ChatDocument::from(&chat),
    }))
}

/// Delete a chat together with its report.
#[utoipa::path(
    delete,
    path = "/api/chat/delete/{chatId}",
    params(("chatId" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Chat deleted", body = StatusMessage),
        (status = 404, description = "Chat not found")
    )
)]
pub async fn delete_chat_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<StatusMessage>, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    {
        let _guard = state.chat_locks.acquire(chat_id).await;
        state.db.delete_chat(chat_id).await.map_err(chat_not_found)?;
        if let Err(e) = state.report_store.remove_report(chat_id).await {
            warn!("Chat {} deleted but its report could not be removed: {}", chat_id, e);
        }
    }
    state.chat_locks.forget(chat_id);
    info!("Deleted chat {}", chat_id);
    Ok(Json(StatusMessage {
        message: "Chat deleted successfully".to_string(),
    }))
}

/// Build the frontend link for a chat.
///
/// The link carries no access token: anyone holding the chat id can build it.
#[utoipa::path(
    get,
    path = "/api/chat/share/{chatId}",
    params(("chatId" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Shareable link", body = ShareResponse),
        (status = 404, description = "Chat not found")
    )
)]
pub async fn share_chat_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<ShareResponse>, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    state.db.get_chat(chat_id).await.map_err(chat_not_found)?;
    Ok(Json(ShareResponse {
        message: "Chat is now sharable".to_string(),
        shareable_link: format!("{}/share/{}", state.config.share_base_url, chat_id),
    }))
}
