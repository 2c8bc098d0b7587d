//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user registration and login, and the bearer
//! token keys shared with the auth middleware.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use mindspark_core::{domain::NewUser, ports::PortError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::ApiJson;
use crate::web::protocol::ChatDocument;
use crate::web::state::AppState;

const TOKEN_LIFETIME_DAYS: i64 = 30;

//=========================================================================================
// Bearer Tokens
//=========================================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The user id.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing and verification keys derived from `JWT_SECRET`.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Checks signature and expiry and returns the user id the token was issued to.
    pub fn verify(&self, token: &str) -> Result<Uuid, PortError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims.sub)
            .map_err(|_| PortError::Unauthorized)
    }
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub age: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub token: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    /// The user's chats in the order they were created.
    pub chats: Vec<ChatDocument>,
    pub token: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully", body = RegisterResponse),
        (status = 400, description = "User already exists"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    if req.full_name.trim().is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Full name, email and password are required."));
    }

    // 1. Reject known emails before paying for the hash
    match state.db.get_user_by_email(&email).await {
        Ok(_) => return Err(ApiError::bad_request("User already exists")),
        Err(PortError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    // 2. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    // 3. Create user in database
    let user = state
        .db
        .create_user(NewUser {
            full_name: req.full_name,
            email,
            hashed_password: password_hash,
            age: req.age,
        })
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => ApiError::bad_request("User already exists"),
            other => other.into(),
        })?;
    info!("Registered user {}", user.id);

    // 4. Return the user with a fresh token
    let response = RegisterResponse {
        id: user.id,
        token: state.tokens.issue(user.id)?,
        full_name: user.full_name,
        email: user.email,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Unknown email or wrong password"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    // 1. Get user by email
    let user_creds = state
        .db
        .get_user_by_email(req.email.trim())
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => ApiError::bad_request("User not found"),
            other => other.into(),
        })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();

    if !valid {
        return Err(ApiError::bad_request("Invalid email or password"));
    }

    // 3. Load the user's chats, oldest first
    let mut chats = state.db.list_chats_for_user(user_creds.user_id).await?;
    chats.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Ok(Json(LoginResponse {
        id: user_creds.user_id,
        full_name: user_creds.full_name,
        email: user_creds.email,
        chats: chats.iter().map(ChatDocument::from).collect(),
        token: state.tokens.issue(user_creds.user_id)?,
    }))
}
