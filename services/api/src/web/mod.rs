pub mod auth;
pub mod extract;
pub mod message_task;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::error::ApiError;

pub use middleware::require_auth;
pub use rest::ApiDoc;
pub use state::{AppState, ChatLocks};

/// Largest accepted request body; audio uploads are the big ones.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds the complete application: REST routes, auth layer and Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/chat/speech-to-text", post(rest::speech_to_text_handler))
        .route("/api/chat/download-pdf/{chatId}", get(rest::download_pdf_handler))
        .route("/api/chat/rename/{chatId}", put(rest::rename_chat_handler))
        .route("/api/chat/delete/{chatId}", delete(rest::delete_chat_handler))
        .route("/api/chat/share/{chatId}", get(rest::share_chat_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/api/chat",
            get(rest::list_chats_handler).post(rest::create_chat_handler),
        )
        .route("/api/chat/message", post(rest::add_message_handler))
        .route("/api/chat/{chatId}", get(rest::get_chat_messages_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .route("/", get(|| async { "API is running..." }))
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

/// CORS for the configured frontend origin. `*` allows any origin without credentials.
pub fn cors_layer(config: &Config) -> Result<CorsLayer, ApiError> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [
        AUTHORIZATION,
        CONTENT_TYPE,
        ACCEPT,
        HeaderName::from_static("selected-model"),
    ];

    if config.cors_origin.trim() == "*" {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers));
    }

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(methods)
        .allow_headers(headers))
}
