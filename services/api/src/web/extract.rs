//! services/api/src/web/extract.rs
//!
//! Request extractors whose rejections use the service's JSON error body.

use axum::extract::FromRequest;

use crate::error::ApiError;

/// `axum::Json` whose rejections answer `400 {"message": ..}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
