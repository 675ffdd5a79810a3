use axum::extract::FromRequest;

use crate::error::ApiError;

/// `axum::Json` whose rejection answers with the API's `{"error": ...}` body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
