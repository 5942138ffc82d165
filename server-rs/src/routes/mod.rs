use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path},
    Json,
};
use axum_extra::extract::WithRejection;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

pub mod games;
pub mod health;
pub mod leagues;

/// JSON body whose rejection is reported through the error envelope.
pub type JsonBody<T> = WithRejection<Json<T>, AppError>;
pub type PathParams<T> = WithRejection<Path<T>, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Body that may be omitted entirely. An empty body yields the default;
/// anything else must parse, so a malformed body never falls back silently.
pub fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Failed to parse the request body: {e}")))
}

/// Success envelope: `{"success": true, "data": ...}`.
pub fn ok<T: Serialize>(data: T) -> AppResult<Json<Value>> {
    let data = serde_json::to_value(data)
        .map_err(|e| AppError::Internal(format!("Response serialization failed: {e}")))?;
    Ok(Json(json!({ "success": true, "data": data })))
}
