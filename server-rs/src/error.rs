use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use serde_json::json;

use crate::ledger::LedgerError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

const INTERNAL_MESSAGE: &str = "Internal server error";

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Validation(_) | LedgerError::InvalidAmount(_) | LedgerError::RosterInvalid(_) => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::NotFound(_) | LedgerError::PlayerNotInGame => StatusCode::NOT_FOUND,
        LedgerError::Forbidden(_) | LedgerError::NotLeagueMember => StatusCode::FORBIDDEN,
        LedgerError::GameNotActive
        | LedgerError::GameStillActive
        | LedgerError::ActiveGameExists
        | LedgerError::PlayersStillActive { .. }
        | LedgerError::PlayerAlreadyInactive
        | LedgerError::AlreadyActive
        | LedgerError::NothingToUndo => StatusCode::CONFLICT,
        LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Storage(_) | LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl AppError {
    /// Status, stable code and caller-facing message.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests".to_string(),
            ),
            AppError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                "REQUEST_TIMEOUT",
                "Request timed out".to_string(),
            ),
            AppError::Ledger(e) => {
                let status = ledger_status(e);
                let message = match e {
                    LedgerError::Storage(inner) => {
                        tracing::error!("Database error: {inner}");
                        INTERNAL_MESSAGE.to_string()
                    }
                    LedgerError::Internal(msg) => {
                        tracing::error!("Internal error: {msg}");
                        INTERNAL_MESSAGE.to_string()
                    }
                    LedgerError::PlayersStillActive { count } => {
                        format!("All players must cash out first ({count} still active)")
                    }
                    other => other.to_string(),
                };
                (status, e.code(), message)
            }
            AppError::Jwt(_) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid token".to_string(),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let mut error = json!({ "code": code, "message": message });
        if let AppError::Ledger(LedgerError::PlayersStillActive { count }) = &self {
            error["activePlayersCount"] = json!(count);
        }
        let body = json!({ "success": false, "error": error });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Turns errors raised by fallible tower layers into the error envelope.
pub async fn handle_layer_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("request timed out");
        AppError::Timeout
    } else {
        AppError::Internal(format!("Unhandled layer error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_conflicts_map_to_409() {
        for err in [
            LedgerError::GameNotActive,
            LedgerError::ActiveGameExists,
            LedgerError::PlayersStillActive { count: 2 },
            LedgerError::NothingToUndo,
        ] {
            let (status, _, _) = AppError::from(err).parts();
            assert_eq!(status, StatusCode::CONFLICT);
        }
    }

    #[test]
    fn storage_failures_hide_details() {
        let (status, code, message) =
            AppError::from(LedgerError::Internal("disk on fire".into())).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "INTERNAL_ERROR");
        assert_eq!(message, INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn elapsed_timeouts_become_408_envelopes() {
        let err = handle_layer_error(Box::new(tower::timeout::error::Elapsed::new())).await;
        let (status, code, _) = err.parts();
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(code, "REQUEST_TIMEOUT");

        let err = handle_layer_error("boom".into()).await;
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn amounts_and_rosters_are_bad_requests() {
        let (status, code, _) = AppError::from(LedgerError::invalid_amount("x")).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "INVALID_AMOUNT");
        let (status, code, _) = AppError::from(LedgerError::RosterInvalid("x".into())).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "ROSTER_INVALID");
    }
}
