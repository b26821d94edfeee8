use crate::core::AlertError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    /// The request body cannot be accepted as sent.
    Input(String),
    Buffer(AlertError),
}

impl From<AlertError> for WebError {
    fn from(err: AlertError) -> Self {
        WebError::Buffer(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        // Alertmanager redelivers on any 5xx.
        let (status, message, code) = match self {
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "input_error"),
            WebError::Buffer(err @ AlertError::GateTimeout(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "buffer_busy",
            ),
            WebError::Buffer(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "internal_error",
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
