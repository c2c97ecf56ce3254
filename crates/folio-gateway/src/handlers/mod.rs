pub mod chat;
pub mod contact;
pub mod knowledge;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use folio_core::ContactError;

/// JSON error body: `{"success": false, "error": "..."}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<ContactError> for ApiError {
    fn from(err: ContactError) -> Self {
        match err {
            ContactError::Validation(msg) => Self::bad_request(msg),
            ContactError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            ContactError::Storage(e) => {
                tracing::error!(target: "folio::contact", "Contact storage failure: {}", e);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Contact storage unavailable")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}
