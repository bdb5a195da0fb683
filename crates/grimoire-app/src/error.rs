use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use grimoire_store::error::StoreError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unprocessable request: {0}")]
    UnprocessableRequest(String),

    #[error("{0} not found")]
    ResourceNotFound(String),

    #[error("Not authorized")]
    NotAuthorized,

    #[error("User has already rated this book, ratings are final")]
    AlreadyRated,

    #[error("Rating grade {0} is out of range, accepted range is 1 to 5")]
    RatingOutOfRange(i64),

    #[error("Record was concurrently modified, try again")]
    WriteConflict,

    #[error("Cannot process image: {0}")]
    EncodeError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Multipart error: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<grimoire_dal::Error> for ApiError {
    fn from(error: grimoire_dal::Error) -> Self {
        use grimoire_dal::Error as DalError;
        match error {
            DalError::RecordNotFound(what) => ApiError::ResourceNotFound(what),
            DalError::RatingExists(_) => ApiError::AlreadyRated,
            DalError::RatingOutOfRange(grade) => ApiError::RatingOutOfRange(grade),
            DalError::WriteConflict => ApiError::WriteConflict,
            DalError::InvalidOrderByField(field) => {
                ApiError::InvalidRequest(format!("Invalid order field: {field}"))
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_)
            | ApiError::RatingOutOfRange(_)
            | ApiError::MultipartError(_) => StatusCode::BAD_REQUEST,
            ApiError::UnprocessableRequest(_) | ApiError::EncodeError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotAuthorized => StatusCode::UNAUTHORIZED,
            ApiError::AlreadyRated | ApiError::WriteConflict => StatusCode::CONFLICT,
            ApiError::StoreError(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::StoreError(StoreError::InvalidPath) => StatusCode::BAD_REQUEST,
            ApiError::StoreError(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine readable code, independent of the message wording.
    fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) | ApiError::MultipartError(_) => "invalid_request",
            ApiError::UnprocessableRequest(_) => "unprocessable_request",
            ApiError::ResourceNotFound(_) => "not_found",
            ApiError::NotAuthorized => "not_authorized",
            ApiError::AlreadyRated => "already_rated",
            ApiError::RatingOutOfRange(_) => "rating_out_of_range",
            ApiError::WriteConflict => "write_conflict",
            ApiError::EncodeError(_) => "encode_error",
            ApiError::StoreError(StoreError::NotFound(_)) => "not_found",
            ApiError::StoreError(StoreError::InvalidPath) => "invalid_request",
            ApiError::StoreError(_) | ApiError::InternalError(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {self}");
        }
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
