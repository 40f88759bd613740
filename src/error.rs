use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::presentation::Notice;

/// Reasons an expense form is refused before it reaches a data source.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("date is required")]
    MissingDate,

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("category is required")]
    MissingCategory,

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("amount must be a non-negative number")]
    InvalidAmount,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("expense {0} not found")]
    NotFound(String),

    #[error("malformed expense record {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl StoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Decode { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// A failed store operation together with the toast shown to the user.
#[derive(Debug, Error)]
#[error("{notice}: {source}")]
pub struct ApiError {
    pub notice: &'static str,
    #[source]
    pub source: StoreError,
}

impl ApiError {
    pub fn failed(notice: &'static str) -> impl FnOnce(StoreError) -> ApiError {
        move |source| ApiError { notice, source }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.source.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        // Validation failures are plain field errors, everything else gets a toast.
        let notice = match self.source {
            StoreError::Invalid(_) => None,
            _ => Some(Notice::error(self.notice)),
        };
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.source.to_string(),
            "notice": notice,
        }))
    }
}
