//! Mapping of request failures to HTTP responses.

use std::error::Error as _;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::fetch::FetchError;

/// Failures surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Fetch(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as a plain-text response.
    ///
    /// 500 bodies only carry the error chain when `expose_detail` is set.
    pub fn render(&self, expose_detail: bool) -> Response {
        let status = self.status();
        let body = match self {
            AppError::BadRequest(reason) => reason.clone(),
            _ if expose_detail => error_chain(self),
            _ => "Internal Server Error".to_string(),
        };
        (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
    }
}

fn error_chain(error: &AppError) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
