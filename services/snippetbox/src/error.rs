//! Error responses for the web service
//!
//! Clients only ever see a status line and its canonical reason phrase. The
//! underlying cause of a 500 travels in the response extensions as a
//! [`ServerFault`] so the request logger can record it next to the method
//! and URI.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::repositories::RepositoryError;

/// Custom error type for the web service
#[derive(Error, Debug)]
pub enum WebError {
    /// Unknown route target, bad id, expired snippet
    #[error("Not Found")]
    NotFound,

    /// Undecodable form body or failed CSRF check
    #[error("Bad Request")]
    BadRequest,

    /// Anything the client cannot fix
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Cause of an internal error, attached to the 500 response
#[derive(Debug, Clone)]
pub struct ServerFault(pub String);

impl From<RepositoryError> for WebError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => WebError::NotFound,
            other => WebError::Internal(other.into()),
        }
    }
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::NotFound => StatusCode::NOT_FOUND,
            WebError::BadRequest => StatusCode::BAD_REQUEST,
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let reason = status.canonical_reason().unwrap_or("Error");
        let mut response = (status, reason).into_response();

        if let WebError::Internal(err) = self {
            // {:?} on anyhow prints the cause chain and, when enabled, the backtrace
            response
                .extensions_mut()
                .insert(ServerFault(format!("{:?}", err)));
        }

        response
    }
}

/// Type alias for web handler results
pub type WebResult<T> = Result<T, WebError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_not_found_maps_to_404() {
        let err: WebError = RepositoryError::NotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_domain_errors_are_internal_when_unhandled() {
        let err: WebError = RepositoryError::DuplicateEmail.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_error_hides_detail_but_records_fault() {
        let response = WebError::Internal(anyhow::anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let fault = response.extensions().get::<ServerFault>().unwrap();
        assert!(fault.0.contains("connection refused"));
    }

    #[test]
    fn test_client_errors_carry_no_fault() {
        let response = WebError::BadRequest.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.extensions().get::<ServerFault>().is_none());
    }
}
