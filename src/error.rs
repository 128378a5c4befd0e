//! The per-request error taxonomy for the proxy pipeline.
//!
//! Every variant is terminal: it maps to exactly one HTTP response and is
//! never retried. Display messages are safe to show callers; the underlying
//! causes are logged at the point of failure and stay out of response bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The caller did not declare an `application/json` body.
    #[error("Proxy can only handle incoming JSON contents")]
    InvalidContentType,

    /// The request body could not be read off the wire.
    #[error("Unable to read request body")]
    BodyRead(#[source] axum::Error),

    /// The body was declared as JSON but does not parse as a JSON object.
    /// A missing `model` field is NOT this kind — that takes default routing.
    #[error("Invalid JSON in request body")]
    MalformedBody(#[source] serde_json::Error),

    /// The resolved backend URL does not combine with the request path.
    /// Backend URLs come from trusted configuration, so this is an internal
    /// fault rather than a client error.
    #[error("Internal Server Error")]
    TargetUrl,

    /// The backend could not be reached, or the relay failed in transit.
    #[error("Bad Gateway")]
    Upstream(Box<dyn std::error::Error + Send + Sync>),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidContentType | ProxyError::MalformedBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::BodyRead(_) | ProxyError::TargetUrl => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
