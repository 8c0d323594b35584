use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Request-scoped protocol errors. Each kind maps to a fixed status and
/// body; none of them carry internal diagnostics to the client.
#[derive(Debug, thiserror::Error)]
pub enum SockJsError {
    #[error("unknown session")]
    UnknownSession,
    #[error("malformed session path")]
    MalformedPath,
    #[error("Broken JSON encoding.")]
    BrokenJson,
    #[error("Payload expected.")]
    EmptyPayload,
    #[error("\"callback\" parameter required")]
    MissingCallback,
    #[error("invalid \"callback\" parameter")]
    InvalidCallback,
    #[error("Invalid Content-Type")]
    InvalidContentType,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("Can \"Upgrade\" only to \"WebSocket\".")]
    InvalidUpgradeRequest,
}

impl SockJsError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownSession | Self::MalformedPath => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidUpgradeRequest => StatusCode::BAD_REQUEST,
            Self::BrokenJson
            | Self::EmptyPayload
            | Self::MissingCallback
            | Self::InvalidCallback
            | Self::InvalidContentType => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SockJsError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::UnknownSession | Self::MalformedPath => status.into_response(),
            Self::MethodNotAllowed => (status, [(ALLOW, "GET")]).into_response(),
            other => (
                status,
                [(CONTENT_TYPE, "text/plain; charset=UTF-8")],
                format!("{other}\n"),
            )
                .into_response(),
        }
    }
}

impl From<serde_json::Error> for SockJsError {
    fn from(err: serde_json::Error) -> Self {
        tracing::debug!(%err, "undecodable payload");
        Self::BrokenJson
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_carry_fixed_messages() {
        let resp = SockJsError::BrokenJson.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(SockJsError::EmptyPayload.to_string(), "Payload expected.");
        assert_eq!(
            SockJsError::MissingCallback.to_string(),
            "\"callback\" parameter required"
        );
    }

    #[test]
    fn not_found_and_method_errors_have_no_content_type() {
        let resp = SockJsError::UnknownSession.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().get(CONTENT_TYPE).is_none());

        let resp = SockJsError::MethodNotAllowed.into_response();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers().get(ALLOW).unwrap(), "GET");
        assert!(resp.headers().get(CONTENT_TYPE).is_none());
    }
}
