use crate::domain::errors::RequestError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::SinkUnavailable
            | RequestError::ShuttingDown
            | RequestError::RelayBackpressureTimeout { .. }
            | RequestError::RelayClosed => StatusCode::SERVICE_UNAVAILABLE,
            RequestError::FlushFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RequestError::BodyRead { .. } => StatusCode::BAD_REQUEST,
            RequestError::ReadTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            RequestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RequestError::SinkUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RequestError::ReadTimeout {
                timeout: Duration::from_secs(10)
            }
            .status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            RequestError::FlushFailed {
                reason: "disk full".to_string()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_response_body_is_message() {
        let response = RequestError::SinkUnavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"metrics sink not ready");
    }
}
