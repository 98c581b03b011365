use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use hearth_relay::error::{Error, ErrorKind};

use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    description: &'a str,
}

/// A response describing why a request failed.
///
/// The body is a `JSON` object with the error `kind` and its
/// `description`.
pub struct ErrorResponse(Response);

impl ErrorResponse {
    /// Generates an [`ErrorResponse`] with a status code.
    #[must_use]
    #[inline]
    pub fn with_status(status: StatusCode, kind: &str, description: &str) -> Self {
        Self((status, Json(ErrorBody { kind, description })).into_response())
    }

    /// Generates an [`ErrorResponse`] for a missing resource.
    #[must_use]
    #[inline]
    pub fn not_found(description: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, "Not found", description)
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.0.status()
    }
}

impl From<Error> for ErrorResponse {
    fn from(error: Error) -> Self {
        let status = match error.kind() {
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Remote => StatusCode::BAD_GATEWAY,
            ErrorKind::NotActive | ErrorKind::Closed | ErrorKind::Transport => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::DuplicateId => StatusCode::CONFLICT,
            ErrorKind::UnknownSource | ErrorKind::UnknownAction => StatusCode::NOT_FOUND,
            ErrorKind::Decode => StatusCode::BAD_REQUEST,
            ErrorKind::Handshake | ErrorKind::Encode | ErrorKind::Handler => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::with_status(status, &error.kind().to_string(), error.description())
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use hearth_relay::error::{Error, ErrorKind};

    use super::ErrorResponse;

    #[test]
    fn test_status_codes() {
        let status = |kind| ErrorResponse::from(Error::new(kind, "failure")).status();

        assert_eq!(status(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status(ErrorKind::Remote), StatusCode::BAD_GATEWAY);
        assert_eq!(status(ErrorKind::NotActive), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(ErrorKind::Closed), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(ErrorKind::DuplicateId), StatusCode::CONFLICT);
        assert_eq!(
            ErrorResponse::not_found("no state for `dyson`").status(),
            StatusCode::NOT_FOUND
        );
    }
}
