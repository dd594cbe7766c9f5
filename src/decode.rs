//! Turns non-success response bodies into [`Error`] values.

use crate::Error;
use http::StatusCode;
use serde::Deserialize;

/// The JSON shape the API uses for errors: `{"error": "<message>"}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Decodes an already drained error body.
///
/// A JSON object with a non-empty `error` field yields that message; an empty
/// body yields [`Error::EmptyBody`]; anything else is reported verbatim.
///
/// # Examples
///
/// ```
/// use ecloud::{decode_error_body, Error};
/// use http::StatusCode;
///
/// let err = decode_error_body(StatusCode::UNAUTHORIZED, br#"{"error":"invalid credentials"}"#);
/// assert_eq!(err.remote_message(), Some("invalid credentials"));
///
/// let err = decode_error_body(StatusCode::BAD_GATEWAY, b"");
/// assert!(matches!(err, Error::EmptyBody { .. }));
/// ```
pub fn decode_error_body(status: StatusCode, body: &[u8]) -> Error {
    if let Ok(ErrorBody { error }) = serde_json::from_slice::<ErrorBody>(body) {
        if !error.is_empty() {
            return Error::Remote {
                status,
                message: error,
            };
        }
    }

    if body.is_empty() {
        return Error::EmptyBody { status };
    }

    Error::Remote {
        status,
        message: String::from_utf8_lossy(body).into_owned(),
    }
}

/// Drains `response` and decodes its body into an error.
///
/// Failures while reading the body are reported as [`Error::BodyRead`] rather
/// than as a remote error.
pub async fn decode_error(response: reqwest::Response) -> Error {
    let status = response.status();
    match response.bytes().await {
        Ok(body) => {
            let err = decode_error_body(status, &body);
            tracing::debug!(status = status.as_u16(), error = %err, "Decoded error response");
            err
        }
        Err(source) => Error::BodyRead { status, source },
    }
}
