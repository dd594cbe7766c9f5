//! Completed exchanges and typed responses.
//!
//! The executor returns an [`Exchange`]: the final HTTP response together with
//! how many attempts it took. Interpreting the status is left to the caller,
//! which usually goes through [`Exchange::json`] or [`Exchange::ok`] so that
//! non-success bodies are run through the error decoder.

use crate::decode::decode_error;
use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// The outcome of [`Client::execute`](crate::Client::execute).
///
/// The body of the wrapped response has not been read yet; releasing it is up
/// to whoever consumes the exchange.
#[derive(Debug)]
pub struct Exchange {
    response: reqwest::Response,
    attempts: usize,
    latency: Duration,
}

impl Exchange {
    pub(crate) fn new(response: reqwest::Response, attempts: usize, latency: Duration) -> Self {
        Self {
            response,
            attempts,
            latency,
        }
    }

    /// The HTTP status of the final response.
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// The headers of the final response.
    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// The number of attempts made, including the first one.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Time from the first attempt until the final response arrived.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Returns `true` if more than one attempt was needed.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Gives up the wrapper and returns the raw response.
    pub fn into_response(self) -> reqwest::Response {
        self.response
    }

    /// Requires a `200 OK` status, decoding the error body otherwise, and
    /// discards the body.
    ///
    /// # Errors
    ///
    /// Returns the decoded remote error for any other status.
    pub async fn ok(self) -> Result<()> {
        self.check_ok().await.map(drop)
    }

    /// Requires a `200 OK` status and deserializes the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the decoded remote error for any other status, and
    /// [`Error::DeserializationFailed`] with the raw body when the JSON does
    /// not match `T`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<Response<T>> {
        let Exchange {
            response,
            attempts,
            latency,
        } = self.check_ok().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let raw_body = response
            .text()
            .await
            .map_err(|source| Error::BodyRead { status, source })?;

        match serde_json::from_str::<T>(&raw_body) {
            Ok(data) => Ok(Response {
                data,
                raw_body,
                status,
                headers,
                latency,
                attempts,
            }),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    raw_response = %raw_body,
                    "Failed to deserialize response"
                );
                Err(Error::DeserializationFailed {
                    raw_response: raw_body,
                    serde_error: e.to_string(),
                    status,
                })
            }
        }
    }

    async fn check_ok(self) -> Result<Self> {
        let status = self.response.status();
        if status == StatusCode::OK {
            return Ok(self);
        }

        if status.is_client_error() {
            tracing::error!(status = status.as_u16(), "Client error (4xx)");
        } else if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "Server error (5xx)");
        }
        Err(decode_error(self.response).await)
    }
}

/// A successfully deserialized response with its exchange metadata.
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized response data.
    pub data: T,

    /// The raw response body as a string.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The total latency, including every retry attempt and backoff.
    pub latency: Duration,

    /// The number of attempts made to complete this request.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Maps the response data to a different type, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Discards the metadata.
    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}
