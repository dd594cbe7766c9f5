//! The resilient request pipeline.
//!
//! [`Client::execute`] turns a [`RequestEnvelope`] into a completed exchange.
//! Each attempt is built fresh from the envelope; after it, a pure transition
//! function decides whether the loop is done, waits and tries again, or
//! refreshes the credential first. Keeping that decision apart from the I/O
//! lets the retry and refresh interplay be tested without a network.

use crate::auth::{Credential, Snapshot};
use crate::request::RequestEnvelope;
use crate::response::Exchange;
use crate::retry::{Outcome, RetryPolicy};
use crate::{Client, Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// Where the retry loop goes after an attempt.
///
/// Together with the implicit `Attempting` state (sending a request) these
/// are the states of the executor: after each attempt it is either done,
/// awaiting a backoff before the next attempt, or refreshing the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Hand the current response or error back to the caller.
    Done,
    /// Sleep for the given duration, then attempt again.
    AwaitBackoff(Duration),
    /// Re-run the login exchange, then consult [`after_refresh`].
    RefreshCredential,
}

/// Decides what follows a transport failure on `attempt`.
pub(crate) fn after_transport_error(
    policy: &dyn RetryPolicy,
    attempt: usize,
    error: &Error,
) -> Transition {
    retry_or_done(policy, attempt, Outcome::Transport(error))
}

/// Decides what follows a completed exchange on `attempt`.
///
/// A 401 leads to a refresh only when the request was sent with a credential;
/// otherwise there is nothing a retry could change.
pub(crate) fn after_response(
    policy: &dyn RetryPolicy,
    attempt: usize,
    status: StatusCode,
    authenticated: bool,
) -> Transition {
    if status == StatusCode::UNAUTHORIZED {
        return if authenticated {
            Transition::RefreshCredential
        } else {
            Transition::Done
        };
    }
    retry_or_done(policy, attempt, Outcome::Status(status))
}

/// Decides what follows a successful refresh triggered by a 401 on `attempt`.
pub(crate) fn after_refresh(policy: &dyn RetryPolicy, attempt: usize) -> Transition {
    retry_or_done(policy, attempt, Outcome::Status(StatusCode::UNAUTHORIZED))
}

// The loop never goes past `max_retries`, whatever the policy answers.
fn retry_or_done(policy: &dyn RetryPolicy, attempt: usize, outcome: Outcome<'_>) -> Transition {
    if attempt < policy.max_retries() && policy.should_retry(attempt, outcome) {
        Transition::AwaitBackoff(policy.backoff(attempt))
    } else {
        Transition::Done
    }
}

/// Gzip-encodes a request body.
pub(crate) fn gzip(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(raw).map_err(Error::Compression)?;
    encoder.finish().map_err(Error::Compression)
}

type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

impl Client {
    /// Performs one logical operation, retrying and refreshing as needed.
    ///
    /// The request gets, in order: the bearer token when authenticated, the
    /// client's default headers, the envelope's headers, and then
    /// `Content-Type: application/json` and `Accept: application/json` unless
    /// already set. `Accept-Encoding: gzip` is always sent. Bodies are
    /// gzip-compressed once up front (never for multipart bodies) and marked
    /// with `Content-Encoding: gzip`. A multipart form is rebuilt for every
    /// attempt and brings its own boundary-bearing content type.
    ///
    /// Transport failures and retryable statuses are retried according to the
    /// client's [`RetryPolicy`]. A 401 on an authenticated request refreshes
    /// the credential and retries once with the new token; if the refresh
    /// itself fails the 401 is returned and the refresh error is only logged.
    ///
    /// The status of the returned exchange is not interpreted: a 404 comes
    /// back as `Ok`. Dropping the returned future cancels the in-flight
    /// attempt or backoff.
    ///
    /// # Errors
    ///
    /// Returns the last transport error when no response was ever received,
    /// and [`Error::Compression`] if the body could not be compressed.
    pub async fn execute(&self, envelope: RequestEnvelope) -> Result<Exchange> {
        let start_time = Instant::now();
        let policy = self.inner.retry_policy.as_ref();

        let multipart = envelope.is_multipart();
        let compress = !multipart && envelope.compress.unwrap_or(self.inner.compress_requests);
        let (body, compressed) = match envelope.body.as_deref() {
            Some(raw) if compress => (Some(gzip(raw)?), true),
            _ => (envelope.body.clone(), false),
        };

        let mut last_response: Option<reqwest::Response> = None;
        let mut attempt = 0;

        loop {
            let auth = if envelope.anonymous {
                None
            } else {
                Some(self.inner.auth.snapshot())
            };
            let credential = auth.as_ref().and_then(|s| s.credential.as_deref());
            let authenticated = auth.as_ref().is_some_and(Snapshot::is_authenticated);

            let headers = self.request_headers(&envelope, credential, compressed)?;
            let mut request = self
                .inner
                .http_client
                .request(envelope.method.clone(), envelope.url.clone())
                .headers(headers);
            if let Some(form) = &envelope.multipart {
                request = request.multipart(form.to_form()?);
            } else if let Some(body) = &body {
                request = request.body(body.clone());
            }
            if let Some(timeout) = self.inner.timeout {
                request = request.timeout(timeout);
            }

            tracing::debug!(
                method = %envelope.method,
                url = %envelope.url,
                attempt = attempt,
                compressed = compressed,
                "Executing HTTP request"
            );

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let error = Error::from_transport(e);
                    match after_transport_error(policy, attempt, &error) {
                        Transition::AwaitBackoff(delay) => {
                            tracing::debug!(
                                error = %error,
                                attempt = attempt,
                                delay_ms = delay.as_millis(),
                                "Request failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                        _ => {
                            tracing::warn!(
                                error = %error,
                                attempt = attempt,
                                method = %envelope.method,
                                url = %envelope.url,
                                "Request failed"
                            );
                            // Prefer a server-issued diagnostic over a bare
                            // connection failure.
                            return match last_response {
                                Some(response) => {
                                    Ok(self.finish(response, attempt, start_time))
                                }
                                None => Err(error),
                            };
                        }
                    }
                }
            };

            match after_response(policy, attempt, response.status(), authenticated) {
                Transition::Done => return Ok(self.finish(response, attempt, start_time)),
                Transition::AwaitBackoff(delay) => {
                    tracing::debug!(
                        status = response.status().as_u16(),
                        attempt = attempt,
                        delay_ms = delay.as_millis(),
                        "Retryable status, retrying"
                    );
                    // Replacing the previous capture releases its connection.
                    last_response = Some(response);
                    tokio::time::sleep(delay).await;
                }
                Transition::RefreshCredential => {
                    tracing::debug!(attempt = attempt, "Received 401, attempting token refresh");
                    let generation = auth.map_or(0, |s| s.generation);
                    if let Err(e) = self.refresh_stale(generation).await {
                        tracing::error!(error = %e, "Token refresh failed");
                        return Ok(self.finish(response, attempt, start_time));
                    }
                    match after_refresh(policy, attempt) {
                        Transition::AwaitBackoff(delay) => {
                            drop(response);
                            tokio::time::sleep(delay).await;
                        }
                        _ => return Ok(self.finish(response, attempt, start_time)),
                    }
                }
            }

            attempt += 1;
        }
    }

    fn finish(&self, response: reqwest::Response, attempt: usize, start_time: Instant) -> Exchange {
        let latency = start_time.elapsed();
        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = latency.as_millis(),
            attempts = attempt + 1,
            "Received HTTP response"
        );
        Exchange::new(response, attempt + 1, latency)
    }

    fn request_headers(
        &self,
        envelope: &RequestEnvelope,
        credential: Option<&Credential>,
        compressed: bool,
    ) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(credential) = credential {
            let mut value = HeaderValue::try_from(format!("Bearer {}", credential.token()))
                .map_err(|e| {
                    Error::ConfigurationError(format!("Invalid bearer token: {}", e))
                })?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        headers.extend(self.inner.default_headers.clone());
        headers.extend(envelope.headers.clone());

        if envelope.multipart.is_some() {
            headers.remove(header::CONTENT_TYPE);
        } else {
            headers
                .entry(header::CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
        }
        headers
            .entry(header::ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        if compressed {
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }

        Ok(headers)
    }

    /// Refreshes the credential a request was sent with.
    ///
    /// When another caller already replaced generation `seen` while this one
    /// waited for the refresh lock, its result is reused instead of logging in
    /// again. Boxed because the login exchange runs through `execute` itself.
    fn refresh_stale(&self, seen: u64) -> RefreshFuture<'_> {
        Box::pin(async move {
            let _guard = self.inner.auth.lock_refresh().await;
            if self.inner.auth.generation() != seen {
                tracing::debug!("Credential already refreshed by another request");
                return Ok(());
            }
            self.login_exchange().await.map(drop)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::MultipartForm;
    use crate::retry::DefaultRetryPolicy;
    use flate2::read::GzDecoder;
    use std::io::Read;

    /// Retries everything, regardless of outcome.
    struct Always(usize);

    impl RetryPolicy for Always {
        fn should_retry(&self, _attempt: usize, _outcome: Outcome<'_>) -> bool {
            true
        }

        fn backoff(&self, attempt: usize) -> Duration {
            Duration::from_millis(attempt as u64)
        }

        fn max_retries(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_transport_errors_back_off_until_ceiling() {
        let policy = DefaultRetryPolicy::new(3);
        let error = Error::Timeout;

        assert_eq!(
            after_transport_error(&policy, 0, &error),
            Transition::AwaitBackoff(Duration::ZERO)
        );
        assert_eq!(
            after_transport_error(&policy, 2, &error),
            Transition::AwaitBackoff(Duration::from_secs(4))
        );
        assert_eq!(after_transport_error(&policy, 3, &error), Transition::Done);
    }

    #[test]
    fn test_server_errors_back_off_and_client_errors_finish() {
        let policy = DefaultRetryPolicy::new(3);

        assert_eq!(
            after_response(&policy, 1, StatusCode::BAD_GATEWAY, true),
            Transition::AwaitBackoff(Duration::from_secs(1))
        );
        assert_eq!(
            after_response(&policy, 1, StatusCode::NOT_FOUND, true),
            Transition::Done
        );
        assert_eq!(
            after_response(&policy, 0, StatusCode::OK, true),
            Transition::Done
        );
        assert_eq!(
            after_response(&policy, 3, StatusCode::INTERNAL_SERVER_ERROR, true),
            Transition::Done
        );
    }

    #[test]
    fn test_unauthorized_refreshes_only_when_authenticated() {
        let policy = DefaultRetryPolicy::new(3);

        assert_eq!(
            after_response(&policy, 0, StatusCode::UNAUTHORIZED, true),
            Transition::RefreshCredential
        );
        assert_eq!(
            after_response(&policy, 0, StatusCode::UNAUTHORIZED, false),
            Transition::Done
        );
        // Even on the last attempt the credential is renewed for later calls.
        assert_eq!(
            after_response(&policy, 3, StatusCode::UNAUTHORIZED, true),
            Transition::RefreshCredential
        );
    }

    #[test]
    fn test_after_refresh_asks_the_policy() {
        let policy = DefaultRetryPolicy::new(2);

        assert_eq!(
            after_refresh(&policy, 1),
            Transition::AwaitBackoff(Duration::from_secs(1))
        );
        assert_eq!(after_refresh(&policy, 2), Transition::Done);
    }

    #[test]
    fn test_ceiling_holds_for_permissive_policies() {
        let policy = Always(2);
        let error = Error::Timeout;

        assert_eq!(
            after_response(&policy, 1, StatusCode::BAD_REQUEST, false),
            Transition::AwaitBackoff(Duration::from_millis(1))
        );
        assert_eq!(
            after_response(&policy, 2, StatusCode::BAD_REQUEST, false),
            Transition::Done
        );
        assert_eq!(after_transport_error(&policy, 2, &error), Transition::Done);
        assert_eq!(after_refresh(&policy, 2), Transition::Done);
    }

    fn client() -> Client {
        Client::builder()
            .api_base_url("http://localhost")
            .unwrap()
            .eclinic_id("test-id")
            .password("test-password")
            .hospital_number("HOS-123")
            .hospital_name("Test Hospital")
            .eclinic_base_url("http://eclinic")
            .unwrap()
            .build()
            .unwrap()
    }

    fn records_envelope() -> RequestEnvelope {
        RequestEnvelope::new(
            http::Method::POST,
            url::Url::parse("http://localhost/api/records").unwrap(),
        )
    }

    #[test]
    fn test_json_requests_default_their_content_type() {
        let headers = client()
            .request_headers(&records_envelope(), None, true)
            .unwrap();

        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::ACCEPT_ENCODING], "gzip");
        assert_eq!(headers[header::CONTENT_ENCODING], "gzip");
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_form_requests_leave_content_type_to_the_form() {
        let envelope = records_envelope()
            .with_header("Content-Type", "multipart/form-data; boundary=stale")
            .unwrap()
            .with_multipart(MultipartForm::new().text("title", "t"));
        let credential = Credential::new("t1", Default::default()).unwrap();

        let headers = client()
            .request_headers(&envelope, Some(&credential), false)
            .unwrap();

        assert!(headers.get(header::CONTENT_TYPE).is_none());
        assert!(headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(headers[header::AUTHORIZATION], "Bearer t1");
    }

    #[test]
    fn test_gzip_round_trip() {
        let raw = br#"{"subscriber_id":9,"amount":250.0}"#;
        let compressed = gzip(raw).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, raw);
    }
}
