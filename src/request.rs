//! The per-operation request description handed to the executor.

use crate::multipart::MultipartForm;
use crate::{Error, Result};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use url::Url;

/// Everything needed to perform one logical operation.
///
/// The envelope is never sent as-is: the executor builds a fresh request from
/// it on every attempt, so the body is kept as owned bytes rather than a
/// single-pass stream.
///
/// # Examples
///
/// ```
/// use ecloud::RequestEnvelope;
/// use http::Method;
/// use url::Url;
///
/// # fn example() -> Result<(), ecloud::Error> {
/// let url = Url::parse("https://ecloud.example.com/api/payments")?;
/// let envelope = RequestEnvelope::new(Method::POST, url)
///     .with_json(&serde_json::json!({"subscriber_id": 9, "amount": 250.0}))?
///     .with_header("X-Request-Id", "abc-123")?
///     .compress(false);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The absolute target URL.
    pub url: Url,

    /// Header overrides for this request.
    pub headers: HeaderMap,

    /// The request body, if any.
    pub body: Option<Vec<u8>>,

    /// A multipart form, materialized afresh on every attempt. Takes the
    /// place of `body`.
    pub multipart: Option<MultipartForm>,

    /// Whether to gzip the body. `None` uses the client default.
    pub compress: Option<bool>,

    /// Anonymous requests carry no bearer token and never trigger a
    /// credential refresh. Used for the login exchange itself.
    pub anonymous: bool,
}

impl RequestEnvelope {
    /// Creates an envelope with no body and no header overrides.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            multipart: None,
            compress: None,
            anonymous: false,
        }
    }

    /// Adds a header, replacing any previous value with the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets a raw body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `value` cannot be serialized.
    pub fn with_json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body =
            serde_json::to_vec(value).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        Ok(self.with_body(body))
    }

    /// Sends `form` as the body. The boundary-bearing content type is set
    /// when the form is materialized, replacing any declared one.
    pub fn with_multipart(mut self, form: MultipartForm) -> Self {
        self.body = None;
        self.multipart = Some(form);
        self
    }

    /// Requests (or suppresses) gzip compression of the body.
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    /// Marks the request as sent without credentials.
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    /// Returns `true` for a multipart form, or when the declared content type
    /// is `multipart/form-data`.
    pub fn is_multipart(&self) -> bool {
        self.multipart.is_some()
            || self
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| {
                    ct.get(..19)
                        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/form-data"))
                })
    }
}
