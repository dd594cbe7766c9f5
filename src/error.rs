//! Error types for eCloud API calls.
//!
//! Errors fall into a handful of classes: client-side validation (caught before
//! any network call), transport failures, remote errors decoded from non-2xx
//! responses, and protocol-contract violations such as a login response without
//! a token. Every remote error keeps the HTTP status it came from.

use crate::multipart::ReportKind;
use http::StatusCode;

/// The main error type for eCloud API calls.
///
/// # Examples
///
/// ```no_run
/// use ecloud::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .api_base_url("https://ecloud.example.com")?
///     .eclinic_id("clinic-1")
///     .password("secret")
///     .hospital_number("HOS-123")
///     .hospital_name("General Hospital")
///     .eclinic_base_url("https://eclinic.example.com")?
///     .build()?;
///
/// match client.login().await {
///     Ok(login) => println!("Logged in as {}", login.user.eclinic_id),
///     Err(Error::Remote { status, message }) => {
///         eprintln!("Login rejected ({}): {}", status, message);
///     }
///     Err(Error::EmptyToken) => eprintln!("Server returned no token"),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection failed, DNS lookup failed, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request took longer than the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The server returned a non-2xx status with a message.
    ///
    /// The message is either the `error` field of a JSON error body or the raw
    /// body text when the body has another shape.
    #[error("Remote error (status {status}): {message}")]
    Remote {
        /// The HTTP status code
        status: StatusCode,
        /// The server supplied message or raw body text
        message: String,
    },

    /// The server returned a non-2xx status with an empty body.
    #[error("Empty response body (status {status})")]
    EmptyBody {
        /// The HTTP status code
        status: StatusCode,
    },

    /// Draining a response body failed.
    #[error("Failed to read response body (status {status}): {source}")]
    BodyRead {
        /// The HTTP status code
        status: StatusCode,
        /// The underlying read error
        #[source]
        source: reqwest::Error,
    },

    /// Failed to deserialize a success body into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The login exchange succeeded but carried no token.
    #[error("Empty token received")]
    EmptyToken,

    /// An operation that needs a credential was called before login.
    #[error("Client not authenticated")]
    NotAuthenticated,

    /// A patient record upload carried neither a medical nor a lab report.
    #[error("No medical report or laboratory report to upload")]
    MissingReports,

    /// A report attachment is not a structurally valid PDF.
    #[error("Invalid PDF for {0}")]
    InvalidReport(ReportKind),

    /// Caller supplied input failed validation before any request was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid client configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Gzip-encoding the request body failed.
    #[error("Failed to compress request body: {0}")]
    Compression(#[source] std::io::Error),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided or produced.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Builds a transport error, separating timeouts from other failures.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(err)
        }
    }

    /// Returns `true` if this error is potentially retryable.
    ///
    /// Transport failures, 5xx remote errors and 401 remote errors are
    /// retryable. Validation and protocol-contract errors never are.
    ///
    /// # Examples
    ///
    /// ```
    /// use ecloud::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::Remote {
    ///     status: StatusCode::BAD_GATEWAY,
    ///     message: "upstream down".to_string(),
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::Remote {
    ///     status: StatusCode::BAD_REQUEST,
    ///     message: "bad visit id".to_string(),
    /// };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout => true,
            Error::Remote { status, .. }
            | Error::EmptyBody { status }
            | Error::BodyRead { status, .. } => {
                status.is_server_error() || *status == StatusCode::UNAUTHORIZED
            }
            Error::DeserializationFailed { .. }
            | Error::EmptyToken
            | Error::NotAuthenticated
            | Error::MissingReports
            | Error::InvalidReport(_)
            | Error::Validation(_)
            | Error::ConfigurationError(_)
            | Error::Compression(_)
            | Error::SerializationFailed(_)
            | Error::InvalidUrl(_) => false,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Remote { status, .. }
            | Error::EmptyBody { status }
            | Error::BodyRead { status, .. }
            | Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the remote message or raw body text, if this error has one.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Error::Remote { message, .. } => Some(message),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for eCloud API calls.
pub type Result<T> = std::result::Result<T, Error>;
