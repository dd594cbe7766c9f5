//! The eCloud client, its configuration and its credential lifecycle.
//!
//! The [`Client`] type is the main entry point. Use [`ClientBuilder`] to
//! configure and create clients. Requests themselves are run by
//! [`Client::execute`], see the `executor` module.

use crate::auth::{AuthState, Credential};
use crate::request::RequestEnvelope;
use crate::retry::{DefaultRetryPolicy, RetryPolicy};
use crate::types::{LoginRequest, LoginResponse, User};
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const LOGIN_PATH: &str = "/api/auth/login";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: usize = 3;

/// An authenticated, retrying client for the eCloud API.
///
/// The client is cheap to clone and meant to be shared: clones use the same
/// connection pool and the same credential.
///
/// # Examples
///
/// ```no_run
/// use ecloud::Client;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), ecloud::Error> {
/// let client = Client::builder()
///     .api_base_url("https://ecloud.example.com")?
///     .eclinic_id("clinic-1")
///     .password("secret")
///     .hospital_number("HOS-123")
///     .hospital_name("General Hospital")
///     .eclinic_base_url("https://eclinic.example.com")?
///     .timeout(Duration::from_secs(10))
///     .build()?;
///
/// client.login().await?;
/// let bill = client.get_bill().await?;
/// println!("Subscription costs {} for {:?}", bill.amount, bill.duration);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) http_client: reqwest::Client,
    pub(crate) api_base_url: Url,
    pub(crate) eclinic_base_url: Url,
    pub(crate) eclinic_id: String,
    pub(crate) password: String,
    pub(crate) hospital_number: String,
    pub(crate) hospital_name: String,
    pub(crate) default_headers: HeaderMap,
    pub(crate) retry_policy: Box<dyn RetryPolicy>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) compress_requests: bool,
    pub(crate) auth: AuthState,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_base_url", &self.inner.api_base_url.as_str())
            .field("eclinic_id", &self.inner.eclinic_id)
            .field("hospital_number", &self.inner.hospital_number)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Logs in with the configured credentials and stores the returned token.
    ///
    /// The login request is sent without a bearer token, and a 401 from the
    /// login endpoint is returned as an error rather than triggering another
    /// refresh.
    ///
    /// # Errors
    ///
    /// Returns the decoded remote error for a non-200 status,
    /// [`Error::DeserializationFailed`] for an unreadable body and
    /// [`Error::EmptyToken`] when the body carries no token. The stored
    /// credential is left untouched on any failure.
    pub async fn login(&self) -> Result<LoginResponse> {
        let _guard = self.inner.auth.lock_refresh().await;
        self.login_exchange().await
    }

    /// Replaces the credential by running the login exchange again.
    pub async fn refresh(&self) -> Result<()> {
        self.login().await.map(drop)
    }

    /// Runs the login exchange. Callers must hold the refresh lock.
    pub(crate) async fn login_exchange(&self) -> Result<LoginResponse> {
        let request = LoginRequest {
            eclinic_id: self.inner.eclinic_id.clone(),
            password: self.inner.password.clone(),
        };
        let envelope = RequestEnvelope::new(Method::POST, self.endpoint(LOGIN_PATH)?)
            .with_json(&request)?
            .anonymous();

        let login = self.execute(envelope).await?.json::<LoginResponse>().await?.data;
        let credential = Credential::new(login.token.clone(), login.user.clone())?;
        self.inner.auth.install(credential);

        tracing::info!(
            eclinic_id = %login.user.eclinic_id,
            user_id = login.user.id,
            "Successfully authenticated"
        );
        Ok(login)
    }

    /// Returns the current bearer token, if authenticated.
    pub fn token(&self) -> Option<String> {
        self.inner
            .auth
            .snapshot()
            .credential
            .map(|c| c.token().to_string())
    }

    /// Returns the identity of the logged in account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] before a successful login.
    pub fn user(&self) -> Result<User> {
        self.inner
            .auth
            .snapshot()
            .credential
            .map(|c| c.user().clone())
            .ok_or(Error::NotAuthenticated)
    }

    /// Returns `true` once a login has stored a non-empty token.
    pub fn is_authenticated(&self) -> bool {
        self.inner.auth.is_authenticated()
    }

    /// Installs a credential obtained elsewhere, e.g. restored from storage.
    pub fn set_credential(&self, credential: Credential) {
        self.inner.auth.install(credential);
    }

    /// Forgets the stored credential.
    pub fn logout(&self) {
        self.inner.auth.clear();
    }

    /// The configured hospital number.
    pub fn hospital_number(&self) -> &str {
        &self.inner.hospital_number
    }

    /// The configured hospital name.
    pub fn hospital_name(&self) -> &str {
        &self.inner.hospital_name
    }

    /// The base URL of the eClinic installation this client acts for.
    pub fn eclinic_base_url(&self) -> &Url {
        &self.inner.eclinic_base_url
    }

    /// Builds an absolute URL for an API path.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.inner.api_base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}{}", base, path))?)
    }

    /// Like [`endpoint`](Self::endpoint), then appends each segment
    /// percent-encoded so that `/`, `?` or `#` stay inside it.
    pub(crate) fn endpoint_with<I>(&self, path: &str, segments: I) -> Result<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::ConfigurationError("api base url cannot carry a path".to_string())
            })?
            .extend(segments);
        Ok(url)
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Every identity field is required; [`ClientBuilder::build`] reports the first
/// one missing, in the order the setters are listed here.
///
/// # Examples
///
/// ```no_run
/// use ecloud::{ClientBuilder, retry::DefaultRetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), ecloud::Error> {
/// let client = ClientBuilder::new()
///     .api_base_url("https://ecloud.example.com")?
///     .eclinic_id("clinic-1")
///     .password("secret")
///     .hospital_number("HOS-123")
///     .hospital_name("General Hospital")
///     .eclinic_base_url("https://eclinic.example.com")?
///     .retry_policy(Box::new(DefaultRetryPolicy::new(5)))
///     .default_header("User-Agent", "eclinic/2.1")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    api_base_url: Option<Url>,
    eclinic_id: Option<String>,
    password: Option<String>,
    hospital_number: Option<String>,
    hospital_name: Option<String>,
    eclinic_base_url: Option<Url>,
    http_client: Option<reqwest::Client>,
    default_headers: HeaderMap,
    retry_policy: Option<Box<dyn RetryPolicy>>,
    timeout: Option<Duration>,
    compress_requests: bool,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            api_base_url: None,
            eclinic_id: None,
            password: None,
            hospital_number: None,
            hospital_name: None,
            eclinic_base_url: None,
            http_client: None,
            default_headers: HeaderMap::new(),
            retry_policy: None,
            timeout: Some(DEFAULT_TIMEOUT),
            compress_requests: true,
        }
    }

    /// Sets the eCloud API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn api_base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.api_base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the eCloud ID used to log in.
    pub fn eclinic_id(mut self, eclinic_id: impl Into<String>) -> Self {
        self.eclinic_id = Some(eclinic_id.into());
        self
    }

    /// Sets the eCloud password used to log in.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the hospital number stamped on subscriptions and uploads.
    pub fn hospital_number(mut self, hospital_number: impl Into<String>) -> Self {
        self.hospital_number = Some(hospital_number.into());
        self
    }

    /// Sets the hospital name stamped on subscriptions.
    pub fn hospital_name(mut self, hospital_name: impl Into<String>) -> Self {
        self.hospital_name = Some(hospital_name.into());
        self
    }

    /// Sets the base URL of the eClinic installation.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn eclinic_base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.eclinic_base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Uses a preconfigured `reqwest` client as the transport.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the retry policy.
    ///
    /// Defaults to [`DefaultRetryPolicy`] with three retries.
    pub fn retry_policy(mut self, policy: Box<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the per-attempt timeout. Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Removes the per-attempt timeout.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sets whether request bodies are gzip-compressed when a request does
    /// not say otherwise. Defaults to `true`. Multipart bodies are never
    /// compressed.
    pub fn compress_requests(mut self, compress: bool) -> Self {
        self.compress_requests = compress;
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] naming the first missing
    /// required setting, or if the HTTP client cannot be created.
    pub fn build(self) -> Result<Client> {
        let api_base_url = self.api_base_url.ok_or_else(|| missing("api base url"))?;
        let eclinic_id = required(self.eclinic_id, "eclinic id")?;
        let password = required(self.password, "password")?;
        let hospital_number = required(self.hospital_number, "hospital number")?;
        let hospital_name = required(self.hospital_name, "hospital name")?;
        let eclinic_base_url = self
            .eclinic_base_url
            .ok_or_else(|| missing("eclinic base url"))?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().build().map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?,
        };

        let retry_policy = self
            .retry_policy
            .unwrap_or_else(|| Box::new(DefaultRetryPolicy::new(DEFAULT_MAX_RETRIES)));

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                api_base_url,
                eclinic_base_url,
                eclinic_id,
                password,
                hospital_number,
                hospital_name,
                default_headers: self.default_headers,
                retry_policy,
                timeout: self.timeout,
                compress_requests: self.compress_requests,
                auth: AuthState::default(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(setting: &str) -> Error {
    Error::ConfigurationError(format!("{} is required", setting))
}

fn required(value: Option<String>, setting: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(setting))
}
