//! # ecloud - A resilient client for the eCloud patient records API
//!
//! `ecloud` lets a hospital's eClinic installation talk to eCloud: log in,
//! manage patient subscriptions and payments, and upload visit reports. Every
//! call goes through one request pipeline built on `reqwest` that retries
//! transient failures, refreshes an expired bearer token transparently and
//! gzip-compresses request bodies.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ecloud::{Client, PatientRecord, SubscribeRequest};
//! use chrono::Utc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ecloud::Error> {
//!     let client = Client::builder()
//!         .api_base_url("https://ecloud.example.com")?
//!         .eclinic_id("clinic-1")
//!         .password("secret")
//!         .hospital_number("HOS-123")
//!         .hospital_name("General Hospital")
//!         .eclinic_base_url("https://eclinic.example.com")?
//!         .build()?;
//!
//!     client.login().await?;
//!
//!     let subscriber = client
//!         .subscribe(&SubscribeRequest {
//!             patient_id: 12345,
//!             patient_name: "Jane Doe".to_string(),
//!             email: "jane@example.com".to_string(),
//!             registered_by: "clerk01".to_string(),
//!         })
//!         .await?;
//!     client.create_payment(subscriber.id, 5000.0, "clerk01").await?;
//!
//!     let report = std::fs::read("visit.pdf").expect("report");
//!     client
//!         .sync_medical_records(&PatientRecord {
//!             visit_id: 88,
//!             subscriber_id: subscriber.id,
//!             visit_timestamp: Some(Utc::now().fixed_offset()),
//!             title: "Follow-up".to_string(),
//!             medical_report: Some(report),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Retries** - transport failures, 5xx and 401 responses are retried with
//!   quadratic backoff by default; the policy is pluggable
//! - **Transparent re-login** - a 401 on an authenticated request re-runs the
//!   login exchange once and retries with the new token
//! - **Compression** - JSON bodies are gzip-compressed once and reused across
//!   attempts; multipart uploads are sent untouched
//! - **Upload validation** - reports are sniffed as PDFs before any byte hits
//!   the network
//! - **Structured logging** with `tracing`
//!
//! ## Lower level access
//!
//! Operations not covered by the typed helpers can go through the executor
//! directly:
//!
//! ```no_run
//! use ecloud::{Client, RequestEnvelope};
//! use http::Method;
//!
//! # async fn example(client: &Client) -> Result<(), ecloud::Error> {
//! let url = url::Url::parse("https://ecloud.example.com/api/custom")?;
//! let exchange = client
//!     .execute(RequestEnvelope::new(Method::GET, url).compress(false))
//!     .await?;
//! println!("{} after {} attempts", exchange.status(), exchange.attempts());
//! let data: serde_json::Value = exchange.json().await?.data;
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod decode;
mod error;
mod executor;
pub mod multipart;
mod pdf;
mod request;
mod response;
pub mod retry;
mod services;
mod types;

pub use auth::Credential;
pub use client::{Client, ClientBuilder};
pub use decode::{decode_error, decode_error_body};
pub use error::{Error, Result};
pub use multipart::{Attachment, MultipartForm, ReportKind};
pub use pdf::is_valid_pdf;
pub use request::RequestEnvelope;
pub use response::{Exchange, Response};
pub use retry::{DefaultRetryPolicy, RetryPolicy};
pub use types::{
    Bill, LoginRequest, LoginResponse, PatientRecord, Payment, SubscribeRequest, Subscriber, User,
};
