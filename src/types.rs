//! Wire types exchanged with the eCloud API.

use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Credentials sent to the login endpoint.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    /// The eClinic installation's eCloud ID.
    pub eclinic_id: String,
    /// The eCloud password.
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("eclinic_id", &self.eclinic_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The account identity returned alongside a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// eCloud user ID.
    pub id: u64,
    /// Unique eCloud ID.
    pub eclinic_id: String,
    /// Populated by the server when the user is created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Whether the user is an administrator.
    pub is_admin: bool,
    /// Whether the account is allowed to log in.
    pub active: bool,
}

/// Body of a successful login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests.
    #[serde(default)]
    pub token: String,
    /// The authenticated account.
    #[serde(default)]
    pub user: User,
}

/// Subscription price and how long a paid subscription lasts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    /// Subscription amount.
    #[serde(rename = "Amount")]
    pub amount: f64,
    /// Duration of the subscription before expiry, sent as nanoseconds.
    #[serde(rename = "Duration", with = "duration_nanos")]
    pub duration: Duration,
}

mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(duration.as_nanos()).map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

/// A patient subscribed to cloud record storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscriber {
    /// Primary key of the subscription.
    pub id: u64,
    /// Unique subscription ID.
    pub eclinic_id: String,
    /// Patient ID in the hospital system.
    pub patient_id: u64,
    /// Name of the patient.
    pub patient_name: String,
    /// Optional email.
    pub email: String,
    /// Globally unique hospital number.
    pub hospital_number: String,
    /// Hospital name.
    pub hospital_name: String,
    /// The person who subscribed the patient.
    pub registered_by: String,
    /// Populated by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for [`Client::subscribe`](crate::Client::subscribe).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub patient_id: u64,
    pub patient_name: String,
    pub email: String,
    pub registered_by: String,
}

/// A payment for a patient's subscription.
///
/// A payment is valid from the time it is made until `valid_to`, after which
/// the patient's records stop being accessible until renewed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    #[serde(skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub subscriber_id: u64,
    #[serde(skip_serializing_if = "is_zero_amount")]
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub registered_by: String,
    /// Whether the records covered by this payment were already uploaded.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub records_uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_uploaded: Option<DateTime<Utc>>,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

fn is_zero_amount(n: &f64) -> bool {
    *n == 0.0
}

/// A visit's medical records, uploaded as a multipart form.
///
/// At least one of `medical_report` and `lab_report` must be present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientRecord {
    pub id: u64,
    pub hospital_number: String,
    pub visit_id: u64,
    pub subscriber_id: u64,
    pub visit_timestamp: Option<DateTime<FixedOffset>>,
    pub created_at: Option<DateTime<Utc>>,
    pub title: String,
    /// PDF bytes of the medical report.
    pub medical_report: Option<Vec<u8>>,
    /// PDF bytes of the laboratory report.
    pub lab_report: Option<Vec<u8>>,
}

impl PatientRecord {
    /// Checks the fields required for an upload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first missing field, or
    /// [`Error::MissingReports`] when neither report is present.
    pub fn validate(&self) -> Result<()> {
        if self.visit_id == 0 {
            return Err(Error::Validation("patient record missing visit id".into()));
        }
        if self.subscriber_id == 0 {
            return Err(Error::Validation(
                "patient record missing subscriber id".into(),
            ));
        }
        if self.title.is_empty() {
            return Err(Error::Validation("patient record missing title".into()));
        }
        if self.visit_timestamp.is_none() {
            return Err(Error::Validation(
                "patient record missing valid visit timestamp".into(),
            ));
        }
        if self.medical_report.is_none() && self.lab_report.is_none() {
            return Err(Error::MissingReports);
        }
        Ok(())
    }
}
