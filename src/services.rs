//! Typed wrappers for the eCloud endpoints.
//!
//! Each operation builds an envelope, runs it through [`Client::execute`] and
//! decodes the body. Anything but `200 OK` goes through the error decoder.

use crate::multipart::encode_patient_record;
use crate::request::RequestEnvelope;
use crate::types::{Bill, PatientRecord, Payment, SubscribeRequest, Subscriber};
use crate::{Client, Error, Result};
use http::Method;
use serde::de::DeserializeOwned;
use url::Url;

impl Client {
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let envelope = RequestEnvelope::new(Method::GET, url);
        Ok(self.execute(envelope).await?.json::<T>().await?.data)
    }

    /// Fetches the current subscription price and duration.
    pub async fn get_bill(&self) -> Result<Bill> {
        self.get_json(self.endpoint("/api/billing/get_bill")?).await
    }

    /// Subscribes a patient of the configured hospital.
    pub async fn subscribe(&self, request: &SubscribeRequest) -> Result<Subscriber> {
        let subscriber = Subscriber {
            patient_id: request.patient_id,
            patient_name: request.patient_name.clone(),
            email: request.email.clone(),
            registered_by: request.registered_by.clone(),
            hospital_number: self.inner.hospital_number.clone(),
            hospital_name: self.inner.hospital_name.clone(),
            ..Default::default()
        };

        let envelope = RequestEnvelope::new(Method::POST, self.endpoint("/api/subscriptions")?)
            .with_json(&subscriber)?;
        Ok(self.execute(envelope).await?.json().await?.data)
    }

    /// Fetches a subscriber by subscription ID.
    pub async fn get_subscriber(&self, subscriber_id: u64) -> Result<Subscriber> {
        let url = self.endpoint_with("/api/subscriptions", [subscriber_id.to_string()])?;
        self.get_json(url).await
    }

    /// Looks up the subscription of a patient of the configured hospital.
    pub async fn get_patient_subscription(&self, patient_id: u64) -> Result<Subscriber> {
        let url = self.endpoint_with(
            "/api/subscriptions/check_subscription",
            [self.inner.hospital_number.clone(), patient_id.to_string()],
        )?;
        self.get_json(url).await
    }

    /// Lists every subscriber of the configured hospital.
    pub async fn get_hospital_subscribers(&self) -> Result<Vec<Subscriber>> {
        let mut url = self.endpoint("/api/subscriptions")?;
        url.query_pairs_mut()
            .append_pair("hospital_number", &self.inner.hospital_number);

        let envelope = RequestEnvelope::new(Method::GET, url);
        Ok(self.execute(envelope).await?.json().await?.data)
    }

    /// Lists subscribers of the configured hospital awaiting payment.
    pub async fn get_pending_subscribers(&self) -> Result<Vec<Subscriber>> {
        let url = self.endpoint_with(
            "/api/subscriptions/pending",
            [self.inner.hospital_number.as_str()],
        )?;
        self.get_json(url).await
    }

    /// Creates or renews the payment for a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] before any request when the subscriber
    /// ID is zero, the amount is negative or `registered_by` is empty.
    pub async fn create_payment(
        &self,
        subscriber_id: u64,
        amount: f64,
        registered_by: &str,
    ) -> Result<Payment> {
        if subscriber_id == 0 {
            return Err(Error::Validation("subscriber id must not be zero".into()));
        }
        if amount < 0.0 {
            return Err(Error::Validation("amount to be paid must not be negative".into()));
        }
        if registered_by.is_empty() {
            return Err(Error::Validation(
                "user making the payment (registered_by) must not be empty".into(),
            ));
        }

        let payment = Payment {
            subscriber_id,
            amount,
            registered_by: registered_by.to_string(),
            ..Default::default()
        };

        let envelope = RequestEnvelope::new(Method::POST, self.endpoint("/api/payments")?)
            .with_json(&payment)?;
        Ok(self.execute(envelope).await?.json().await?.data)
    }

    /// Lists the payments made for a subscription.
    pub async fn get_subscriber_payments(&self, subscriber_id: u64) -> Result<Vec<Payment>> {
        let url = self.endpoint_with("/api/payments/list", [subscriber_id.to_string()])?;
        self.get_json(url).await
    }

    /// Uploads a visit's reports and metadata as a multipart form.
    ///
    /// # Errors
    ///
    /// Validation failures ([`Error::Validation`], [`Error::MissingReports`],
    /// [`Error::InvalidReport`]) are returned before any request is made.
    pub async fn sync_medical_records(&self, record: &PatientRecord) -> Result<()> {
        record.validate()?;
        let form = encode_patient_record(&self.inner.hospital_number, record)?;

        let envelope = RequestEnvelope::new(Method::POST, self.endpoint("/api/records")?)
            .with_multipart(form);
        self.execute(envelope).await?.ok().await
    }
}
