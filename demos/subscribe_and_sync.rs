//! Subscribes a patient, pays for the subscription and uploads a visit report.
//!
//! Configuration comes from the environment:
//! - `ECLOUD_URL`, `ECLINIC_URL`
//! - `ECLINIC_ID`, `ECLOUD_PASSWORD`
//! - `HOSPITAL_NUMBER`, `HOSPITAL_NAME`
//! - `REPORT_PDF` (path to the medical report to upload)
//!
//! Run with: `cargo run --example subscribe_and_sync`

use chrono::Utc;
use ecloud::retry::ExponentialBackoff;
use ecloud::{Client, Error, PatientRecord, SubscribeRequest};
use std::time::Duration;

fn env(name: &str) -> Result<String, Error> {
    std::env::var(name).map_err(|_| Error::ConfigurationError(format!("{} is not set", name)))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("ecloud=debug,subscribe_and_sync=info")
        .init();

    let client = Client::builder()
        .api_base_url(env("ECLOUD_URL")?)?
        .eclinic_base_url(env("ECLINIC_URL")?)?
        .eclinic_id(env("ECLINIC_ID")?)
        .password(env("ECLOUD_PASSWORD")?)
        .hospital_number(env("HOSPITAL_NUMBER")?)
        .hospital_name(env("HOSPITAL_NAME")?)
        .retry_policy(Box::new(ExponentialBackoff {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            max_retries: 4,
            jitter: true,
        }))
        .build()?;

    let login = client.login().await?;
    println!("Logged in as user {}", login.user.id);

    let bill = client.get_bill().await?;
    println!(
        "Subscription costs {} for {} days",
        bill.amount,
        bill.duration.as_secs() / 86_400
    );

    let subscriber = client
        .subscribe(&SubscribeRequest {
            patient_id: 12345,
            patient_name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            registered_by: "clerk01".to_string(),
        })
        .await?;
    println!("Subscribed patient as subscriber {}", subscriber.id);

    let payment = client
        .create_payment(subscriber.id, bill.amount, "clerk01")
        .await?;
    println!("Payment valid to {:?}", payment.valid_to);

    let report = std::fs::read(env("REPORT_PDF")?)
        .map_err(|e| Error::ConfigurationError(format!("cannot read report: {}", e)))?;

    match client
        .sync_medical_records(&PatientRecord {
            visit_id: 1,
            subscriber_id: subscriber.id,
            visit_timestamp: Some(Utc::now().fixed_offset()),
            title: "Initial consultation".to_string(),
            medical_report: Some(report),
            ..Default::default()
        })
        .await
    {
        Ok(()) => println!("Records uploaded"),
        Err(Error::InvalidReport(kind)) => println!("The {} is not a PDF", kind),
        Err(e) => return Err(e),
    }

    for payment in client.get_subscriber_payments(subscriber.id).await? {
        println!("Payment {}: {} by {}", payment.id, payment.amount, payment.registered_by);
    }

    Ok(())
}
