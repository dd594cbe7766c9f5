//! `multipart/form-data` assembly for patient record uploads.
//!
//! A [`MultipartForm`] is the validated, cloneable list of parts. A
//! `reqwest::multipart::Form` streams its body and cannot be resent, so the
//! executor materializes a fresh one from the same parts on every attempt.
//! Multipart bodies are never gzip-compressed.

use crate::pdf::is_valid_pdf;
use crate::types::PatientRecord;
use crate::{Error, Result};
use chrono::SecondsFormat;
use reqwest::multipart::{Form, Part};
use std::fmt;

const FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// The two report slots a patient record upload can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// The clinician's medical report.
    Medical,
    /// The laboratory results report.
    Lab,
}

impl ReportKind {
    /// The form field the report is uploaded under.
    pub fn field_name(self) -> &'static str {
        match self {
            ReportKind::Medical => "medical_report",
            ReportKind::Lab => "lab_report",
        }
    }

    /// The file name sent with the report.
    pub fn file_name(self) -> &'static str {
        match self {
            ReportKind::Medical => "medical_report.pdf",
            ReportKind::Lab => "lab_report.pdf",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Medical => f.write_str("medical report"),
            ReportKind::Lab => f.write_str("laboratory report"),
        }
    }
}

/// A named binary payload destined for a file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// The form field name.
    pub field_name: String,
    /// The file name reported to the server.
    pub file_name: String,
    /// The file content.
    pub content: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment with explicit names.
    pub fn new(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    /// Creates the attachment for a report slot, using its fixed names.
    pub fn report(kind: ReportKind, content: impl Into<Vec<u8>>) -> Self {
        Self::new(kind.field_name(), kind.file_name(), content)
    }

    /// Returns `true` if the content passes the PDF sniff.
    pub fn is_valid(&self) -> bool {
        is_valid_pdf(&self.content)
    }

    fn to_part(&self) -> Result<Part> {
        Part::bytes(self.content.clone())
            .file_name(self.file_name.clone())
            .mime_str(FILE_CONTENT_TYPE)
            .map_err(|e| Error::ConfigurationError(format!("Invalid part content type: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Text { name: String, value: String },
    File(Attachment),
}

impl Field {
    fn name(&self) -> &str {
        match self {
            Field::Text { name, .. } => name.as_str(),
            Field::File(attachment) => attachment.field_name.as_str(),
        }
    }
}

/// An ordered set of form parts, ready to be sent any number of times.
///
/// # Examples
///
/// ```
/// use ecloud::multipart::{Attachment, MultipartForm};
///
/// let form = MultipartForm::new()
///     .attachment(Attachment::new("scan", "scan.pdf", b"%PDF-1.7".to_vec()))
///     .text("title", "Follow-up");
///
/// assert_eq!(form.file_count(), 1);
/// assert_eq!(form.text_value("title"), Some("Follow-up"));
/// assert_eq!(form.field_names().collect::<Vec<_>>(), ["scan", "title"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    fields: Vec<Field>,
}

impl MultipartForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file part.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.fields.push(Field::File(attachment));
        self
    }

    /// Appends a scalar form field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Field names in the order they are sent.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(Field::name)
    }

    /// The number of file parts.
    pub fn file_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| matches!(f, Field::File(_)))
            .count()
    }

    /// The value of the first scalar field called `name`.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            Field::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// Builds a sendable form under a freshly generated boundary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if a file part cannot be built.
    pub fn to_form(&self) -> Result<Form> {
        self.fields.iter().try_fold(Form::new(), |form, field| {
            Ok(match field {
                Field::Text { name, value } => form.text(name.clone(), value.clone()),
                Field::File(attachment) => {
                    form.part(attachment.field_name.clone(), attachment.to_part()?)
                }
            })
        })
    }
}

/// Assembles the upload form for a patient record.
///
/// File parts come first, medical report before lab report, each checked with
/// the PDF sniffer against its own bytes. The scalar fields follow.
///
/// # Errors
///
/// Returns [`Error::MissingReports`] when neither report is present and
/// [`Error::InvalidReport`] naming the first report that is not a valid PDF.
pub fn encode_patient_record(
    hospital_number: &str,
    record: &PatientRecord,
) -> Result<MultipartForm> {
    if record.medical_report.is_none() && record.lab_report.is_none() {
        return Err(Error::MissingReports);
    }
    let visit_timestamp = record
        .visit_timestamp
        .ok_or_else(|| Error::Validation("patient record missing valid visit timestamp".into()))?;

    let reports = [
        (ReportKind::Medical, &record.medical_report),
        (ReportKind::Lab, &record.lab_report),
    ];
    let mut form = MultipartForm::new();
    for (kind, content) in reports {
        let Some(content) = content else { continue };
        let attachment = Attachment::report(kind, content.as_slice());
        if !attachment.is_valid() {
            return Err(Error::InvalidReport(kind));
        }
        form = form.attachment(attachment);
    }

    Ok(form
        .text("hospital_number", hospital_number)
        .text("visit_id", record.visit_id.to_string())
        .text("subscriber_id", record.subscriber_id.to_string())
        .text(
            "visit_timestamp",
            visit_timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .text("title", record.title.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, TimeZone};

    const PDF: &[u8] = b"%PDF-1.7\ntrailer << /Size 4 /Root 1 0 R >>\nstartxref\n178\n%%EOF";

    fn visit_time() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
            .unwrap()
    }

    fn record(medical: Option<&[u8]>, lab: Option<&[u8]>) -> PatientRecord {
        PatientRecord {
            visit_id: 42,
            subscriber_id: 7,
            visit_timestamp: Some(visit_time()),
            title: "Annual \"checkup\"".to_string(),
            medical_report: medical.map(<[u8]>::to_vec),
            lab_report: lab.map(<[u8]>::to_vec),
            ..Default::default()
        }
    }

    fn encode(record: &PatientRecord) -> Result<MultipartForm> {
        encode_patient_record("HOS-123", record)
    }

    #[test]
    fn test_both_reports_absent_is_rejected() {
        let result = encode(&record(None, None));
        assert!(matches!(result, Err(Error::MissingReports)));
    }

    #[test]
    fn test_single_report_produces_one_file_part_and_five_fields() {
        let form = encode(&record(None, Some(PDF))).unwrap();

        assert_eq!(form.file_count(), 1);
        assert_eq!(
            form.field_names().collect::<Vec<_>>(),
            [
                "lab_report",
                "hospital_number",
                "visit_id",
                "subscriber_id",
                "visit_timestamp",
                "title"
            ]
        );
        assert_eq!(form.text_value("hospital_number"), Some("HOS-123"));
        assert_eq!(form.text_value("visit_id"), Some("42"));
        assert_eq!(form.text_value("subscriber_id"), Some("7"));
        assert_eq!(
            form.text_value("visit_timestamp"),
            Some("2025-03-14T09:30:00+03:00")
        );
        assert_eq!(form.text_value("title"), Some("Annual \"checkup\""));
    }

    #[test]
    fn test_reports_are_sent_as_named_attachments() {
        let form = encode(&record(Some(PDF), Some(PDF))).unwrap();

        let files: Vec<_> = form
            .fields
            .iter()
            .filter_map(|f| match f {
                Field::File(attachment) => Some(attachment),
                Field::Text { .. } => None,
            })
            .collect();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], &Attachment::report(ReportKind::Medical, PDF));
        assert_eq!(files[1].file_name, "lab_report.pdf");

        let names: Vec<_> = form.field_names().collect();
        assert_eq!(&names[..3], ["medical_report", "lab_report", "hospital_number"]);
    }

    #[test]
    fn test_each_report_is_validated_against_its_own_bytes() {
        // A valid lab report must not make an invalid medical report pass.
        let result = encode(&record(Some(b"not a pdf"), Some(PDF)));
        assert!(matches!(
            result,
            Err(Error::InvalidReport(ReportKind::Medical))
        ));

        let result = encode(&record(Some(PDF), Some(b"not a pdf")));
        assert!(matches!(result, Err(Error::InvalidReport(ReportKind::Lab))));

        assert!(encode(&record(Some(PDF), None)).is_ok());
    }

    #[test]
    fn test_utc_timestamps_use_zulu_suffix() {
        let mut rec = record(Some(PDF), None);
        rec.visit_timestamp = Some(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 12, 1, 0, 0, 5)
                .unwrap(),
        );
        let form = encode(&rec).unwrap();
        assert_eq!(
            form.text_value("visit_timestamp"),
            Some("2024-12-01T00:00:05Z")
        );
    }

    #[test]
    fn test_attachment_validity() {
        assert!(Attachment::report(ReportKind::Medical, PDF).is_valid());
        assert!(!Attachment::new("scan", "scan.pdf", b"PNG".to_vec()).is_valid());
    }

    #[test]
    fn test_each_materialized_form_gets_its_own_boundary() {
        let form = encode(&record(Some(PDF), None)).unwrap();
        let first = form.to_form().unwrap();
        let second = form.to_form().unwrap();

        assert!(!first.boundary().is_empty());
        assert_ne!(first.boundary(), second.boundary());
    }
}
