//! Sample data model
//!
//! Normalizes the two upstream payload shapes (LIMS and downstream pipeline
//! schemas name the same classification fields differently) into a single
//! `SampleDescriptor`. Schema detection lives entirely in
//! [`SampleDescriptor::from_json`]; nothing downstream of that boundary
//! knows two shapes exist.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Sentinel value a redacted patient identifier is replaced with upstream.
/// A cell-line sample with a redacted normalized patient id is labeled as a
/// standard patient sample, not a cell-line sample.
pub const MRN_REDACTED: &str = "MRN_REDACTED";

/// Specimen type marking cell-line samples
pub const SPECIMEN_TYPE_CELL_LINE: &str = "CellLine";

/// Normalized view of one sample's classification fields
///
/// Immutable after construction except for `cmo_label`, which the label
/// engine fills in. Unknown fields are preserved through `extra` so the
/// republished payload carries everything the producer sent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleDescriptor {
    /// Primary sample identifier
    pub primary_id: String,
    /// Alternate/external identifier grouping resubmissions of one specimen
    pub alt_id: Option<String>,
    /// CMO patient identifier (the sample-type counter space)
    pub cmo_patient_id: String,
    /// Coarse specimen category (Xenograft, Organoid, cfDNA, CellLine, ...)
    pub specimen_type: Option<String>,
    /// Sample origin (Urine, Plasma, Whole Blood, ...)
    pub sample_origin: Option<String>,
    /// Tumor/normal/adjacent classification
    pub sample_class: Option<String>,
    /// Detailed sample type (Pooled Library, DNA, RNA, ...)
    pub sample_type: Option<String>,
    /// Nucleic acid to extract
    pub na_to_extract: Option<String>,
    /// Normalized patient id used for cell-line detection
    pub normalized_patient_id: Option<String>,
    /// Recipe / gene panel
    pub recipe: Option<String>,
    /// Investigator-supplied sample id
    pub investigator_sample_id: Option<String>,
    /// Owning request id
    pub request_id: Option<String>,
    /// Currently assigned CMO label, if any
    pub cmo_sample_name: Option<String>,
    /// Tumor-or-normal flag
    pub tumor_or_normal: Option<String>,
    /// Whether this sample participates in CMO labeling
    pub is_cmo_sample: bool,
    /// Pass-through fields this service does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// LIMS-shaped sample record (identified by the `igoId` key)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct LimsSampleRecord {
    igo_id: String,
    alt_id: Option<String>,
    cmo_patient_id: String,
    specimen_type: Option<String>,
    sample_origin: Option<String>,
    cmo_sample_class: Option<String>,
    sample_type: Option<String>,
    na_to_extract: Option<String>,
    normalized_patient_id: Option<String>,
    recipe: Option<String>,
    investigator_sample_id: Option<String>,
    request_id: Option<String>,
    cmo_sample_name: Option<String>,
    tumor_or_normal: Option<String>,
    is_cmo_sample: bool,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<LimsSampleRecord> for SampleDescriptor {
    fn from(record: LimsSampleRecord) -> Self {
        SampleDescriptor {
            primary_id: record.igo_id,
            alt_id: record.alt_id,
            cmo_patient_id: record.cmo_patient_id,
            specimen_type: record.specimen_type,
            sample_origin: record.sample_origin,
            sample_class: record.cmo_sample_class,
            sample_type: record.sample_type,
            na_to_extract: record.na_to_extract,
            normalized_patient_id: record.normalized_patient_id,
            recipe: record.recipe,
            investigator_sample_id: record.investigator_sample_id,
            request_id: record.request_id,
            cmo_sample_name: record.cmo_sample_name,
            tumor_or_normal: record.tumor_or_normal,
            is_cmo_sample: record.is_cmo_sample,
            extra: record.extra,
        }
    }
}

impl SampleDescriptor {
    /// Build a descriptor from either upstream shape
    ///
    /// The LIMS shape is identified by the presence of `igoId`; anything
    /// else is expected to already carry the normalized field names.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Parse("sample record is not a JSON object".to_string()))?;

        let descriptor: SampleDescriptor = if obj.contains_key("igoId") {
            let record: LimsSampleRecord = serde_json::from_value(value.clone())?;
            record.into()
        } else {
            serde_json::from_value(value.clone())?
        };

        if descriptor.primary_id.is_empty() {
            return Err(Error::Parse(
                "sample record has no primary identifier".to_string(),
            ));
        }
        Ok(descriptor)
    }

    /// Whether this sample is labeled with the cell-line dialect
    ///
    /// Requires the CellLine specimen type and a normalized patient id that
    /// is present and not the redaction sentinel.
    pub fn is_cell_line_sample(&self) -> bool {
        let is_cell_line = self
            .specimen_type
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case(SPECIMEN_TYPE_CELL_LINE))
            .unwrap_or(false);
        let has_patient_id = self
            .normalized_patient_id
            .as_deref()
            .map(|p| !p.is_empty() && p != MRN_REDACTED)
            .unwrap_or(false);
        is_cell_line && has_patient_id
    }

    /// Owning request id with `-` and `_` removed, for cell-line labels
    pub fn normalized_request_id(&self) -> String {
        self.request_id
            .as_deref()
            .unwrap_or_default()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect()
    }
}

/// Envelope received over the event bus for request-scoped processing
///
/// The pipeline replaces `samples` with processed results before
/// republishing; every other field passes through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingRequest {
    /// Request identifier
    pub request_id: String,
    /// Raw sample records (shape-converted one at a time during processing)
    pub samples: Vec<Value>,
    /// Pass-through envelope fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProcessingRequest {
    /// Parse an envelope from raw message text
    pub fn from_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Pass/fail report produced alongside every generated label
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ValidationStatus {
    /// True iff no field failed resolution
    pub valid: bool,
    /// Failed-field-name to reason
    pub failures: BTreeMap<String, String>,
}

impl ValidationStatus {
    /// A passing report with no failures
    pub fn passing() -> Self {
        Self {
            valid: true,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failed field, marking the report invalid
    pub fn add_failure(&mut self, field: &str, reason: impl Into<String>) {
        self.valid = false;
        self.failures.insert(field.to_string(), reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lims_shape_is_detected_and_normalized() {
        let value = json!({
            "igoId": "22022_BZ_1",
            "altId": "ALT-100",
            "cmoPatientId": "C-MP789JR",
            "specimenType": "Xenograft",
            "cmoSampleClass": "Primary",
            "naToExtract": "DNA",
            "requestId": "22022_BZ",
            "isCmoSample": true,
            "barcodeId": "IDT01"
        });

        let sample = SampleDescriptor::from_json(&value).unwrap();
        assert_eq!(sample.primary_id, "22022_BZ_1");
        assert_eq!(sample.alt_id.as_deref(), Some("ALT-100"));
        assert_eq!(sample.sample_class.as_deref(), Some("Primary"));
        assert!(sample.is_cmo_sample);
        // Unknown fields survive normalization
        assert_eq!(sample.extra.get("barcodeId"), Some(&json!("IDT01")));
    }

    #[test]
    fn normalized_shape_parses_directly() {
        let value = json!({
            "primaryId": "SMP-1",
            "cmoPatientId": "C-1235",
            "sampleClass": "Normal",
            "cmoSampleName": "C-1235-N001-d01"
        });

        let sample = SampleDescriptor::from_json(&value).unwrap();
        assert_eq!(sample.primary_id, "SMP-1");
        assert_eq!(sample.cmo_sample_name.as_deref(), Some("C-1235-N001-d01"));
    }

    #[test]
    fn missing_primary_id_is_rejected() {
        let value = json!({ "cmoPatientId": "C-1235" });
        assert!(SampleDescriptor::from_json(&value).is_err());
    }

    #[test]
    fn cell_line_detection_honors_redaction_sentinel() {
        let mut sample = SampleDescriptor {
            primary_id: "SMP-2".to_string(),
            specimen_type: Some("CellLine".to_string()),
            normalized_patient_id: Some("P-0001".to_string()),
            ..Default::default()
        };
        assert!(sample.is_cell_line_sample());

        sample.normalized_patient_id = Some(MRN_REDACTED.to_string());
        assert!(!sample.is_cell_line_sample());

        sample.normalized_patient_id = None;
        assert!(!sample.is_cell_line_sample());
    }

    #[test]
    fn normalized_request_id_strips_separators() {
        let sample = SampleDescriptor {
            primary_id: "SMP-3".to_string(),
            request_id: Some("22022_BZ-A".to_string()),
            ..Default::default()
        };
        assert_eq!(sample.normalized_request_id(), "22022BZA");
    }

    #[test]
    fn envelope_preserves_unknown_fields() {
        let raw = r#"{"requestId":"22022_BZ","samples":[],"projectManagerName":"X"}"#;
        let request = ProcessingRequest::from_str(raw).unwrap();
        assert_eq!(request.request_id, "22022_BZ");
        assert_eq!(
            request.extra.get("projectManagerName"),
            Some(&json!("X"))
        );

        let round = serde_json::to_string(&request).unwrap();
        assert!(round.contains("projectManagerName"));
    }
}
