//! Label engine
//!
//! Orchestrates abbreviation and counter resolution into a full label,
//! decides whether a freshly computed label differs materially from a
//! previously persisted one, and produces the validation report that
//! accompanies every generated label.

use crate::label::abbreviation::{
    resolve_nucleic_acid_abbreviation, resolve_sample_type_abbreviation,
    resolve_sample_type_abbreviation_with_context, SENTINEL_TYPE_ABBREVIATION,
};
use crate::label::counter::{resolve_nucleic_acid_counter, resolve_sample_type_counter};
use crate::label::grammar::{self, LabelParts};
use crate::sample::{SampleDescriptor, ValidationStatus};
use crate::{Error, Result};
use tracing::{debug, warn};

/// Stateless label engine, safely callable from any number of workers
#[derive(Debug, Default, Clone)]
pub struct LabelEngine;

impl LabelEngine {
    /// Create a new engine
    pub fn new() -> Self {
        Self
    }

    /// Generate a label for `sample` against its two context lists
    ///
    /// Returns `None` when the nucleic-acid code cannot be resolved; the
    /// caller logs and drops the sample. Classification failures do not
    /// abort generation: they degrade to the sentinel type code and are
    /// reported through [`LabelEngine::generate_validation_status`].
    pub fn generate_label(
        &self,
        sample: &SampleDescriptor,
        existing_samples: &[SampleDescriptor],
        alt_id_samples: &[SampleDescriptor],
    ) -> Option<String> {
        if sample.is_cell_line_sample() {
            let investigator_id = sample
                .investigator_sample_id
                .as_deref()
                .unwrap_or(&sample.primary_id);
            let label =
                grammar::format_cell_line(investigator_id, &sample.normalized_request_id());
            debug!(primary_id = %sample.primary_id, label = %label, "Generated cell-line label");
            return Some(label);
        }

        let type_code = resolve_sample_type_abbreviation_with_context(sample, alt_id_samples);
        let Some(na_code) = resolve_nucleic_acid_abbreviation(
            sample.sample_type.as_deref(),
            sample.recipe.as_deref(),
            sample.na_to_extract.as_deref(),
        ) else {
            warn!(
                primary_id = %sample.primary_id,
                na_to_extract = ?sample.na_to_extract,
                "Cannot resolve nucleic-acid code, label generation failed"
            );
            return None;
        };

        let counter =
            resolve_sample_type_counter(&sample.primary_id, existing_samples, alt_id_samples);
        let na_counter = resolve_nucleic_acid_counter(na_code, existing_samples, alt_id_samples);

        let parts = LabelParts {
            patient_id: sample.cmo_patient_id.clone(),
            type_code,
            counter,
            na_code,
            na_counter: Some(na_counter),
        };
        Some(parts.format())
    }

    /// Decide whether `new_label` materially differs from `existing_label`
    ///
    /// Used to avoid spurious rewrites when unrelated metadata changed.
    /// A comparison where neither side parses as a standard label (and the
    /// new side is not a cell-line transition) is a data-integrity error
    /// and surfaces as [`Error::InvalidLabel`].
    pub fn requires_label_update(&self, new_label: &str, existing_label: &str) -> Result<bool> {
        if new_label == existing_label {
            return Ok(false);
        }

        let new_parts = grammar::parse_standard(new_label);
        let existing_parts = grammar::parse_standard(existing_label);

        // A shape change to the cell-line dialect always counts. The
        // cell-line pattern is loose enough to also match standard labels,
        // so "is cell-line" here means cell-line and nothing else.
        let new_is_cell_line =
            new_parts.is_none() && grammar::parse_cell_line(new_label).is_some();
        let existing_is_cell_line =
            existing_parts.is_none() && grammar::parse_cell_line(existing_label).is_some();
        if new_is_cell_line && !existing_is_cell_line {
            return Ok(true);
        }

        let (new_parts, existing_parts) = match (new_parts, existing_parts) {
            (Some(new_parts), Some(existing_parts)) => (new_parts, existing_parts),
            // Existing label blank or malformed while the new one is valid
            (Some(_), None) => return Ok(true),
            _ => {
                return Err(Error::InvalidLabel(format!(
                    "neither '{}' nor '{}' is comparable",
                    new_label, existing_label
                )))
            }
        };

        Ok(new_parts.patient_id != existing_parts.patient_id
            || new_parts.type_code != existing_parts.type_code
            || new_parts.counter != existing_parts.counter
            || new_parts.na_code != existing_parts.na_code
            || new_parts.na_counter_or_default() != existing_parts.na_counter_or_default())
    }

    /// Increment a label's nucleic-acid counter by one
    ///
    /// Returns `None` when the input does not parse as a standard label.
    /// The output always carries the 2-digit counter suffix, even when the
    /// input was a legacy label that omitted it.
    pub fn increment_nucleic_acid_counter(&self, label: &str) -> Option<String> {
        let mut parts = grammar::parse_standard(label)?;
        parts.na_counter = Some(parts.na_counter_or_default() + 1);
        Some(parts.format())
    }

    /// Re-run abbreviation resolution and report which fields failed
    ///
    /// Produced alongside the label, not instead of it: a sample whose
    /// classification degraded to the sentinel still ships with a label,
    /// flagged invalid here.
    pub fn generate_validation_status(&self, sample: &SampleDescriptor) -> ValidationStatus {
        let mut status = ValidationStatus::passing();

        if sample.is_cell_line_sample() {
            return status;
        }

        let type_code = resolve_sample_type_abbreviation(
            sample.specimen_type.as_deref(),
            sample.sample_origin.as_deref(),
            sample.sample_class.as_deref(),
        );
        if type_code == SENTINEL_TYPE_ABBREVIATION {
            status.add_failure(
                "sample type abbreviation",
                format!(
                    "unresolved from specimenType={:?}, sampleOrigin={:?}, sampleClass={:?}",
                    sample.specimen_type, sample.sample_origin, sample.sample_class
                ),
            );
        }

        if resolve_nucleic_acid_abbreviation(
            sample.sample_type.as_deref(),
            sample.recipe.as_deref(),
            sample.na_to_extract.as_deref(),
        )
        .is_none()
        {
            status.add_failure(
                "nucleic acid abbreviation",
                format!("unresolved from naToExtract={:?}", sample.na_to_extract),
            );
        }

        status
    }
}
