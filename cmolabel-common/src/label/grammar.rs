//! Label grammar
//!
//! Single home for the parsing/formatting contract of the two label
//! dialects. Patterns are compiled once and never inlined at call sites so
//! the grammar stays in one tested place.
//!
//! - **Standard**: `C-<patientId>-<typeCode><counter>-<naCode><naCounter>`
//!   with a 3-digit zero-padded sample counter and an optional 2-digit
//!   zero-padded nucleic-acid counter (legacy labels omit it).
//! - **Cell-line**: `<investigatorSampleId>-<normalizedRequestId>` where the
//!   request id has had all `-` and `_` removed.
//!
//! Parsing returns `Option`; a non-match is not an error here. Callers
//! decide whether a non-match is fatal or an expected alternate dialect.

use once_cell::sync::Lazy;
use regex::Regex;

static STANDARD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<patient>C-[0-9a-zA-Z]+)-(?P<type>[A-Z])(?P<counter>\d{3})-(?P<na>[dr])(?P<nacounter>\d{2})?$",
    )
    .expect("standard label pattern is valid")
});

static CELL_LINE_LABEL: Lazy<Regex> = Lazy::new(|| {
    // Investigator ids may themselves contain separators; the normalized
    // request id at the end cannot, so anchor on the final dash.
    Regex::new(r"^(?P<investigator>.+)-(?P<request>[0-9a-zA-Z]+)$")
        .expect("cell-line label pattern is valid")
});

/// Parsed components of a standard label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelParts {
    /// Patient-id prefix including the leading `C-`
    pub patient_id: String,
    /// Single-letter sample-type code
    pub type_code: char,
    /// Sample-type counter (formatted 3-digit zero-padded)
    pub counter: u32,
    /// Nucleic-acid code (`d` or `r`)
    pub na_code: char,
    /// Nucleic-acid counter (formatted 2-digit zero-padded); `None` on
    /// legacy labels that omit the suffix
    pub na_counter: Option<u32>,
}

impl LabelParts {
    /// Format back to label text, the strict inverse of [`parse_standard`]
    ///
    /// A `None` nucleic-acid counter is omitted, never inferred.
    pub fn format(&self) -> String {
        match self.na_counter {
            Some(na_counter) => format!(
                "{}-{}{:03}-{}{:02}",
                self.patient_id, self.type_code, self.counter, self.na_code, na_counter
            ),
            None => format!(
                "{}-{}{:03}-{}",
                self.patient_id, self.type_code, self.counter, self.na_code
            ),
        }
    }

    /// Nucleic-acid counter with the legacy omission treated as 1
    pub fn na_counter_or_default(&self) -> u32 {
        self.na_counter.unwrap_or(1)
    }
}

/// Parsed components of a cell-line label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellLineParts {
    /// Investigator-supplied sample id
    pub investigator_sample_id: String,
    /// Owning request id with separators removed
    pub normalized_request_id: String,
}

/// Parse a standard patient-derived label; `None` on non-match
pub fn parse_standard(label: &str) -> Option<LabelParts> {
    let captures = STANDARD_LABEL.captures(label)?;
    Some(LabelParts {
        patient_id: captures["patient"].to_string(),
        type_code: captures["type"].chars().next()?,
        counter: captures["counter"].parse().ok()?,
        na_code: captures["na"].chars().next()?,
        na_counter: captures
            .name("nacounter")
            .map(|m| m.as_str().parse())
            .transpose()
            .ok()?,
    })
}

/// Parse a cell-line label; `None` on non-match
pub fn parse_cell_line(label: &str) -> Option<CellLineParts> {
    let captures = CELL_LINE_LABEL.captures(label)?;
    Some(CellLineParts {
        investigator_sample_id: captures["investigator"].to_string(),
        normalized_request_id: captures["request"].to_string(),
    })
}

/// Format a cell-line label from its two components
pub fn format_cell_line(investigator_sample_id: &str, normalized_request_id: &str) -> String {
    format!("{}-{}", investigator_sample_id, normalized_request_id)
}
