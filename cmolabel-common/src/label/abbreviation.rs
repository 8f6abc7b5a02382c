//! Abbreviation resolution
//!
//! Pure lookup tables mapping specimen type, sample origin, and sample
//! class to single-character type codes, and nucleic-acid/library fields to
//! a nucleic-acid code.
//!
//! The two resolvers fail differently on purpose:
//! - sample-type resolution never fails hard; unrecognized input degrades
//!   to the sentinel `F` so a label can still be produced and flagged
//!   invalid in its validation report;
//! - nucleic-acid resolution returns `None` for a recognized-but-unhandled
//!   extraction target, which aborts label generation for that sample.

use crate::label::grammar;
use crate::sample::SampleDescriptor;

/// Sentinel type code signaling unresolved classification
pub const SENTINEL_TYPE_ABBREVIATION: char = 'F';

/// Nucleic-acid code for DNA-derived material
pub const NA_CODE_DNA: char = 'd';

/// Nucleic-acid code for RNA-derived material
pub const NA_CODE_RNA: char = 'r';

/// Detailed sample types that resolve to the DNA code without further
/// inspection (beyond the explicit DNA/RNA/library cases)
const DEFAULT_DNA_SAMPLE_TYPES: &[&str] = &[
    "Blocks/Slides",
    "Blood",
    "Buffy Coat",
    "Cells",
    "Fingernails",
    "Plasma",
    "Saliva",
    "Tissue",
    "Whole Blood",
    "other",
];

/// Extraction targets that are recognized but have no nucleic-acid code;
/// these abort label generation rather than degrading to a default
const UNHANDLED_NA_TO_EXTRACT: &[&str] = &["Protein", "Library", "Neither"];

fn origin_abbreviation(sample_origin: &str) -> Option<char> {
    match sample_origin {
        "Urine" => Some('U'),
        "Cerebrospinal Fluid" => Some('S'),
        "Plasma" => Some('L'),
        "Whole Blood" => Some('L'),
        _ => None,
    }
}

fn sample_class_abbreviation(sample_class: &str) -> Option<char> {
    match sample_class {
        "Normal" => Some('N'),
        "Adjacent Normal" => Some('A'),
        "Adjacent Tissue" => Some('T'),
        // Tumor-like classes all collapse to T
        "Primary" | "Metastasis" | "Recurrence" | "Local Recurrence" | "Tumor"
        | "Unknown Tumor" => Some('T'),
        _ => None,
    }
}

/// Resolve the single-letter sample-type code
///
/// Resolution order: specimen-type table, cfDNA/Exosome origin tables,
/// sample-class fallback. Unrecognized input yields the sentinel `F`,
/// never an error.
pub fn resolve_sample_type_abbreviation(
    specimen_type: Option<&str>,
    sample_origin: Option<&str>,
    sample_class: Option<&str>,
) -> char {
    match specimen_type {
        Some("PDX") | Some("Xenograft") | Some("XenograftDerivedCellLine") => return 'X',
        Some("Organoid") => return 'G',
        Some("cfDNA") => {
            if let Some(code) = sample_origin.and_then(origin_abbreviation) {
                return code;
            }
        }
        Some("Exosome") => {
            return sample_origin.and_then(origin_abbreviation).unwrap_or('T');
        }
        _ => {}
    }

    sample_class
        .and_then(sample_class_abbreviation)
        .unwrap_or(SENTINEL_TYPE_ABBREVIATION)
}

/// Resolve the sample-type code, preferring codes already in circulation
///
/// Corrections must converge on whatever code the alternate-id group was
/// already assigned: a sibling whose primary id matches the sample wins,
/// otherwise the sibling with the lowest sample counter (the oldest
/// assignment). Only when no sibling carries a parseable standard label do
/// we resolve from the classification fields.
pub fn resolve_sample_type_abbreviation_with_context(
    sample: &SampleDescriptor,
    alt_id_samples: &[SampleDescriptor],
) -> char {
    let mut oldest: Option<grammar::LabelParts> = None;
    for sibling in alt_id_samples {
        let Some(parts) = sibling
            .cmo_sample_name
            .as_deref()
            .and_then(grammar::parse_standard)
        else {
            continue;
        };
        if sibling.primary_id == sample.primary_id {
            return parts.type_code;
        }
        match &oldest {
            Some(current) if current.counter <= parts.counter => {}
            _ => oldest = Some(parts),
        }
    }
    if let Some(parts) = oldest {
        return parts.type_code;
    }

    resolve_sample_type_abbreviation(
        sample.specimen_type.as_deref(),
        sample.sample_origin.as_deref(),
        sample.sample_class.as_deref(),
    )
}

/// Resolve the nucleic-acid code from the detailed sample type, falling
/// back to the extraction target
///
/// Returns `None` only for a recognized-but-unhandled extraction target;
/// the caller treats that as a hard failure for the sample.
pub fn resolve_nucleic_acid_abbreviation(
    sample_type: Option<&str>,
    recipe: Option<&str>,
    na_to_extract: Option<&str>,
) -> Option<char> {
    match sample_type {
        Some("Pooled Library") => {
            let rna_recipe = recipe
                .map(|r| r.eq_ignore_ascii_case("RNASeq") || r.eq_ignore_ascii_case("User_RNA"))
                .unwrap_or(false);
            return Some(if rna_recipe { NA_CODE_RNA } else { NA_CODE_DNA });
        }
        Some("DNA") | Some("cfDNA") | Some("DNA Library") => return Some(NA_CODE_DNA),
        Some("RNA") => return Some(NA_CODE_RNA),
        Some(other) if DEFAULT_DNA_SAMPLE_TYPES.contains(&other) => return Some(NA_CODE_DNA),
        _ => {}
    }

    match na_to_extract {
        Some("DNA") | Some("DNA and RNA") | Some("cfDNA") => Some(NA_CODE_DNA),
        Some("RNA") => Some(NA_CODE_RNA),
        Some(other) if UNHANDLED_NA_TO_EXTRACT.contains(&other) => None,
        _ => Some(NA_CODE_DNA),
    }
}
