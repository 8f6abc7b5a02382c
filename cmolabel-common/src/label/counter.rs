//! Counter resolution
//!
//! Computes the next sample-type counter (scoped to the patient) and the
//! next nucleic-acid counter (scoped to the alternate-id group) for a
//! candidate sample, given the labels already assigned in each scope.
//!
//! Both functions are pure: all state arrives through the two context
//! lists, so recomputation with identical inputs is idempotent. That is
//! what makes at-least-once redelivery safe.

use crate::label::grammar;
use crate::sample::SampleDescriptor;
use std::collections::BTreeSet;

fn parsed_counter(sample: &SampleDescriptor) -> Option<u32> {
    // Blank and cell-line-shaped labels carry no counter
    sample
        .cmo_sample_name
        .as_deref()
        .filter(|label| !label.trim().is_empty())
        .and_then(grammar::parse_standard)
        .map(|parts| parts.counter)
}

/// Resolve the next sample-type counter for `primary_id`
///
/// Resolution order:
/// 1. no context at all -> 1
/// 2. alternate-id siblings exist -> the minimum counter among their
///    parseable labels (the oldest assignment wins, so corrections
///    converge), or 1 if none parse
/// 3. an existing patient sample with the same primary id -> reuse its
///    counter verbatim (metadata corrections must not bump the counter)
/// 4. otherwise max over the patient's parsed counters, plus one
pub fn resolve_sample_type_counter(
    primary_id: &str,
    existing_samples: &[SampleDescriptor],
    alt_id_samples: &[SampleDescriptor],
) -> u32 {
    if existing_samples.is_empty() && alt_id_samples.is_empty() {
        return 1;
    }

    if !alt_id_samples.is_empty() {
        let counters: Vec<u32> = alt_id_samples.iter().filter_map(parsed_counter).collect();
        return counters.iter().min().copied().unwrap_or(1);
    }

    if let Some(counter) = existing_samples
        .iter()
        .find(|s| s.primary_id == primary_id)
        .and_then(parsed_counter)
    {
        return counter;
    }

    existing_samples
        .iter()
        .filter_map(parsed_counter)
        .max()
        .unwrap_or(0)
        + 1
}

/// Resolve the next nucleic-acid counter for a sample with code `na_code`
///
/// The nucleic-acid counter space is the alternate-id group, never the
/// whole patient: an empty group always yields 1. Within the group,
/// counters of labels sharing `na_code` are collapsed into a set (a legacy
/// label with no counter suffix counts as 1). A gapped set yields the
/// count of distinct counters observed as the next slot to fill; a dense
/// set advances through [`next_consecutive`].
pub fn resolve_nucleic_acid_counter(
    na_code: char,
    existing_samples: &[SampleDescriptor],
    alt_id_samples: &[SampleDescriptor],
) -> u32 {
    if existing_samples.is_empty() && alt_id_samples.is_empty() {
        return 1;
    }
    if alt_id_samples.is_empty() {
        return 1;
    }

    let counters: BTreeSet<u32> = alt_id_samples
        .iter()
        .filter_map(|sample| {
            sample
                .cmo_sample_name
                .as_deref()
                .filter(|label| !label.trim().is_empty())
                .and_then(grammar::parse_standard)
        })
        .filter(|parts| parts.na_code == na_code)
        .map(|parts| parts.na_counter_or_default())
        .collect();

    let Some(max) = counters.iter().next_back().copied() else {
        return 1;
    };
    if counters.len() as u32 != max {
        return counters.len() as u32;
    }
    next_consecutive(&counters)
}

/// Next counter after the first gap in an ascending set, or max + 1 when
/// the set has no gaps
pub fn next_consecutive(counters: &BTreeSet<u32>) -> u32 {
    let mut previous: Option<u32> = None;
    for &counter in counters {
        if let Some(prev) = previous {
            if counter - prev > 1 {
                return prev + 1;
            }
        }
        previous = Some(counter);
    }
    previous.map(|max| max + 1).unwrap_or(1)
}
