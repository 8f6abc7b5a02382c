//! CMO label assignment
//!
//! Layered leaves-first: `grammar` (parse/format contract for the two label
//! dialects), `abbreviation` (classification-to-code tables), `counter`
//! (sample-type and nucleic-acid counter resolution), and `engine`
//! (orchestration, change detection, validation reporting).

pub mod abbreviation;
pub mod counter;
pub mod engine;
pub mod grammar;

pub use engine::LabelEngine;
pub use grammar::LabelParts;
