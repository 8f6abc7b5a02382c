//! # CMO Label Common Library
//!
//! Shared code for the CMO label-generator microservice including:
//! - Sample data model (dual-schema normalization)
//! - Label grammar, abbreviation, counter, and engine modules
//! - In-process message bus (pub/sub + request/reply)
//! - Configuration loading
//! - Error types

pub mod config;
pub mod error;
pub mod label;
pub mod messaging;
pub mod sample;

pub use error::{Error, Result};
pub use sample::{ProcessingRequest, SampleDescriptor, ValidationStatus};
