//! cmolabel-gen - CMO Label Generator Microservice
//!
//! Event-driven service assigning stable, semantically encoded CMO labels
//! to samples flowing through the laboratory pipeline. Consumes
//! request/sample events from the message bus, computes or re-validates
//! labels, and republishes enriched events; also answers synchronous
//! label-preview queries over request/reply.

pub mod audit;
pub mod pipeline;
pub mod responder;
pub mod store;

pub use pipeline::PipelineContext;
pub use store::{BusSampleStore, SampleStore};
