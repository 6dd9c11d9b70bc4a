//! Core data types, wire decoding, and datapoint materialization for Tempest
//!
//! This crate holds the pure parts of the extractor: the canonical
//! observation model, the positional wire schemas, the metric projection,
//! and the collaborator traits the reconcilers are written against.

pub mod materialize;
pub mod pipeline;
pub mod shutdown;
pub mod station;
pub mod types;
pub mod wire;

pub use materialize::*;
pub use pipeline::*;
pub use shutdown::*;
pub use station::*;
pub use types::*;
pub use wire::*;
