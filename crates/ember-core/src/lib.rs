//! Shared utilities for the Ember renderer.
//!
//! This crate provides the collaborators the GPU core leans on:
//! - Allocation accounting per memory category
//! - An owned, category-tagged growable sequence
//! - Validated conversions between scalar arrays and vector arrays

pub mod convert;
pub mod error;
pub mod memory;

pub use convert::{scalars_to_vectors, vectors_to_scalars, VectorLanes};
pub use error::{Error, Result};
pub use memory::{MemoryTag, MemoryTracker, TagStats, TaggedVec};
