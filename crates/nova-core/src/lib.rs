//! NovaForge Core - Foundational types for the NovaForge pipeline
//!
//! This crate provides the types every other NovaForge crate depends on:
//! - `JobId` - Collision-resistant job identifiers
//! - `ContentHash` - SHA-256 based content hashing for stored results
//! - `Dimensions` - Target bounding box of a generated asset
//! - Error types and Result alias

mod error;
mod hash;
mod id;
mod types;

pub use error::{NovaError, Result};
pub use hash::ContentHash;
pub use id::JobId;
pub use types::Dimensions;
