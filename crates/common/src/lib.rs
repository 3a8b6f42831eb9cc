//! Shared types for the flurry particle engine.
//!
//! # Invariants
//! - Types here are plain values: immutable once built, safe to copy and share.

mod types;

pub use types::{BoundingBox, Color};

pub fn crate_info() -> &'static str {
    "flurry-common v0.1.0"
}
