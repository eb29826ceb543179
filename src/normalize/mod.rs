//! Deterministic normalization: identity keys and listing categories.

pub mod pillar;
pub mod slug;

pub use pillar::PillarRules;
pub use slug::{generate_key, is_valid_key};
