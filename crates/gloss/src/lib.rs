//! Public facade crate for `gloss`.
//!
//! This crate contains no IO or provider-specific logic.
//! It re-exports the backend-agnostic types/traits and the highlight locator from `gloss-core`.

pub use gloss_core::*;
