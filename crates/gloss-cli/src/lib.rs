//! `gloss` binary crate (library surface).
//!
//! The primary entrypoint for end users is the `gloss` binary (CLI + HTTP server).
//! The router lives here so it can be driven in-process by tests and embedders.

pub mod server;

pub use gloss_core as core;

use gloss_core::Error;
use gloss_local::explain::Explainer;
use gloss_local::LocalExtractor;
use std::sync::Arc;

/// Build an [`Explainer`] from the environment.
///
/// A missing provider is not fatal: locate still works and explain reports `NotConfigured`.
/// An explicitly unknown provider name is an error.
pub fn explainer_from_env(provider: Option<&str>) -> gloss_core::Result<Explainer> {
    let generator = match gloss_local::generator_from_env(gloss_local::http_client()?, provider) {
        Ok(g) => Some(g),
        Err(Error::NotConfigured(msg)) => {
            tracing::warn!(%msg, "no explanation generator configured");
            None
        }
        Err(e) => return Err(e),
    };
    Ok(Explainer::new(
        Arc::new(LocalExtractor::from_env()),
        generator,
        gloss_local::locator_config_from_env(),
    ))
}
