//! Extract -> locate -> generate.

use crate::prompt::build_prompt;
use gloss_core::{
    locate, Anchor, ContextWindow, Error, ExplanationGenerator, ExtractRequest, ExtractSource,
    LocateOutcome, LocatorConfig, Mode, ReadingLevel, Result, TextExtractor,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub const NO_PROVIDER_HINT: &str =
    "no LLM provider configured (set GLOSS_OPENAI_COMPAT_BASE_URL or GLOSS_OLLAMA_ENABLE=1)";

#[derive(Debug, Clone)]
pub struct ExplainInput {
    pub document: ExtractRequest,
    pub highlight: String,
    pub mode: Mode,
    pub level: ReadingLevel,
}

/// Result of extract + locate (no model call).
#[derive(Debug, Clone, Serialize)]
pub struct Located {
    pub window: ContextWindow,
    pub engine: String,
    pub extract_source: ExtractSource,
    pub document_chars: usize,
    pub document_truncated: bool,
    pub warnings: Vec<String>,
    pub timings_ms: BTreeMap<String, u128>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub output: String,
    pub found: bool,
    pub outcome: LocateOutcome,
    pub anchor: Option<Anchor>,
    pub mode: Mode,
    pub level: ReadingLevel,
    pub window_start_char: usize,
    pub window_end_char: usize,
    pub engine: String,
    pub extract_source: ExtractSource,
    pub provider: String,
    pub model: String,
    pub warnings: Vec<String>,
    pub timings_ms: BTreeMap<String, u128>,
}

#[derive(Clone)]
pub struct Explainer {
    extractor: Arc<dyn TextExtractor>,
    generator: Option<Arc<dyn ExplanationGenerator>>,
    locator: LocatorConfig,
}

impl Explainer {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        generator: Option<Arc<dyn ExplanationGenerator>>,
        locator: LocatorConfig,
    ) -> Self {
        Self {
            extractor,
            generator,
            locator: locator.sanitized(),
        }
    }

    pub fn locator(&self) -> &LocatorConfig {
        &self.locator
    }

    pub fn generator_name(&self) -> Option<&'static str> {
        self.generator.as_ref().map(|g| g.name())
    }

    pub async fn locate(&self, document: &ExtractRequest, highlight: &str) -> Result<Located> {
        let mut timings_ms = BTreeMap::new();

        let t0 = Instant::now();
        let extracted = self.extractor.extract(document).await?;
        timings_ms.insert("extract".to_string(), t0.elapsed().as_millis());

        let t1 = Instant::now();
        let window = locate(&extracted.text, highlight, &self.locator);
        timings_ms.insert("locate".to_string(), t1.elapsed().as_millis());

        tracing::debug!(
            engine = %extracted.engine,
            outcome = window.outcome.as_str(),
            window_chars = window.end_char - window.start_char,
            "located highlight"
        );

        Ok(Located {
            window,
            document_chars: extracted.text.chars().count(),
            document_truncated: extracted.truncated,
            engine: extracted.engine,
            extract_source: extracted.source,
            warnings: extracted.warnings,
            timings_ms,
        })
    }

    pub async fn explain(&self, input: &ExplainInput) -> Result<Explanation> {
        if input.highlight.trim().is_empty() {
            return Err(Error::InvalidInput("highlight cannot be empty".to_string()));
        }
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| Error::NotConfigured(NO_PROVIDER_HINT.to_string()))?;

        let located = self.locate(&input.document, &input.highlight).await?;
        let mut warnings = located.warnings;
        if !located.window.found {
            warnings.push(format!("highlight_{}", located.window.outcome.as_str()));
        }

        let prompt = build_prompt(input.mode, input.level, &input.highlight, &located.window);
        let generated = generator.generate(&prompt).await.map_err(|e| {
            tracing::warn!(provider = generator.name(), error = %e, "generation failed");
            e
        })?;

        let mut timings_ms = located.timings_ms;
        timings_ms.extend(generated.timings_ms);

        Ok(Explanation {
            output: generated.text,
            found: located.window.found,
            outcome: located.window.outcome,
            anchor: located.window.anchor,
            mode: input.mode,
            level: input.level,
            window_start_char: located.window.start_char,
            window_end_char: located.window.end_char,
            engine: located.engine,
            extract_source: located.extract_source,
            provider: generated.provider,
            model: generated.model,
            warnings,
            timings_ms,
        })
    }
}
