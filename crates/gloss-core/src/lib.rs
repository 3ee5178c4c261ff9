use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod locate;
pub mod normalize;

pub use locate::{locate, Anchor, ContextWindow, LocateOutcome, LocatorConfig};
pub use normalize::{normalize, NormalizedText};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// What kind of explanation the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// A short plain-language gloss.
    #[default]
    Quick,
    /// Step-by-step walk through the excerpt.
    Breakdown,
    /// A concrete worked example.
    Example,
    /// Unstated assumptions the excerpt relies on.
    Assumptions,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Quick, Mode::Breakdown, Mode::Example, Mode::Assumptions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Quick => "quick",
            Mode::Breakdown => "breakdown",
            Mode::Example => "example",
            Mode::Assumptions => "assumptions",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(Mode::Quick),
            "breakdown" => Ok(Mode::Breakdown),
            "example" => Ok(Mode::Example),
            "assumptions" => Ok(Mode::Assumptions),
            other => Err(Error::InvalidInput(format!(
                "unknown mode: {other:?} (allowed: quick, breakdown, example, assumptions)"
            ))),
        }
    }
}

/// Target audience for the explanation's vocabulary and depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingLevel {
    Middle,
    High,
    #[default]
    College,
    Expert,
}

impl ReadingLevel {
    pub const ALL: [ReadingLevel; 4] = [
        ReadingLevel::Middle,
        ReadingLevel::High,
        ReadingLevel::College,
        ReadingLevel::Expert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingLevel::Middle => "middle",
            ReadingLevel::High => "high",
            ReadingLevel::College => "college",
            ReadingLevel::Expert => "expert",
        }
    }
}

impl fmt::Display for ReadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReadingLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "middle" => Ok(ReadingLevel::Middle),
            "high" => Ok(ReadingLevel::High),
            "college" => Ok(ReadingLevel::College),
            "expert" => Ok(ReadingLevel::Expert),
            other => Err(Error::InvalidInput(format!(
                "unknown reading level: {other:?} (allowed: middle, high, college, expert)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub bytes: Vec<u8>,
    /// Declared content type of the upload, if the client sent one.
    pub content_type: Option<String>,
    /// Original filename (used only as a type hint).
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractSource {
    Cache,
    Extractor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    /// Which engine produced `text` ("pdf-extract", "pdf-pdftotext", "pdf-mutool", "text").
    pub engine: String,
    pub text: String,
    /// True if `text` was clipped to the configured character ceiling.
    pub truncated: bool,
    pub warnings: Vec<String>,
    pub source: ExtractSource,
}

#[async_trait::async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, req: &ExtractRequest) -> Result<ExtractedText>;
}

/// Everything a generator needs to explain one highlight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainPrompt {
    pub system: String,
    pub user: String,
    pub mode: Mode,
    pub level: ReadingLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generated {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait ExplanationGenerator: Send + Sync {
    fn name(&self) -> &'static str;
    async fn generate(&self, prompt: &ExplainPrompt) -> Result<Generated>;
}
