//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Browser bridge closed: {0}")]
    BridgeClosed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    /// A scenario expectation did not hold. `expectation` names what was
    /// checked so failures can be triaged from the message alone.
    #[error("Expectation failed: {expectation} ({detail})")]
    Expectation { expectation: String, detail: String },

    #[error("Invalid driver transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Target {url} unreachable after {attempts} attempts")]
    TargetUnreachable { url: String, attempts: usize },

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error(transparent)]
    Common(#[from] signup_probe_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    pub fn expectation(expectation: impl Into<String>, detail: impl Into<String>) -> Self {
        E2eError::Expectation {
            expectation: expectation.into(),
            detail: detail.into(),
        }
    }

    /// Configuration problems abort the whole run; everything else fails a
    /// single scenario. Common errors all come from loading the locale table
    /// or fixtures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            E2eError::Config(_)
                | E2eError::PlaywrightNotFound
                | E2eError::TargetUnreachable { .. }
                | E2eError::Toml(_)
                | E2eError::Common(_)
        )
    }

    /// Whether a scenario ran to completion and found the page misbehaving,
    /// as opposed to failing to drive it.
    pub fn is_expectation(&self) -> bool {
        matches!(self, E2eError::Expectation { .. })
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
