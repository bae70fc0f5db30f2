//! Error types for signup-probe

use thiserror::Error;

/// Result type alias using the common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading harness inputs.
///
/// Absence of a matching exchange is never an error; matchers return
/// `Option`/`Vec` for that.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown locale \"{locale}\". Use either {available}")]
    UnknownLocale { locale: String, available: String },

    #[error("Locale {locale} has no string for key {key}")]
    MissingLocaleKey { locale: String, key: String },

    #[error("Fixture not found: {0}")]
    FixtureNotFound(String),

    #[error("Invalid fixture {name}: {reason}")]
    InvalidFixture { name: String, reason: String },

    #[error("Invalid route pattern: {0}")]
    InvalidPattern(String),
}
