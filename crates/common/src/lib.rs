//! Signup Probe Common Library
//!
//! Browser-independent core of the signup harness: the traffic recorder,
//! structured exchange predicates and matchers, locale bundles and fixtures.

pub mod error;
pub mod exchange;
pub mod fixtures;
pub mod locale;
pub mod matcher;
pub mod pattern;
pub mod predicate;
pub mod recorder;

// Re-export commonly used types
pub use error::{Error, Result};
pub use exchange::{Exchange, ExchangeId, ExchangeState, ObservedRequest, Payload, RequestKey, TrafficEvent};
pub use fixtures::{FixtureStore, SignupRecord};
pub use locale::{LocaleBundle, LocaleContext, LocaleTable};
pub use matcher::{count, find_all, find_first, wait_for_match, WaitPolicy};
pub use pattern::RoutePattern;
pub use predicate::{only_digits, Predicate, Scope};
pub use recorder::{RecordingHandle, RecordingId, TrafficRecorder};

/// Signup Probe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
