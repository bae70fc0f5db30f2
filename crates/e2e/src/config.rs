//! Harness configuration
//!
//! Loaded once per run from an optional TOML file, then overridden by the
//! `SIGNUP_LOCALE` and `SIGNUP_SKIP_INIT` environment variables.

use serde::{Deserialize, Serialize};
use signup_probe_common::WaitPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::E2eResult;

pub const LOCALE_ENV: &str = "SIGNUP_LOCALE";
pub const SKIP_INIT_ENV: &str = "SIGNUP_SKIP_INIT";

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Active UI locale (`en` or `fr`)
    pub locale: String,

    /// Skip navigating to the signup page before each scenario
    pub skip_init: bool,

    /// Directory holding `signup-*.json` fixtures
    pub fixtures_dir: PathBuf,

    /// Locale table (`uiData.json`)
    pub locale_file: PathBuf,

    /// Post-submit settling
    pub settle: SettleConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let fixtures_dir = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures"));
        Self {
            locale: signup_probe_common::locale::DEFAULT_LOCALE.to_string(),
            skip_init: false,
            locale_file: fixtures_dir.join("uiData.json"),
            fixtures_dir,
            settle: SettleConfig::default(),
        }
    }
}

/// Timings for waiting on network activity after a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    /// Longest wait for an expected exchange
    pub timeout_ms: u64,

    /// First poll interval; doubles up to `max_poll_ms`
    pub initial_poll_ms: u64,

    pub max_poll_ms: u64,

    /// Extra wait after a match, to catch duplicate submissions
    pub grace_ms: u64,

    /// Window observed by scenarios that expect no exchange at all
    pub quiet_window_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            initial_poll_ms: 50,
            max_poll_ms: 800,
            grace_ms: 1_000,
            quiet_window_ms: 1_000,
        }
    }
}

impl SettleConfig {
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            initial_interval: Duration::from_millis(self.initial_poll_ms),
            max_interval: Duration::from_millis(self.max_poll_ms),
        }
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!("Loaded harness config from {}", path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `SIGNUP_LOCALE` / `SIGNUP_SKIP_INIT` from the process environment
    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(locale) = var(LOCALE_ENV).filter(|l| !l.trim().is_empty()) {
            self.locale = locale.trim().to_lowercase();
        }
        if let Some(flag) = var(SKIP_INIT_ENV) {
            self.skip_init = parse_flag(&flag);
        }
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
