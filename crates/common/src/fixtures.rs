//! Named JSON fixture records

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Error, Result};

/// Signup form data as stored in `signup-*.json` fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRecord {
    pub first_name: String,
    pub last_name: String,
    pub email_prefix: String,
    pub email_domain: String,
    pub phone_digits: String,
    pub password: String,
    /// Province code echoed by the backend, e.g. `QC`
    pub province_value: String,
}

impl SignupRecord {
    /// `prefix_<unix millis>@domain`, unique per run so the backend accepts
    /// the signup repeatedly.
    pub fn unique_email(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}_{}@{}",
            self.email_prefix,
            now.timestamp_millis(),
            self.email_domain
        )
    }

    /// `prefix@domain`, for records that must collide with an existing account.
    pub fn fixed_email(&self) -> String {
        format!("{}@{}", self.email_prefix, self.email_domain)
    }

    fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidFixture {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if self.email_prefix.is_empty() || self.email_domain.is_empty() {
            return Err(invalid("email prefix and domain are required"));
        }
        if self.phone_digits.is_empty() || !self.phone_digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("phoneDigits must contain only digits"));
        }
        Ok(())
    }
}

/// Loads fixtures by name from a directory (`<dir>/<name>.json`).
#[derive(Debug, Clone)]
pub struct FixtureStore {
    dir: PathBuf,
}

impl FixtureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(format!("{}.json", name));
        if !path.exists() {
            return Err(Error::FixtureNotFound(path.display().to_string()));
        }
        debug!("Loading fixture {}", path.display());
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| Error::InvalidFixture {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn signup(&self, name: &str) -> Result<SignupRecord> {
        let record: SignupRecord = self.load(name)?;
        record.validate(name)?;
        Ok(record)
    }
}
