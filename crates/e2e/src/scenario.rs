//! Scenario catalog
//!
//! Every scenario the suite knows, with the tags used to select subsets from
//! the command line. The flows themselves live in [`crate::flows`].

use serde::Serialize;
use signup_probe_common::{FixtureStore, LocaleContext, TrafficRecorder};

use crate::browser::BrowserSession;
use crate::config::SettleConfig;
use crate::error::{E2eError, E2eResult};
use crate::flows;
use crate::form::{FormField, SignupForm};

/// What a scenario does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Fill valid data, submit, expect one 201 echoing the data back
    CreateAccount { clicks: u32, toggle_language: bool },
    /// Pad one field with spaces and expect the POST to carry it trimmed
    TrimmedField { field: FormField },
    /// Reuse a registered email and expect a rejection plus an on-page error
    DuplicateAccount,
    /// Submit an untouched form; the URL must not change and nothing is created
    EmptyFormNotPosted,
    /// Valid data without the consent checkbox must not create an account
    MissingConsentNotPosted,
    /// Every input shows the required-field message when left empty
    RequiredFields,
    /// Typing 15 digits into the phone keeps the first 10, with no error
    PhoneDigitCap,
    /// An over-long value shows the too-many-characters message
    TooLongField { field: FormField },
    /// A malformed email shows the invalid-email message
    InvalidEmail { typed: &'static str },
    /// The weak-password warning shows exactly when `password` breaks a rule
    PasswordStrength { password: &'static str, weak: bool },
    MismatchedPasswords,
}

#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: &'static str,

    pub description: &'static str,

    /// Tags for filtering
    pub tags: &'static [&'static str],

    /// Tracked defect this scenario reproduces, if any. Failures are reported
    /// but do not fail the run.
    pub known_defect: Option<&'static str>,

    #[serde(flatten)]
    pub kind: ScenarioKind,
}

impl Scenario {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub async fn run(&self, ctx: &ScenarioContext<'_>) -> E2eResult<()> {
        match self.kind {
            ScenarioKind::CreateAccount {
                clicks,
                toggle_language,
            } => flows::create_account(ctx, clicks, toggle_language).await,
            ScenarioKind::TrimmedField { field } => flows::trimmed_field(ctx, field).await,
            ScenarioKind::DuplicateAccount => flows::duplicate_account(ctx).await,
            ScenarioKind::EmptyFormNotPosted => flows::empty_form_not_posted(ctx).await,
            ScenarioKind::MissingConsentNotPosted => flows::missing_consent_not_posted(ctx).await,
            ScenarioKind::RequiredFields => flows::required_fields(ctx).await,
            ScenarioKind::PhoneDigitCap => flows::phone_digit_cap(ctx).await,
            ScenarioKind::TooLongField { field } => flows::too_long_field(ctx, field).await,
            ScenarioKind::InvalidEmail { typed } => flows::invalid_email(ctx, typed).await,
            ScenarioKind::PasswordStrength { password, weak } => {
                flows::password_strength(ctx, password, weak).await
            }
            ScenarioKind::MismatchedPasswords => flows::mismatched_passwords(ctx).await,
        }
    }
}

/// Everything a scenario needs, borrowed from the runner for one run.
pub struct ScenarioContext<'a> {
    pub browser: &'a dyn BrowserSession,
    pub recorder: &'a TrafficRecorder,
    pub locale: &'a LocaleContext,
    pub fixtures: &'a FixtureStore,
    pub form: &'a SignupForm,
    pub settle: &'a SettleConfig,
}

/// All scenarios in execution order.
pub fn catalog() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "create-account",
            description: "Creates a new account and verifies 201 + echoed data",
            tags: &["network", "smoke"],
            known_defect: None,
            kind: ScenarioKind::CreateAccount {
                clicks: 1,
                toggle_language: false,
            },
        },
        Scenario {
            name: "create-account-toggle-language",
            description: "Fills out data, toggles language, creates a new account",
            tags: &["network", "language"],
            known_defect: Some("DEFECT-002: toggling the language mid-signup loses the account creation"),
            kind: ScenarioKind::CreateAccount {
                clicks: 1,
                toggle_language: true,
            },
        },
        Scenario {
            name: "create-account-double-click",
            description: "Double-clicking submit creates exactly one account",
            tags: &["network"],
            known_defect: None,
            kind: ScenarioKind::CreateAccount {
                clicks: 2,
                toggle_language: false,
            },
        },
        Scenario {
            name: "duplicate-account",
            description: "Registering an existing email is rejected with 409 and an on-page message",
            tags: &["network", "negative"],
            known_defect: None,
            kind: ScenarioKind::DuplicateAccount,
        },
        Scenario {
            name: "empty-form-not-posted",
            description: "No data is sent when the form is empty",
            tags: &["network", "negative"],
            known_defect: None,
            kind: ScenarioKind::EmptyFormNotPosted,
        },
        Scenario {
            name: "missing-consent-not-posted",
            description: "Valid data without the agreement checkbox is not posted",
            tags: &["network", "negative"],
            known_defect: Some("DEFECT-001: the form posts without the consent agreement"),
            kind: ScenarioKind::MissingConsentNotPosted,
        },
        Scenario {
            name: "trimmed-first-name",
            description: "Leading and trailing spaces in the first name are not posted",
            tags: &["validation", "trimming"],
            known_defect: None,
            kind: ScenarioKind::TrimmedField {
                field: FormField::FirstName,
            },
        },
        Scenario {
            name: "trimmed-last-name",
            description: "Leading and trailing spaces in the last name are not posted",
            tags: &["validation", "trimming"],
            known_defect: None,
            kind: ScenarioKind::TrimmedField {
                field: FormField::LastName,
            },
        },
        Scenario {
            name: "trimmed-email",
            description: "Leading spaces in the email are not posted",
            tags: &["validation", "trimming"],
            known_defect: None,
            kind: ScenarioKind::TrimmedField {
                field: FormField::Email,
            },
        },
        Scenario {
            name: "required-fields",
            description: "Shows the required message when fields are left empty",
            tags: &["validation", "smoke"],
            known_defect: None,
            kind: ScenarioKind::RequiredFields,
        },
        Scenario {
            name: "phone-capped-at-ten-digits",
            description: "The phone field keeps only the first 10 of 15 typed digits",
            tags: &["validation", "phone"],
            known_defect: None,
            kind: ScenarioKind::PhoneDigitCap,
        },
        Scenario {
            name: "too-long-first-name",
            description: "An over-long first name shows the too-many-characters message",
            tags: &["validation", "length"],
            known_defect: None,
            kind: ScenarioKind::TooLongField {
                field: FormField::FirstName,
            },
        },
        Scenario {
            name: "too-long-last-name",
            description: "An over-long last name shows the too-many-characters message",
            tags: &["validation", "length"],
            known_defect: None,
            kind: ScenarioKind::TooLongField {
                field: FormField::LastName,
            },
        },
        Scenario {
            name: "too-long-email",
            description: "An over-long email shows the too-many-characters message",
            tags: &["validation", "length", "email"],
            known_defect: None,
            kind: ScenarioKind::TooLongField {
                field: FormField::Email,
            },
        },
        Scenario {
            name: "malformed-email",
            description: "An email without a domain suffix is rejected",
            tags: &["validation", "email"],
            known_defect: None,
            kind: ScenarioKind::InvalidEmail { typed: "test@test" },
        },
        Scenario {
            name: "email-missing-at",
            description: "An email without @ is rejected",
            tags: &["validation", "email"],
            known_defect: None,
            kind: ScenarioKind::InvalidEmail {
                typed: "testingemail.cp",
            },
        },
        Scenario {
            name: "password-too-short",
            description: "A password under 12 characters is too weak",
            tags: &["validation", "password"],
            known_defect: None,
            kind: ScenarioKind::PasswordStrength {
                password: "Ab1Ab1Ab1Ab",
                weak: true,
            },
        },
        Scenario {
            name: "password-missing-digit",
            description: "A password without a digit is too weak",
            tags: &["validation", "password"],
            known_defect: None,
            kind: ScenarioKind::PasswordStrength {
                password: "AbAbAbAbAbAb",
                weak: true,
            },
        },
        Scenario {
            name: "password-missing-lowercase",
            description: "A password without a lowercase letter is too weak",
            tags: &["validation", "password"],
            known_defect: None,
            kind: ScenarioKind::PasswordStrength {
                password: "AAAAAAAAAA1A",
                weak: true,
            },
        },
        Scenario {
            name: "password-missing-uppercase",
            description: "A password without an uppercase letter is too weak",
            tags: &["validation", "password"],
            known_defect: None,
            kind: ScenarioKind::PasswordStrength {
                password: "bbbbbbbbbb2b",
                weak: true,
            },
        },
        Scenario {
            name: "password-specials-brackets",
            description: "Symbols such as !@#$%^&*()_+=-{}[] do not break the strength rules",
            tags: &["validation", "password"],
            known_defect: None,
            kind: ScenarioKind::PasswordStrength {
                password: "!@#$%^&*()_+=-{}[]aB1",
                weak: false,
            },
        },
        Scenario {
            name: "password-specials-punctuation",
            description: "Symbols such as |\\:;\"'<>,.?/`~ do not break the strength rules",
            tags: &["validation", "password"],
            known_defect: None,
            kind: ScenarioKind::PasswordStrength {
                password: "|\\:;\"'<>,.?/`~cD2",
                weak: false,
            },
        },
        Scenario {
            name: "mismatched-passwords",
            description: "Different password and confirmation show the must-match message",
            tags: &["validation", "password"],
            known_defect: None,
            kind: ScenarioKind::MismatchedPasswords,
        },
    ]
}

/// Scenarios carrying `tag`, in catalog order.
pub fn tagged(tag: &str) -> Vec<Scenario> {
    catalog().into_iter().filter(|s| s.has_tag(tag)).collect()
}

pub fn named(name: &str) -> E2eResult<Scenario> {
    catalog()
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| E2eError::ScenarioNotFound(name.to_string()))
}
