//! The signup form: selectors and the data typed into it

use serde::{Deserialize, Serialize};
use signup_probe_common::SignupRecord;
use std::fmt;

/// Text inputs of the signup form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    FirstName,
    LastName,
    Email,
    Phone,
    Password,
    PasswordConfirm,
}

impl FormField {
    pub const ALL: [FormField; 6] = [
        FormField::FirstName,
        FormField::LastName,
        FormField::Email,
        FormField::Phone,
        FormField::Password,
        FormField::PasswordConfirm,
    ];

    /// Identifier shared by the input's `id` and `data-test-id`.
    pub fn id(&self) -> &'static str {
        match self {
            FormField::FirstName => "firstName",
            FormField::LastName => "lastName",
            FormField::Email => "email",
            FormField::Phone => "phone",
            FormField::Password => "password",
            FormField::PasswordConfirm => "passwordConfirm",
        }
    }

    /// `[data-test-id="<id>"]`, used for typing.
    pub fn selector(&self) -> String {
        format!(r#"[data-test-id="{}"]"#, self.id())
    }

    /// `#<id>`, used for validation checks.
    pub fn id_selector(&self) -> String {
        format!("#{}", self.id())
    }

    /// Container holding the field's inline validation errors.
    pub fn error_container(&self) -> String {
        format!(r#"[data-test-id="form-error-{}"]"#, self.id())
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Selectors for the non-text controls of the page.
#[derive(Debug, Clone)]
pub struct SignupForm {
    pub consent_checkbox: String,
    pub submit: String,
    pub language_toggle: String,
    pub province_value: String,
    /// Any inline error, looked up inside a field's error container
    pub field_error: String,
    pub too_long_error: String,
    pub weak_password_error: String,
    pub password_mismatch_error: String,
}

impl Default for SignupForm {
    fn default() -> Self {
        Self {
            consent_checkbox: r#"[data-test-id="checkbox-container-leadDistributeConsentAgreement"] input[type="checkbox"]"#.to_string(),
            submit: r#"[data-test-id="createYourAccount"]"#.to_string(),
            language_toggle: r#"[data-test-id="toggle-language"]"#.to_string(),
            province_value: "#select_province .react-select__single-value".to_string(),
            field_error: ".error-message".to_string(),
            too_long_error: r#"[data-test-id="validation_errors_tooLong"]"#.to_string(),
            weak_password_error: r#"[data-test-id="validation_errors_passwordsTooWeak"]"#.to_string(),
            password_mismatch_error: r#"[data-test-id="validation_errors_passwordsMustMatch"]"#.to_string(),
        }
    }
}

impl SignupForm {
    /// The too-many-characters message under `field`.
    pub fn too_long_error_for(&self, field: FormField) -> String {
        format!("{} {}", field.error_container(), self.too_long_error)
    }

    /// Any inline error under `field`.
    pub fn field_error_for(&self, field: FormField) -> String {
        format!("{} {}", field.error_container(), self.field_error)
    }
}

/// Values to type into the form, in typing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    fields: Vec<(FormField, String)>,
    pub consent: bool,
}

impl FormData {
    /// No fields, consent unchecked.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every field from a fixture record, with consent ticked.
    pub fn from_record(record: &SignupRecord, email: &str) -> Self {
        Self {
            fields: vec![
                (FormField::FirstName, record.first_name.clone()),
                (FormField::LastName, record.last_name.clone()),
                (FormField::Email, email.to_string()),
                (FormField::Phone, record.phone_digits.clone()),
                (FormField::Password, record.password.clone()),
                (FormField::PasswordConfirm, record.password.clone()),
            ],
            consent: true,
        }
    }

    pub fn without_consent(mut self) -> Self {
        self.consent = false;
        self
    }

    /// Replace the typed value of one field.
    pub fn with(mut self, field: FormField, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.fields.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
        self
    }

    pub fn get(&self, field: FormField) -> Option<&str> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(FormField, String)] {
        &self.fields
    }
}
