//! In-process stand-in for the signup page and its backend.
//!
//! `FakeSignupApp` implements `BrowserSession` over a tiny model of the form
//! and reports its POST traffic to the recorder it was opened with, the way
//! the Playwright bridge does. Responses arrive asynchronously after
//! `response_delay`.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use signup_probe_common::{LocaleBundle, LocaleContext, LocaleTable, Payload, RequestKey, TrafficEvent, TrafficRecorder};
use signup_probe_e2e::config::{HarnessConfig, SettleConfig};
use signup_probe_e2e::runner::{RunnerConfig, SessionFactory};
use signup_probe_e2e::{BrowserSession, E2eError, E2eResult, FormField, SignupForm};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ACCOUNTS_URL: &str = "https://api.qa.example.ca/v1/accounts";
pub const COLLECTOR_URL: &str = "https://collector.example.io/v1/events";

/// Email of the `signup-duplicate` fixture, registered in every new backend.
pub const REGISTERED_EMAIL: &str = "john.smith@test.com";

/// Longest value the name and email inputs accept without complaint.
const MAX_CHARS: usize = 50;

/// Switches for reproducing the app's known and hypothetical defects.
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Ignore submit clicks while a creation request is in flight
    pub debounce: bool,
    /// Trim text inputs before posting
    pub trims: bool,
    /// Refuse to post until the consent box is ticked
    pub requires_consent: bool,
    /// Toggling the language wipes the typed values
    pub toggle_clears_form: bool,
    /// Backend rejects emails it has seen before
    pub enforce_unique: bool,
    /// Status used for duplicate emails
    pub duplicate_status: u16,
    /// The phone input drops digits past the tenth
    pub phone_cap: bool,
    /// Weak passwords raise the complexity warning
    pub password_rules: bool,
    /// The language toggle is detached from the page
    pub toggle_broken: bool,
    pub response_delay: Duration,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            debounce: true,
            trims: true,
            requires_consent: true,
            toggle_clears_form: false,
            enforce_unique: true,
            duplicate_status: 409,
            phone_cap: true,
            password_rules: true,
            toggle_broken: false,
            response_delay: Duration::from_millis(20),
        }
    }
}

/// Accounts shared by every session of one factory.
#[derive(Default)]
pub struct Backend {
    accounts: Mutex<HashSet<String>>,
}

impl Backend {
    pub fn seed(&self, email: &str) {
        self.accounts.lock().insert(email.to_lowercase());
    }

    pub fn accounts(&self) -> usize {
        self.accounts.lock().len()
    }
}

struct Page {
    url: String,
    language: String,
    cookies_accepted: bool,
    toggle_has_target: bool,
    values: HashMap<&'static str, String>,
    consent: bool,
    in_flight: bool,
    focused: Option<&'static str>,
    touched: HashSet<&'static str>,
    account_exists_shown: bool,
    closed: bool,
}

impl Page {
    fn value(&self, id: &str) -> &str {
        self.values.get(id).map(String::as_str).unwrap_or_default()
    }

    /// Validation messages only show once a field has lost focus.
    fn blurred_value(&self, id: &str) -> Option<&str> {
        let value = self.value(id);
        (self.touched.contains(id) && !value.is_empty()).then_some(value)
    }

    fn too_long(&self, field: FormField) -> bool {
        self.blurred_value(field.id())
            .map_or(false, |v| v.chars().count() > MAX_CHARS)
    }

    fn invalid_email(&self) -> bool {
        self.blurred_value("email").map_or(false, |v| !looks_like_email(v.trim()))
    }

    fn weak_password(&self, rules: bool) -> bool {
        rules && self.blurred_value("password").map_or(false, |v| !is_strong(v))
    }

    fn passwords_differ(&self) -> bool {
        self.blurred_value("passwordConfirm")
            .map_or(false, |v| v != self.value("password"))
    }

    fn phone_overflows(&self) -> bool {
        self.blurred_value("phone")
            .map_or(false, |v| v.chars().filter(|c| c.is_ascii_digit()).count() > 10)
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn is_strong(password: &str) -> bool {
    password.chars().count() >= 12
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_uppercase())
}

struct Inner {
    recorder: TrafficRecorder,
    behavior: Behavior,
    backend: Arc<Backend>,
    bundles: HashMap<String, LocaleBundle>,
    form: SignupForm,
    page: Mutex<Page>,
    next_key: AtomicU64,
    visits: Arc<AtomicUsize>,
}

pub struct FakeSignupApp {
    inner: Arc<Inner>,
}

impl FakeSignupApp {
    fn new(
        recorder: TrafficRecorder,
        behavior: Behavior,
        backend: Arc<Backend>,
        locales: &LocaleContext,
        visits: Arc<AtomicUsize>,
    ) -> Self {
        let mut bundles = HashMap::new();
        bundles.insert(locales.active().locale().to_string(), locales.active().clone());
        bundles.insert(locales.opposite().locale().to_string(), locales.opposite().clone());

        Self {
            inner: Arc::new(Inner {
                recorder,
                behavior,
                backend,
                bundles,
                form: SignupForm::default(),
                page: Mutex::new(Page {
                    url: "about:blank".to_string(),
                    language: "en".to_string(),
                    cookies_accepted: false,
                    toggle_has_target: true,
                    values: HashMap::new(),
                    consent: false,
                    in_flight: false,
                    focused: None,
                    touched: HashSet::new(),
                    account_exists_shown: false,
                    closed: false,
                }),
                next_key: AtomicU64::new(1),
                visits,
            }),
        }
    }
}

impl Inner {
    fn ui(&self, key: &str) -> String {
        let language = self.page.lock().language.clone();
        self.bundles
            .get(&language)
            .and_then(|b| b.get(key))
            .unwrap_or_default()
            .to_string()
    }

    fn next_key(&self) -> RequestKey {
        RequestKey(self.next_key.fetch_add(1, Ordering::Relaxed))
    }

    /// Analytics beacon answered immediately with 204.
    fn beacon(&self, event: &str) {
        let key = self.next_key();
        let body = serde_json::json!({ "event": event }).to_string();
        self.recorder.observe(key, "POST", COLLECTOR_URL, Some(&body));
        self.recorder.ingest(TrafficEvent::Response {
            key,
            status: 204,
            body: Payload::Empty,
        });
    }

    fn submit(self: &Arc<Self>) {
        self.beacon("submit_click");

        let body = {
            let mut page = self.page.lock();
            if self.behavior.debounce && page.in_flight {
                return;
            }

            let mut values = serde_json::Map::new();
            let mut missing = false;
            for field in FormField::ALL {
                let raw = page.values.get(field.id()).cloned().unwrap_or_default();
                let value = if self.behavior.trims {
                    raw.trim().to_string()
                } else {
                    raw
                };
                if value.trim().is_empty() {
                    missing = true;
                    page.touched.insert(field.id());
                }
                if field != FormField::PasswordConfirm {
                    let value = if field == FormField::Phone {
                        value.chars().filter(|c| c.is_ascii_digit()).collect::<String>()
                    } else {
                        value
                    };
                    values.insert(field.id().to_string(), value.into());
                }
            }
            if missing || (self.behavior.requires_consent && !page.consent) {
                return;
            }

            values.insert("province".to_string(), "QC".into());
            values.insert("language".to_string(), page.language.clone().into());
            page.in_flight = true;
            serde_json::Value::Object(values)
        };

        let key = self.next_key();
        self.recorder
            .observe(key, "POST", ACCOUNTS_URL, Some(&body.to_string()));

        let inner = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.behavior.response_delay).await;
            let email = body["email"].as_str().unwrap_or_default().to_lowercase();

            let duplicate = {
                let mut accounts = inner.backend.accounts.lock();
                let seen = accounts.contains(&email);
                accounts.insert(email.clone());
                seen && inner.behavior.enforce_unique
            };

            let (status, response) = if duplicate {
                (
                    inner.behavior.duplicate_status,
                    serde_json::json!({ "error": "ACCOUNT_EXISTS", "email": email }),
                )
            } else {
                let mut echoed = body.clone();
                if let Some(fields) = echoed.as_object_mut() {
                    fields.remove("password");
                }
                let digits = body["phone"].as_str().unwrap_or_default().to_string();
                echoed["phone"] = format_phone(&digits).into();
                echoed["id"] = inner.next_key.load(Ordering::Relaxed).into();
                (201, echoed)
            };

            {
                let mut page = inner.page.lock();
                page.in_flight = false;
                if duplicate {
                    page.account_exists_shown = true;
                } else {
                    page.url = page.url.replace("/signup", "/getting-started");
                }
            }
            inner.recorder.ingest(TrafficEvent::Response {
                key,
                status,
                body: Payload::from_text(Some(&response.to_string())),
            });
        });
    }
}

/// `+1 (514) 123-4567`, the way the backend echoes phone numbers.
fn format_phone(digits: &str) -> String {
    if digits.len() == 10 {
        format!("+1 ({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
    } else {
        digits.to_string()
    }
}

fn field_id(selector: &str) -> Option<&'static str> {
    let id = selector
        .strip_prefix("[data-test-id=\"")
        .and_then(|s| s.strip_suffix("\"]"))
        .or_else(|| selector.strip_prefix('#'))?;
    FormField::ALL.iter().map(|f| f.id()).find(|f| *f == id)
}

fn not_found(step: &str, selector: &str) -> E2eError {
    E2eError::StepFailed {
        step: format!("{}:{}", step, selector),
        reason: "element not found".to_string(),
    }
}

#[async_trait]
impl BrowserSession for FakeSignupApp {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.inner.visits.fetch_add(1, Ordering::Relaxed);
        self.inner.page.lock().url = url.to_string();
        self.inner.beacon("page_view");
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        Ok(self.inner.page.lock().url.clone())
    }

    async fn clear_and_type(&self, selector: &str, text: &str) -> E2eResult<()> {
        let id = field_id(selector).ok_or_else(|| not_found("type", selector))?;
        let value = if id == "phone" {
            // The phone input masks as you type.
            let mut digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
            if self.inner.behavior.phone_cap {
                digits.truncate(10);
            }
            if digits.len() == 10 {
                format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
            } else if self.inner.behavior.phone_cap {
                digits
            } else {
                text.to_string()
            }
        } else {
            text.to_string()
        };
        self.inner.page.lock().values.insert(id, value);
        Ok(())
    }

    async fn click(&self, selector: &str, clicks: u32) -> E2eResult<()> {
        let form = &self.inner.form;
        if selector == form.submit {
            for _ in 0..clicks {
                self.inner.submit();
            }
            return Ok(());
        }
        if selector == form.language_toggle {
            if self.inner.behavior.toggle_broken {
                return Err(E2eError::StepFailed {
                    step: format!("click:{}", selector),
                    reason: "element is not attached to the DOM".to_string(),
                });
            }
            let mut page = self.inner.page.lock();
            if page.toggle_has_target {
                return Err(E2eError::StepFailed {
                    step: format!("click:{}", selector),
                    reason: "link opened a new tab".to_string(),
                });
            }
            page.language = if page.language == "en" { "fr" } else { "en" }.to_string();
            if self.inner.behavior.toggle_clears_form {
                page.values.clear();
            }
            return Ok(());
        }
        Err(not_found("click", selector))
    }

    async fn click_text(&self, tag: &str, text: &str) -> E2eResult<()> {
        // The cookie banner answers to either language.
        let accepts = self
            .inner
            .bundles
            .values()
            .any(|b| b.get("buttons.acceptCookies") == Some(text));
        if tag == "button" && accepts {
            self.inner.page.lock().cookies_accepted = true;
            Ok(())
        } else {
            Err(not_found("click_text", text))
        }
    }

    async fn check(&self, selector: &str) -> E2eResult<()> {
        if selector != self.inner.form.consent_checkbox {
            return Err(not_found("check", selector));
        }
        self.inner.page.lock().consent = true;
        Ok(())
    }

    async fn focus(&self, selector: &str) -> E2eResult<()> {
        let id = field_id(selector).ok_or_else(|| not_found("focus", selector))?;
        self.inner.page.lock().focused = Some(id);
        Ok(())
    }

    async fn blur(&self) -> E2eResult<()> {
        let mut page = self.inner.page.lock();
        if let Some(id) = page.focused.take() {
            page.touched.insert(id);
        }
        Ok(())
    }

    async fn input_value(&self, selector: &str) -> E2eResult<String> {
        let id = field_id(selector).ok_or_else(|| not_found("value", selector))?;
        Ok(self.inner.page.lock().values.get(id).cloned().unwrap_or_default())
    }

    async fn text_content(&self, selector: &str) -> E2eResult<String> {
        let form = &self.inner.form;
        if selector == form.province_value {
            return Ok(self.inner.ui("provinces.QC"));
        }
        let too_long = {
            let page = self.inner.page.lock();
            [FormField::FirstName, FormField::LastName]
                .into_iter()
                .any(|f| selector == form.too_long_error_for(f) && page.too_long(f))
        };
        if too_long {
            Ok(self.inner.ui("errors.tooManyChars"))
        } else {
            Err(not_found("text", selector))
        }
    }

    async fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        let form = &self.inner.form;
        if field_id(selector).is_some() || selector == form.province_value {
            return Ok(true);
        }
        let page = self.inner.page.lock();
        if selector == form.weak_password_error {
            return Ok(page.weak_password(self.inner.behavior.password_rules));
        }
        if selector == form.password_mismatch_error {
            return Ok(page.passwords_differ());
        }
        if selector == form.field_error_for(FormField::Phone) {
            return Ok(page.phone_overflows());
        }
        for field in [FormField::FirstName, FormField::LastName] {
            if selector == form.too_long_error_for(field) {
                return Ok(page.too_long(field));
            }
        }
        Ok(false)
    }

    async fn has_visible_text(&self, text: &str) -> E2eResult<bool> {
        let (account_exists, invalid_email, too_long) = {
            let page = self.inner.page.lock();
            (
                page.account_exists_shown,
                page.invalid_email(),
                [FormField::FirstName, FormField::LastName, FormField::Email]
                    .into_iter()
                    .any(|f| page.too_long(f)),
            )
        };
        Ok((account_exists && text == self.inner.ui("errors.accountExists"))
            || (invalid_email && text == self.inner.ui("errors.invalidEmail"))
            || (too_long && text == self.inner.ui("errors.tooManyChars")))
    }

    async fn has_text_near(&self, selector: &str, text: &str) -> E2eResult<bool> {
        let id = field_id(selector).ok_or_else(|| not_found("text_near", selector))?;
        let required = self.inner.ui("errors.required");
        let page = self.inner.page.lock();
        let empty = page.values.get(id).map_or(true, |v| v.trim().is_empty());
        Ok(page.touched.contains(id) && empty && text == required)
    }

    async fn remove_attribute(&self, selector: &str, name: &str) -> E2eResult<()> {
        if selector == self.inner.form.language_toggle && name == "target" {
            self.inner.page.lock().toggle_has_target = false;
        }
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        self.inner.page.lock().closed = true;
        Ok(())
    }
}

/// Opens a `FakeSignupApp` per scenario, all sharing one backend.
pub struct FakeFactory {
    pub behavior: Behavior,
    pub backend: Arc<Backend>,
    pub visits: Arc<AtomicUsize>,
    pub sessions: Arc<AtomicUsize>,
    locales: LocaleContext,
}

impl FakeFactory {
    pub fn new(behavior: Behavior, locale: &str) -> Self {
        let table = LocaleTable::from_file(&fixtures_dir().join("uiData.json"))
            .expect("locale table fixture");
        let backend = Arc::new(Backend::default());
        backend.seed(REGISTERED_EMAIL);
        Self {
            behavior,
            backend,
            visits: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(AtomicUsize::new(0)),
            locales: LocaleContext::load(&table, locale).expect("known locale"),
        }
    }

    /// Forget every registered account.
    pub fn without_accounts(mut self) -> Self {
        self.backend = Arc::new(Backend::default());
        self
    }

    /// Open a session directly, for tests that drive it by hand.
    pub fn app(&self, recorder: &TrafficRecorder) -> FakeSignupApp {
        FakeSignupApp::new(
            recorder.clone(),
            self.behavior.clone(),
            self.backend.clone(),
            &self.locales,
            self.visits.clone(),
        )
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, recorder: TrafficRecorder) -> E2eResult<Box<dyn BrowserSession>> {
        self.sessions.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(self.app(&recorder)))
    }
}

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures"))
}

pub fn fast_settle() -> SettleConfig {
    SettleConfig {
        timeout_ms: 2_000,
        initial_poll_ms: 5,
        max_poll_ms: 50,
        grace_ms: 100,
        quiet_window_ms: 150,
    }
}

pub fn runner_config(locale: &str, output_dir: PathBuf) -> RunnerConfig {
    RunnerConfig {
        harness: HarnessConfig {
            locale: locale.to_string(),
            settle: fast_settle(),
            ..HarnessConfig::default()
        },
        probe: None,
        output_dir,
        ..RunnerConfig::default()
    }
}
