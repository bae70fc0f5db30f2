//! Main test runner that orchestrates browser sessions and scenarios

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signup_probe_common::{FixtureStore, LocaleContext, LocaleTable, TrafficRecorder};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::browser::{init_signup, BrowserSession};
use crate::config::HarnessConfig;
use crate::error::E2eResult;
use crate::flows::REQUIRED_FIXTURES;
use crate::form::SignupForm;
use crate::playwright::{PlaywrightConfig, PlaywrightSession};
use crate::scenario::{self, Scenario, ScenarioContext};
use crate::target::{wait_until_reachable, ProbeConfig};

/// Opens one browser session per scenario.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a fresh page whose network traffic is reported to `recorder`.
    async fn open(&self, recorder: TrafficRecorder) -> E2eResult<Box<dyn BrowserSession>>;
}

/// Launches a Playwright bridge per session.
pub struct PlaywrightFactory {
    config: PlaywrightConfig,
}

impl PlaywrightFactory {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for PlaywrightFactory {
    async fn open(&self, recorder: TrafficRecorder) -> E2eResult<Box<dyn BrowserSession>> {
        let session = PlaywrightSession::launch(&self.config, recorder).await?;
        Ok(Box::new(session))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    /// Failed the way its tracked defect says it would
    KnownDefect,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub known_defect: Option<String>,
}

impl TestResult {
    pub fn success(&self) -> bool {
        self.status != TestStatus::Failed
    }
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub locale: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub known_defects: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub harness: HarnessConfig,
    pub playwright: PlaywrightConfig,
    /// Poll the signup page before the first scenario; `None` skips the probe
    pub probe: Option<ProbeConfig>,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            harness: HarnessConfig::default(),
            playwright: PlaywrightConfig::default(),
            probe: Some(ProbeConfig::default()),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Main E2E test runner
pub struct TestRunner {
    harness: HarnessConfig,
    locale: Arc<LocaleContext>,
    fixtures: FixtureStore,
    form: SignupForm,
    factory: Box<dyn SessionFactory>,
    probe: Option<ProbeConfig>,
    output_dir: PathBuf,
}

impl TestRunner {
    /// Create a runner driving real browsers through Playwright
    pub fn with_config(config: RunnerConfig) -> E2eResult<Self> {
        let factory = PlaywrightFactory::new(config.playwright.clone());
        Self::with_factory(config, Box::new(factory))
    }

    /// Create a runner with a custom session factory.
    ///
    /// Fails when the locale table or a signup fixture cannot be read, or the
    /// configured locale is unknown, before any scenario runs.
    pub fn with_factory(config: RunnerConfig, factory: Box<dyn SessionFactory>) -> E2eResult<Self> {
        let table = LocaleTable::from_file(&config.harness.locale_file)?;
        let locale = LocaleContext::load(&table, &config.harness.locale)?;

        let fixtures = FixtureStore::new(config.harness.fixtures_dir.clone());
        for name in REQUIRED_FIXTURES {
            fixtures.signup(name)?;
        }
        debug!("Fixtures in {} are readable", config.harness.fixtures_dir.display());

        Ok(Self {
            fixtures,
            harness: config.harness,
            locale: Arc::new(locale),
            form: SignupForm::default(),
            factory,
            probe: config.probe,
            output_dir: config.output_dir,
        })
    }

    pub fn locale(&self) -> Arc<LocaleContext> {
        self.locale.clone()
    }

    /// Wait for the signup page to respond, if probing is enabled
    pub async fn probe_target(&self) -> E2eResult<()> {
        let Some(probe) = &self.probe else {
            return Ok(());
        };
        let url = self.locale.active().require("urls.signup")?;
        wait_until_reachable(url, probe).await
    }

    /// Run every scenario in the catalog
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        self.run_scenarios(&scenario::catalog()).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        self.run_scenarios(&scenario::tagged(tag)).await
    }

    /// Run a specific scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let scenario = scenario::named(name)?;
        self.run_scenarios(std::slice::from_ref(&scenario)).await
    }

    /// Run scenarios in order. A scenario failure is recorded and the run
    /// moves on; configuration errors abort the run.
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let mut known_defects = 0;

        self.probe_target().await?;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(scenario).await?;
            match result.status {
                TestStatus::Passed => {
                    passed += 1;
                    info!("✓ {} ({} ms)", result.name, result.duration_ms);
                }
                TestStatus::KnownDefect => {
                    known_defects += 1;
                    warn!(
                        "~ {} - known defect: {}",
                        result.name,
                        result.known_defect.as_deref().unwrap_or_default()
                    );
                }
                TestStatus::Failed => {
                    failed += 1;
                    error!(
                        "✗ {} - {}",
                        result.name,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} known defect(s) ({} ms)",
            passed, failed, known_defects, duration_ms
        );

        Ok(TestSuiteResult {
            locale: self.locale.active().locale().to_string(),
            total: scenarios.len(),
            passed,
            failed,
            known_defects,
            duration_ms,
            results,
        })
    }

    /// Run one scenario in its own browser session. Only fatal errors are
    /// returned as `Err`; everything else becomes a failed result.
    pub async fn run_scenario(&self, scenario: &Scenario) -> E2eResult<TestResult> {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        let recorder = TrafficRecorder::new();
        let outcome = match self.factory.open(recorder.clone()).await {
            Ok(browser) => {
                let outcome = self.exercise(scenario, browser.as_ref(), &recorder).await;
                if let Err(e) = browser.close().await {
                    warn!("Closing browser after {} failed: {}", scenario.name, e);
                }
                outcome
            }
            Err(e) => Err(e),
        };

        let (status, error) = match outcome {
            Ok(()) => {
                if let Some(defect) = scenario.known_defect {
                    info!("{} passed; known defect no longer reproduces: {}", scenario.name, defect);
                }
                (TestStatus::Passed, None)
            }
            Err(e) if e.is_fatal() => {
                error!("Aborting run: {}", e);
                return Err(e);
            }
            Err(e) => {
                let status = match scenario.known_defect {
                    // Only a failed expectation reproduces the tracked defect.
                    Some(_) if e.is_expectation() => TestStatus::KnownDefect,
                    Some(defect) => {
                        warn!("{} failed before reaching its known defect ({})", scenario.name, defect);
                        TestStatus::Failed
                    }
                    None => TestStatus::Failed,
                };
                (status, Some(e.to_string()))
            }
        };

        Ok(TestResult {
            name: scenario.name.to_string(),
            description: scenario.description.to_string(),
            tags: scenario.tags.iter().map(|t| t.to_string()).collect(),
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
            known_defect: scenario.known_defect.map(str::to_string),
        })
    }

    async fn exercise(
        &self,
        scenario: &Scenario,
        browser: &dyn BrowserSession,
        recorder: &TrafficRecorder,
    ) -> E2eResult<()> {
        if self.harness.skip_init {
            debug!("Skipping signup initialization");
        } else {
            init_signup(browser, &self.locale, &self.form).await?;
        }

        let ctx = ScenarioContext {
            browser,
            recorder,
            locale: &self.locale,
            fixtures: &self.fixtures,
            form: &self.form,
            settle: &self.harness.settle,
        };
        scenario.run(&ctx).await
    }

    /// Write suite results to `<output_dir>/test-results.json`
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
