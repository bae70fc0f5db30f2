//! Scenario driver
//!
//! Walks one scenario through `Idle -> FieldsPopulated -> Submitted ->
//! Settled -> Asserted`, recording every POST the page sends from the moment
//! the driver is created. Calls made out of order fail with
//! [`E2eError::InvalidTransition`] instead of silently skipping a phase.

use signup_probe_common::{
    wait_for_match, Exchange, Predicate, RecordingHandle, RoutePattern, TrafficRecorder, WaitPolicy,
};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::browser::{self, BrowserSession};
use crate::error::{E2eError, E2eResult};
use crate::form::{FormData, SignupForm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    FieldsPopulated,
    Submitted,
    Settled,
    Asserted,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriverState::Idle => "idle",
            DriverState::FieldsPopulated => "fields-populated",
            DriverState::Submitted => "submitted",
            DriverState::Settled => "settled",
            DriverState::Asserted => "asserted",
        })
    }
}

/// How long to let network activity run after a submission.
#[derive(Debug, Clone)]
pub enum SettlePolicy {
    /// Observe a fixed window. Used when the expected outcome is that nothing
    /// matching happens.
    Fixed(Duration),
    /// Poll until `predicate` matches or `wait.timeout` elapses, then keep
    /// recording for `grace` so late duplicates are captured too.
    UntilMatch {
        predicate: Predicate,
        wait: WaitPolicy,
        grace: Duration,
    },
}

pub struct ScenarioDriver<'a> {
    browser: &'a dyn BrowserSession,
    recorder: TrafficRecorder,
    recording: RecordingHandle,
    form: &'a SignupForm,
    state: DriverState,
    settled: Vec<Exchange>,
}

impl<'a> ScenarioDriver<'a> {
    /// Start recording all POST traffic and return an idle driver.
    pub fn start(
        browser: &'a dyn BrowserSession,
        recorder: &TrafficRecorder,
        form: &'a SignupForm,
    ) -> Self {
        let recording = recorder.start_recording(RoutePattern::any_post());
        Self {
            browser,
            recorder: recorder.clone(),
            recording,
            form,
            state: DriverState::Idle,
            settled: Vec::new(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The page, for DOM checks around the network phases.
    pub fn browser(&self) -> &'a dyn BrowserSession {
        self.browser
    }

    pub fn form(&self) -> &'a SignupForm {
        self.form
    }

    /// Live view of the recording, independent of the driver state.
    pub fn live(&self) -> Vec<Exchange> {
        self.recording.snapshot()
    }

    /// Type every field in order, then tick the consent box if requested.
    pub async fn populate(&mut self, data: &FormData) -> E2eResult<()> {
        self.expect_state(&[DriverState::Idle], DriverState::FieldsPopulated)?;

        for (field, value) in data.fields() {
            debug!("Typing {:?} into {}", value, field);
            self.browser
                .clear_and_type(&field.selector(), value)
                .await?;
        }
        if data.consent {
            self.browser.check(&self.form.consent_checkbox).await?;
        }

        self.state = DriverState::FieldsPopulated;
        Ok(())
    }

    /// Flip the page language between populating and submitting.
    pub async fn toggle_language(&mut self) -> E2eResult<()> {
        self.expect_state(&[DriverState::FieldsPopulated], DriverState::FieldsPopulated)?;
        browser::toggle_language(self.browser, self.form).await
    }

    /// Click the submit button `clicks` times in quick succession.
    pub async fn submit(&mut self, clicks: u32) -> E2eResult<()> {
        self.expect_state(&[DriverState::FieldsPopulated], DriverState::Submitted)?;
        if clicks == 0 {
            return Err(E2eError::Config("submit needs at least one click".to_string()));
        }

        self.browser.click(&self.form.submit, clicks).await?;
        self.state = DriverState::Submitted;
        Ok(())
    }

    /// Let traffic settle and freeze the buffer the assertions will see.
    pub async fn settle(&mut self, policy: &SettlePolicy) -> E2eResult<&[Exchange]> {
        self.expect_state(&[DriverState::Submitted], DriverState::Settled)?;

        match policy {
            SettlePolicy::Fixed(window) => {
                debug!("Observing traffic for {:?}", window);
                tokio::time::sleep(*window).await;
            }
            SettlePolicy::UntilMatch {
                predicate,
                wait,
                grace,
            } => match wait_for_match(&self.recording, predicate, wait).await {
                Some(found) => {
                    debug!("Settled on {}, grace {:?}", found, grace);
                    tokio::time::sleep(*grace).await;
                }
                None => debug!("Nothing matched {} before the timeout", predicate),
            },
        }

        self.settled = self.recording.snapshot();
        self.state = DriverState::Settled;
        info!("Settled with {} recorded POST(s)", self.settled.len());
        Ok(&self.settled)
    }

    /// Run `check` over the settled buffer. May be called repeatedly.
    pub fn assert<T, F>(&mut self, check: F) -> E2eResult<T>
    where
        F: FnOnce(&[Exchange]) -> E2eResult<T>,
    {
        self.expect_state(
            &[DriverState::Settled, DriverState::Asserted],
            DriverState::Asserted,
        )?;
        let outcome = check(&self.settled)?;
        self.state = DriverState::Asserted;
        Ok(outcome)
    }

    /// Stop recording and hand back the final buffer.
    pub fn finish(self) -> Vec<Exchange> {
        self.recorder.stop_recording(self.recording)
    }

    fn expect_state(&self, allowed: &[DriverState], to: DriverState) -> E2eResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(E2eError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            })
        }
    }
}
