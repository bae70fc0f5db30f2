//! Signup Probe E2E harness
//!
//! Drives a real browser through the signup form and asserts on the HTTP
//! exchanges the page produces:
//! - Controls Playwright through a long-lived JSON-lines bridge
//! - Records every POST into a [`TrafficRecorder`] buffer per scenario
//! - Runs each scenario through a [`ScenarioDriver`] state machine
//! - Matches exchanges with structured predicates instead of fixed sleeps
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── probe_target()          reqwest reachability check   │
//! │    ├── SessionFactory::open()  -> Box<dyn BrowserSession>   │
//! │    ├── init_signup()           cookies + language           │
//! │    └── Scenario::run(ctx)      -> flows::*                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioDriver                                             │
//! │    Idle -> FieldsPopulated -> Submitted -> Settled          │
//! │         -> Asserted                                         │
//! │    settle(UntilMatch { predicate, wait, grace })            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  signup-probe-common                                        │
//! │    TrafficRecorder / Predicate / find_first / LocaleContext │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`TrafficRecorder`]: signup_probe_common::TrafficRecorder

pub mod browser;
pub mod config;
pub mod driver;
pub mod error;
pub mod expect;
pub mod flows;
pub mod form;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod target;

pub use browser::BrowserSession;
pub use config::HarnessConfig;
pub use driver::{DriverState, ScenarioDriver, SettlePolicy};
pub use error::{E2eError, E2eResult};
pub use form::{FormData, FormField, SignupForm};
pub use runner::{RunnerConfig, SessionFactory, TestRunner, TestSuiteResult};
pub use scenario::{Scenario, ScenarioContext, ScenarioKind};
