//! Headless siege runner for controller testing and CI verification.
//!
//! This crate runs the siege simulation without any front end. It can be
//! controlled via JSON commands on stdin, with responses on stdout. This
//! enables:
//!
//! - **Controller testing**: An external agent can issue orders and watch
//!   enemies switch targets without a browser
//! - **CI verification**: Automated checks of game logic and determinism
//! - **Scenario validation**: Catch broken layouts before they ship
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: Commands from the controller (tick, order, status, ...)
//! - **stdout**: Responses and status snapshots (JSON)
//! - **stderr**: Debug logs (human-readable)
//!
//! See [`protocol`] module for the full command/response format.
//!
//! # Example
//!
//! ```bash
//! # Run interactively
//! echo '{"cmd":"tick","count":60}' | cargo run -p siege_headless -- run
//!
//! # Play a scenario to the end
//! cargo run -p siege_headless -- simulate --scenario scenarios/standard.ron
//!
//! # Verify determinism
//! cargo run -p siege_headless -- verify --scenario scenarios/standard.ron --runs 5
//! ```

pub mod batch;
pub mod protocol;
pub mod runner;
pub mod scenario;

pub use batch::{run_to_completion, simulate, verify_determinism, RunSummary, VerifyReport};
pub use protocol::{Command, Response};
pub use runner::{HeadlessConfig, HeadlessRunner, RunnerError};
pub use scenario::{Scenario, ScenarioError};
