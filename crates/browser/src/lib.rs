//! qarun browser automation
//!
//! This crate drives the integration web application through a real browser:
//! - Spawns chromedriver as a subprocess (or attaches to a running one)
//! - Speaks the W3C WebDriver protocol over HTTP
//! - Signs in, launches or locates a job, and polls it to a terminal status
//! - Exports the results CSV and appends a record to the run ledger
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  IntegrationRunner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DriverHandle::start() -> chromedriver process              │
//! │  WebDriverSession::start() -> browser session               │
//! │  DimensionUi (IntegrationUi)                                │
//! │    ├── login()                                              │
//! │    ├── start_job(run_id) | open_job(run_id)                 │
//! │    ├── set_page_size(250)                                   │
//! │    ├── status_text() / action_rows()   <- poll_status()     │
//! │    ├── total_actions()                                      │
//! │    ├── toggle_filter(badge) x3                              │
//! │    ├── request_export()                -> data/data.csv     │
//! │    └── close()                                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  consume_export() -> Ledger::append() -> run_history.csv    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod driver;
pub mod error;
pub mod poller;
pub mod runner;
pub mod selectors;
pub mod ui;
pub mod webdriver;

pub use error::{BrowserError, BrowserResult};
pub use runner::{execute, execute_until, IntegrationRunner, RunMode, RunOutcome, RunPhase, RunSettings, RunnerConfig};
pub use ui::{AppConfig, Credentials, IntegrationUi, UiTimeouts};
