//! Error types for browser-driven runs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("WebDriver failed to start: {0}")]
    DriverStartup(String),

    #[error("WebDriver health check failed after {0} attempts")]
    DriverHealthCheck(usize),

    #[error("WebDriver error: {error} - {message}")]
    WebDriver { error: String, message: String },

    #[error("Unexpected WebDriver response: {0}")]
    Protocol(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Run interrupted")]
    Interrupted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] qarun_common::Error),
}

impl BrowserError {
    /// WebDriver's "no such element" is an expected answer for optional lookups
    pub fn is_no_such_element(&self) -> bool {
        matches!(self, BrowserError::WebDriver { error, .. } if error == "no such element")
    }

    /// The element went away between lookup and use (page re-rendered)
    pub fn is_stale_element(&self) -> bool {
        matches!(self, BrowserError::WebDriver { error, .. } if error == "stale element reference")
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;
