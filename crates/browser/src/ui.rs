//! Page object for the integration web application
//!
//! [`IntegrationUi`] is the whole contract the run workflow has with the
//! external UI. [`DimensionUi`] implements it over a WebDriver session using
//! the fixed locators in [`crate::selectors`].

use std::time::Duration;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{BrowserError, BrowserResult};
use crate::poller::wait_until;
use crate::selectors::{self, FilterBadge};
use crate::webdriver::{ElementRef, Locator, WebDriverSession};

static TOTAL_ACTIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"of (\d+)").expect("total actions pattern is valid")
});

/// One row of the results table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRow {
    pub time: String,
    pub kind: String,
    pub description: String,
}

impl ActionRow {
    /// Identity of a row for logging purposes
    pub fn key(&self) -> String {
        format!("{}-{}", self.time, self.description)
    }
}

/// Operations the run workflow performs against the integration UI
#[async_trait]
pub trait IntegrationUi: Send + Sync {
    /// Open the application and sign in
    async fn login(&self) -> BrowserResult<()>;

    /// Launch a new job tagged with `run_id` and open its details page
    async fn start_job(&self, run_id: &str) -> BrowserResult<()>;

    /// Find an existing job by `run_id` and open its details page
    async fn open_job(&self, run_id: &str) -> BrowserResult<()>;

    async fn set_page_size(&self, size: u32) -> BrowserResult<()>;

    /// Current status heading text, `None` while it is not rendered
    async fn status_text(&self) -> BrowserResult<Option<String>>;

    async fn action_rows(&self) -> BrowserResult<Vec<ActionRow>>;

    /// Total from the pagination summary, `None` when it is not shown
    async fn total_actions(&self) -> BrowserResult<Option<u64>>;

    /// Click a result filter if it is on the page
    async fn toggle_filter(&self, badge: FilterBadge) -> BrowserResult<bool>;

    /// Click the CSV export control if it is on the page
    async fn request_export(&self) -> BrowserResult<bool>;

    /// Release the browser session
    async fn close(&self) -> BrowserResult<()>;
}

/// Login details for the application
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where the application lives and how to sign in
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub credentials: Credentials,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "https://demo-dimension.calance.us".to_string(),
            credentials: Credentials::default(),
        }
    }
}

/// Bounds for the setup waits
#[derive(Debug, Clone)]
pub struct UiTimeouts {
    /// Sign-in and start controls becoming enabled
    pub control_enabled: Duration,

    /// Job link showing up after launch or search
    pub job_link: Duration,

    /// Results table re-rendering after a page size change
    pub table_ready: Duration,

    pub probe_interval: Duration,
}

impl Default for UiTimeouts {
    fn default() -> Self {
        Self {
            control_enabled: Duration::from_secs(15),
            job_link: Duration::from_secs(20),
            table_ready: Duration::from_secs(30),
            probe_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Readiness {
    /// Attached and displayed
    Present,
    Enabled,
}

/// [`IntegrationUi`] over a live WebDriver session
pub struct DimensionUi {
    session: WebDriverSession,
    app: AppConfig,
    timeouts: UiTimeouts,
}

impl DimensionUi {
    pub fn new(session: WebDriverSession, app: AppConfig, timeouts: UiTimeouts) -> Self {
        Self { session, app, timeouts }
    }

    async fn probe(&self, locator: &Locator, readiness: Readiness) -> BrowserResult<bool> {
        let Some(element) = self.session.find(locator).await? else {
            return Ok(false);
        };

        let ready = match readiness {
            Readiness::Present => self.session.is_displayed(&element).await,
            Readiness::Enabled => self.session.is_enabled(&element).await,
        };

        match ready {
            Err(e) if e.is_stale_element() => Ok(false),
            other => other,
        }
    }

    /// Wait for an element to become ready and return it
    async fn wait_for(&self, what: &str, locator: &Locator, readiness: Readiness, timeout: Duration) -> BrowserResult<ElementRef> {
        wait_until(what, timeout, self.timeouts.probe_interval, || self.probe(locator, readiness)).await?;
        self.session.require(locator).await
    }

    async fn fill(&self, locator: &Locator, text: &str) -> BrowserResult<()> {
        let field = self.session.require(locator).await?;
        self.session.fill(&field, text).await
    }

    /// Click an element only if it is on the page and visible
    async fn click_if_present(&self, locator: &Locator) -> BrowserResult<bool> {
        let Some(element) = self.session.find(locator).await? else {
            return Ok(false);
        };
        if !self.session.is_displayed(&element).await? {
            return Ok(false);
        }
        self.session.click(&element).await?;
        Ok(true)
    }

    async fn open_job_link(&self, run_id: &str) -> BrowserResult<()> {
        let link = self
            .wait_for("job link", &selectors::job_link(run_id), Readiness::Present, self.timeouts.job_link)
            .await?;
        info!("Opening run {}...", run_id);
        self.session.click(&link).await
    }

    async fn read_row(&self, row: &ElementRef) -> BrowserResult<Option<ActionRow>> {
        let cells = self.session.find_all_in(row, &selectors::row_cells()).await?;
        if cells.len() < 3 {
            return Ok(None);
        }

        Ok(Some(ActionRow {
            time: self.session.text(&cells[0]).await?,
            kind: self.session.text(&cells[1]).await?,
            description: self.session.text(&cells[2]).await?,
        }))
    }
}

#[async_trait]
impl IntegrationUi for DimensionUi {
    async fn login(&self) -> BrowserResult<()> {
        info!("Navigating to the login page...");
        self.session.goto(&self.app.base_url).await?;

        info!("Attempting to log in...");
        self.fill(&selectors::user_field(), &self.app.credentials.username).await?;
        self.fill(&selectors::password_field(), &self.app.credentials.password).await?;

        let button = self
            .wait_for("sign-in button", &selectors::sign_in_button(), Readiness::Enabled, self.timeouts.control_enabled)
            .await?;
        self.session.click(&button).await
    }

    async fn start_job(&self, run_id: &str) -> BrowserResult<()> {
        info!("Navigating to the integrations page...");
        let link = self.session.require(&selectors::integrations_link()).await?;
        self.session.click(&link).await?;

        info!("Running 'Take a while and do things' integration...");
        self.fill(&selectors::identifier_field(), run_id).await?;

        let start = self
            .wait_for("start button", &selectors::start_button(), Readiness::Enabled, self.timeouts.control_enabled)
            .await?;
        self.session.click(&start).await?;

        self.open_job_link(run_id).await
    }

    async fn open_job(&self, run_id: &str) -> BrowserResult<()> {
        info!("Searching for the existing Run ID: {}...", run_id);
        self.fill(&selectors::search_field(), run_id).await?;
        self.open_job_link(run_id).await
    }

    async fn set_page_size(&self, size: u32) -> BrowserResult<()> {
        info!("Setting table page size to {}...", size);
        let select = self.session.require(&selectors::page_size_select()).await?;
        let option = self
            .session
            .find_in(&select, &selectors::page_size_option(size))
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound(format!("page size option {}", size)))?;
        self.session.click(&option).await?;

        wait_until("results table", self.timeouts.table_ready, self.timeouts.probe_interval, || async {
            Ok::<_, BrowserError>(self.session.find(&selectors::results_table()).await?.is_some())
        })
        .await?;

        info!("Page size set to {}", size);
        Ok(())
    }

    async fn status_text(&self) -> BrowserResult<Option<String>> {
        let Some(header) = self.session.find(&selectors::status_header()).await? else {
            return Ok(None);
        };
        match self.session.text(&header).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.is_stale_element() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn action_rows(&self) -> BrowserResult<Vec<ActionRow>> {
        let rows = self.session.find_all(&selectors::results_rows()).await?;
        let mut actions = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(action) = self.read_row(row).await? {
                actions.push(action);
            }
        }
        Ok(actions)
    }

    async fn total_actions(&self) -> BrowserResult<Option<u64>> {
        let Some(info) = self.session.find(&selectors::pagination_info()).await? else {
            return Ok(None);
        };
        let text = self.session.text(&info).await?;
        debug!("Pagination text: {}", text);
        Ok(parse_total_actions(&text))
    }

    async fn toggle_filter(&self, badge: FilterBadge) -> BrowserResult<bool> {
        self.click_if_present(&badge.locator()).await
    }

    async fn request_export(&self) -> BrowserResult<bool> {
        self.click_if_present(&selectors::export_button()).await
    }

    async fn close(&self) -> BrowserResult<()> {
        self.session.close().await
    }
}

/// Total from a pagination summary such as `Showing items 1-250 of 1312`
pub fn parse_total_actions(text: &str) -> Option<u64> {
    TOTAL_ACTIONS
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
