//! Run orchestration: login, job launch, status polling, export, and ledger

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use qarun_common::{consume_export, now_iso8601, new_run_id, Ledger, RunRecord, TerminalState};

use crate::driver::{DriverConfig, DriverHandle};
use crate::error::{BrowserError, BrowserResult};
use crate::poller::{poll_status, ActionLog, PollConfig, PollOutcome};
use crate::selectors::FilterBadge;
use crate::ui::{AppConfig, DimensionUi, IntegrationUi, UiTimeouts};
use crate::webdriver::{SessionConfig, WebDriverSession};

/// Rows per page requested before polling so the table holds the whole run
pub const RESULTS_PAGE_SIZE: u32 = 250;

/// What to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Launch a new job under a fresh run id
    New,
    /// Report on a job that was launched earlier
    Existing,
}

/// Milestones of a single run, in the order they are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    LoggedIn,
    JobStarted,
    JobLocated,
    Polling,
    Complete,
    Errored,
    TimedOut,
    Exported,
    RecordWritten,
    SessionClosed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::LoggedIn => "logged_in",
            RunPhase::JobStarted => "job_started",
            RunPhase::JobLocated => "job_located",
            RunPhase::Polling => "polling",
            RunPhase::Complete => "complete",
            RunPhase::Errored => "errored",
            RunPhase::TimedOut => "timed_out",
            RunPhase::Exported => "exported",
            RunPhase::RecordWritten => "record_written",
            RunPhase::SessionClosed => "session_closed",
        };
        f.write_str(name)
    }
}

impl From<TerminalState> for RunPhase {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Complete => RunPhase::Complete,
            TerminalState::Errored => RunPhase::Errored,
        }
    }
}

/// Result of a run that reached the ledger
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: RunRecord,
    pub phases: Vec<RunPhase>,
}

/// Post-run export handling
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory the browser downloads into
    pub download_dir: PathBuf,

    /// Name the UI gives the exported file
    pub file_name: String,

    /// Fixed wait for the download to land
    pub settle: Duration,
}

impl ExportConfig {
    pub fn export_path(&self) -> PathBuf {
        self.download_dir.join(&self.file_name)
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("data"),
            file_name: "data.csv".to_string(),
            settle: Duration::from_secs(5),
        }
    }
}

/// Everything one run needs besides the UI itself
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub poll: PollConfig,
    pub export: ExportConfig,
}

/// Trail of phases reached so far
#[derive(Debug, Default)]
struct PhaseTrail {
    phases: Vec<RunPhase>,
}

impl PhaseTrail {
    fn enter(&mut self, phase: RunPhase) {
        debug!(phase = %phase, "run phase");
        self.phases.push(phase);
    }
}

/// Drive one run against an already-open UI, closing it on every exit path.
///
/// Ctrl-C cancels the in-flight step; the session is still closed and the
/// run reports [`BrowserError::Interrupted`].
pub async fn execute<U: IntegrationUi>(
    ui: &U,
    run_id: &str,
    mode: RunMode,
    settings: &RunSettings,
    ledger: &Ledger,
) -> BrowserResult<RunOutcome> {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    execute_until(ui, run_id, mode, settings, ledger, ctrl_c).await
}

/// Like [`execute`], but cancelled when `shutdown` completes instead of on Ctrl-C
pub async fn execute_until<U, S>(
    ui: &U,
    run_id: &str,
    mode: RunMode,
    settings: &RunSettings,
    ledger: &Ledger,
    shutdown: S,
) -> BrowserResult<RunOutcome>
where
    U: IntegrationUi,
    S: Future<Output = ()>,
{
    let mut trail = PhaseTrail::default();
    trail.enter(RunPhase::Init);

    let result = tokio::select! {
        record = drive(ui, run_id, mode, settings, ledger, &mut trail) => record,
        _ = shutdown => {
            warn!(run_id, "Interrupted; closing the browser session");
            Err(BrowserError::Interrupted)
        }
    };

    if let Err(e) = &result {
        error!(run_id, "Run failed: {}", e);
    }

    match ui.close().await {
        Ok(()) => info!("Browser closed. Run {} finished.", run_id),
        Err(e) => warn!("Failed to close browser session cleanly: {}", e),
    }
    trail.enter(RunPhase::SessionClosed);

    result.map(|record| RunOutcome {
        record,
        phases: trail.phases,
    })
}

async fn drive<U: IntegrationUi>(
    ui: &U,
    run_id: &str,
    mode: RunMode,
    settings: &RunSettings,
    ledger: &Ledger,
    trail: &mut PhaseTrail,
) -> BrowserResult<RunRecord> {
    ui.login().await?;
    trail.enter(RunPhase::LoggedIn);

    match mode {
        RunMode::New => {
            ui.start_job(run_id).await?;
            trail.enter(RunPhase::JobStarted);
        }
        RunMode::Existing => {
            ui.open_job(run_id).await?;
            trail.enter(RunPhase::JobLocated);
        }
    }

    ui.set_page_size(RESULTS_PAGE_SIZE).await?;
    trail.enter(RunPhase::Polling);

    let mut actions = ActionLog::new();
    let outcome = poll_status(ui, &settings.poll, &mut actions).await?;
    debug!("{} distinct action(s) seen while polling", actions.len());

    let record = match outcome {
        PollOutcome::TimedOut => {
            trail.enter(RunPhase::TimedOut);
            error!(run_id, "Run timed out waiting for completion");

            toggle_filters(ui).await?;
            discard_export(ui, &settings.export).await?;
            trail.enter(RunPhase::Exported);

            RunRecord::timed_out(run_id)
        }
        PollOutcome::Terminal { state, status } => {
            trail.enter(state.into());
            info!(run_id, status = %status, "Run status confirmed. Performing post-run actions...");

            let total = match ui.total_actions().await? {
                Some(total) => total,
                None => {
                    warn!("Pagination summary not found; recording 0 actions");
                    0
                }
            };
            info!("Total actions: {}", total);

            toggle_filters(ui).await?;
            let items = export_items(ui, &settings.export).await?;
            trail.enter(RunPhase::Exported);

            RunRecord::new(run_id, status, total, items)
        }
    };

    ledger.append(&record)?;
    trail.enter(RunPhase::RecordWritten);
    Ok(record)
}

async fn toggle_filters<U: IntegrationUi>(ui: &U) -> BrowserResult<()> {
    for badge in FilterBadge::ALL {
        if ui.toggle_filter(badge).await? {
            info!("Toggled filter: {}", badge);
        }
    }
    Ok(())
}

async fn request_export<U: IntegrationUi>(ui: &U, config: &ExportConfig) -> BrowserResult<()> {
    info!("Exporting CSV data...");
    if !ui.request_export().await? {
        warn!("Export control not found; reading whatever is at {}", config.export_path().display());
    }
    tokio::time::sleep(config.settle).await;
    Ok(())
}

async fn export_items<U: IntegrationUi>(ui: &U, config: &ExportConfig) -> BrowserResult<Vec<qarun_common::ExtractedItem>> {
    request_export(ui, config).await?;

    info!("Processing exported CSV data...");
    let items = consume_export(&config.export_path())?;
    info!("Extracted {} item(s) from the export", items.len());
    Ok(items)
}

/// Export and clean up after a timed-out run; the record never carries items.
///
/// A missing or unreadable export is only a warning so the timeout is still recorded.
async fn discard_export<U: IntegrationUi>(ui: &U, config: &ExportConfig) -> BrowserResult<()> {
    request_export(ui, config).await?;

    let path = config.export_path();
    if !path.exists() {
        warn!("Temporary CSV file {} not found", path.display());
        return Ok(());
    }
    match consume_export(&path) {
        Ok(items) => debug!("Discarded {} item(s) exported for an unfinished run", items.len()),
        Err(e) => warn!("Export of an unfinished run could not be read: {}", e),
    }
    Ok(())
}

/// Launches the browser and runs the workflow end to end
pub struct IntegrationRunner {
    config: RunnerConfig,
}

impl IntegrationRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(&self.config.ledger_path)
    }

    /// Launch a new job and record it
    pub async fn run_new(&self) -> BrowserResult<RunOutcome> {
        let run_id = new_run_id();
        banner(&[
            "Integration Run Started".to_string(),
            format!("Timestamp: {}", now_iso8601()),
            format!("Generated Run ID: {}", run_id),
        ]);
        self.run(&run_id, RunMode::New).await
    }

    /// Record an existing job
    pub async fn report_existing(&self, run_id: &str) -> BrowserResult<RunOutcome> {
        banner(&[format!("Running report for existing Run ID: {}", run_id)]);
        self.run(run_id, RunMode::Existing).await
    }

    async fn run(&self, run_id: &str, mode: RunMode) -> BrowserResult<RunOutcome> {
        let mut session_config = self.config.session.clone();
        session_config.download_dir = absolute(&session_config.download_dir)?;

        let mut settings = self.config.settings.clone();
        settings.export.download_dir = session_config.download_dir.clone();

        // Stops the driver process when this scope ends, on every path
        let driver = DriverHandle::start(&self.config.driver).await?;
        let session = WebDriverSession::start(driver.url(), &session_config).await?;
        info!("Browser launched.");

        let ui = DimensionUi::new(session, self.config.app.clone(), self.config.timeouts.clone());
        execute(&ui, run_id, mode, &settings, &self.ledger()).await
    }
}

fn banner(lines: &[String]) {
    let rule = "=".repeat(60);
    info!("{}", rule);
    for line in lines {
        info!("{}", line);
    }
    info!("{}", rule);
}

fn absolute(path: &Path) -> BrowserResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub driver: DriverConfig,
    pub session: SessionConfig,
    pub app: AppConfig,
    pub timeouts: UiTimeouts,
    pub settings: RunSettings,
    pub ledger_path: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            session: SessionConfig::default(),
            app: AppConfig::default(),
            timeouts: UiTimeouts::default(),
            settings: RunSettings::default(),
            ledger_path: PathBuf::from(qarun_common::ledger::DEFAULT_LEDGER_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::testing::ScriptedUi;
    use qarun_common::ExtractedItem;
    use tempfile::TempDir;

    const EXPORT: &str = "Time,Type,Description\n\
                          10:00,Info,\"Step 1\nThing: 4821 created\"\n\
                          10:01,Info,No marker here\n\
                          10:02,Info,Thing: 77\n";

    fn settings(dir: &TempDir) -> RunSettings {
        RunSettings {
            poll: PollConfig {
                interval: Duration::from_millis(5),
                ceiling: Duration::from_millis(100),
            },
            export: ExportConfig {
                download_dir: dir.path().to_path_buf(),
                file_name: "data.csv".to_string(),
                settle: Duration::from_millis(5),
            },
        }
    }

    fn ledger(dir: &TempDir) -> Ledger {
        Ledger::new(dir.path().join("run_history.csv"))
    }

    #[tokio::test]
    async fn test_new_run_records_extracted_items() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let ui = ScriptedUi::new()
            .with_statuses(&[Some("Running"), Some("Complete")])
            .with_total_actions(12)
            .with_badges(&[FilterBadge::Deleted, FilterBadge::Warning])
            .with_export(settings.export.export_path(), EXPORT);

        let outcome = execute(&ui, "run-1", RunMode::New, &settings, &ledger(&dir)).await.unwrap();

        assert_eq!(outcome.record.status, "Complete");
        assert_eq!(outcome.record.action_count, 12);
        assert_eq!(
            outcome.record.items,
            vec![ExtractedItem::thing("4821"), ExtractedItem::thing("77")]
        );
        assert_eq!(
            outcome.phases,
            vec![
                RunPhase::Init,
                RunPhase::LoggedIn,
                RunPhase::JobStarted,
                RunPhase::Polling,
                RunPhase::Complete,
                RunPhase::Exported,
                RunPhase::RecordWritten,
                RunPhase::SessionClosed,
            ]
        );

        let calls = ui.calls();
        assert_eq!(calls[0], "login");
        assert_eq!(calls[1], "start_job:run-1");
        assert_eq!(calls[2], "page_size:250");
        assert!(calls.contains(&"toggle:deletedBadge".to_string()));
        assert!(!calls.contains(&"toggle:erroredBadge".to_string()));
        assert_eq!(calls.last().unwrap(), "close");

        assert!(ui.closed());
        assert!(!settings.export.export_path().exists());
        assert_eq!(ledger(&dir).latest().unwrap().unwrap(), outcome.record);
    }

    #[tokio::test]
    async fn test_existing_run_is_located_not_started() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let ui = ScriptedUi::new()
            .with_statuses(&[Some("Errored")])
            .with_total_actions(3)
            .with_export(settings.export.export_path(), "Time,Type,Description\n");

        let outcome = execute(&ui, "abc", RunMode::Existing, &settings, &ledger(&dir)).await.unwrap();

        assert_eq!(outcome.record.status, "Errored");
        assert!(outcome.record.items.is_empty());
        assert!(outcome.phases.contains(&RunPhase::JobLocated));
        assert!(outcome.phases.contains(&RunPhase::Errored));
        assert!(ui.calls().contains(&"open_job:abc".to_string()));
        assert!(!ui.calls().iter().any(|c| c.starts_with("start_job")));
    }

    #[tokio::test]
    async fn test_timeout_records_synthetic_status() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let ui = ScriptedUi::new()
            .with_statuses(&[Some("Running")])
            .with_total_actions(40)
            .with_badges(&[FilterBadge::Errored])
            .with_export(settings.export.export_path(), EXPORT);

        let outcome = execute(&ui, "slow", RunMode::New, &settings, &ledger(&dir)).await.unwrap();

        assert_eq!(outcome.record.status, "TIMEOUT");
        assert_eq!(outcome.record.action_count, 0);
        assert!(outcome.record.items.is_empty());
        assert_eq!(
            &outcome.phases[4..],
            &[
                RunPhase::TimedOut,
                RunPhase::Exported,
                RunPhase::RecordWritten,
                RunPhase::SessionClosed,
            ]
        );
        assert!(ui.calls().contains(&"toggle:erroredBadge".to_string()));
        assert!(ui.calls().contains(&"export".to_string()));
        assert!(!ui.calls().contains(&"total_actions".to_string()));
        assert!(!settings.export.export_path().exists());
        assert!(ui.closed());

        let latest = ledger(&dir).latest().unwrap().unwrap();
        assert_eq!(latest.run_id, "slow");
        assert!(latest.is_timeout());
    }

    #[tokio::test]
    async fn test_timeout_without_export_file_still_records() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let ui = ScriptedUi::new().with_statuses(&[Some("Running")]);

        let outcome = execute(&ui, "slow", RunMode::New, &settings, &ledger(&dir)).await.unwrap();

        assert!(outcome.record.is_timeout());
        assert!(outcome.phases.contains(&RunPhase::RecordWritten));
        assert!(ledger(&dir).latest().unwrap().unwrap().is_timeout());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_polling_and_closes_session() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.poll.ceiling = Duration::from_secs(30);
        let ui = ScriptedUi::new().with_statuses(&[Some("Running")]);

        let shutdown = tokio::time::sleep(Duration::from_millis(30));
        let result = execute_until(&ui, "stuck", RunMode::New, &settings, &ledger(&dir), shutdown).await;

        assert!(matches!(result, Err(BrowserError::Interrupted)));
        assert!(ui.status_reads() >= 1);
        assert!(ui.closed());
        assert_eq!(ui.calls().last().unwrap(), "close");
        assert!(ledger(&dir).latest().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ready_shutdown_still_closes_session() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let ui = ScriptedUi::new().with_statuses(&[Some("Running")]);

        let result = execute_until(&ui, "stuck", RunMode::New, &settings, &ledger(&dir), async {}).await;

        assert!(matches!(result, Err(BrowserError::Interrupted)));
        assert!(ui.closed());
        assert!(ledger(&dir).latest().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_setup_failure_closes_session_without_record() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let ui = ScriptedUi::new().failing_login();

        let result = execute(&ui, "broken", RunMode::New, &settings, &ledger(&dir)).await;

        assert!(matches!(result, Err(BrowserError::Timeout(_))));
        assert!(ui.closed());
        assert_eq!(ui.calls(), vec!["login", "close"]);
        assert!(ledger(&dir).latest().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_export_fails_after_cleanup() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let ui = ScriptedUi::new().with_statuses(&[Some("Complete")]);

        let result = execute(&ui, "no-export", RunMode::New, &settings, &ledger(&dir)).await;

        assert!(matches!(result, Err(BrowserError::Common(_))));
        assert!(ui.closed());
        assert!(ledger(&dir).latest().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_pagination_records_zero_actions() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let ui = ScriptedUi::new()
            .with_statuses(&[Some("Complete")])
            .with_export(settings.export.export_path(), EXPORT);

        let outcome = execute(&ui, "r", RunMode::New, &settings, &ledger(&dir)).await.unwrap();
        assert_eq!(outcome.record.action_count, 0);
        assert_eq!(outcome.record.items.len(), 2);
    }

    #[test]
    fn test_export_path() {
        let config = ExportConfig::default();
        assert_eq!(config.export_path(), PathBuf::from("data/data.csv"));
        assert_eq!(config.settle, Duration::from_secs(5));
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(RunPhase::RecordWritten.to_string(), "record_written");
        assert_eq!(RunPhase::from(TerminalState::Errored), RunPhase::Errored);
    }
}
