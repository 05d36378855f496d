//! Bounded waits and the job status poller

use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

use qarun_common::{terminal_state, TerminalState};

use crate::error::{BrowserError, BrowserResult};
use crate::ui::{ActionRow, IntegrationUi};

/// Re-run `probe` every `interval` until it returns true or `timeout` passes.
///
/// Probe errors abort the wait immediately.
pub async fn wait_until<F, Fut>(what: &str, timeout: Duration, interval: Duration, mut probe: F) -> BrowserResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BrowserResult<bool>>,
{
    let start = Instant::now();
    loop {
        if probe().await? {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(BrowserError::Timeout(format!("{} after {:?}", what, timeout)));
        }
        sleep(interval).await;
    }
}

/// Status polling cadence
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,

    /// Give up and record a timeout after this long
    pub ceiling: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            ceiling: Duration::from_secs(300),
        }
    }
}

/// How a status poll ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Terminal { state: TerminalState, status: String },
    TimedOut,
}

/// Logs each results-table row once per run
#[derive(Debug, Default)]
pub struct ActionLog {
    seen: HashSet<String>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log rows not seen before, returning how many were new
    pub fn observe(&mut self, rows: &[ActionRow]) -> usize {
        let mut fresh = 0;
        for row in rows {
            if self.seen.insert(row.key()) {
                fresh += 1;
                info!("[ACTION] Type: {}, Description: {}", row.kind, row.description);
            }
        }
        fresh
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Poll the status heading until it turns terminal or the ceiling passes.
///
/// Every tick also re-scrapes the results table into `log`; scrape failures
/// never influence the outcome.
pub async fn poll_status<U: IntegrationUi + ?Sized>(
    ui: &U,
    config: &PollConfig,
    log: &mut ActionLog,
) -> BrowserResult<PollOutcome> {
    info!("Waiting for the run status to reach 'Errored' or 'Complete'...");
    let start = Instant::now();

    loop {
        if start.elapsed() > config.ceiling {
            return Ok(PollOutcome::TimedOut);
        }

        let status = ui.status_text().await?;

        match ui.action_rows().await {
            Ok(rows) => {
                log.observe(&rows);
            }
            Err(e) => debug!("Results table not readable yet: {}", e),
        }

        if let Some(status) = status {
            if let Some(state) = terminal_state(&status) {
                info!(status = %status, "Run status confirmed");
                return Ok(PollOutcome::Terminal { state, status });
            }
        }

        sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::testing::ScriptedUi;

    fn row(time: &str, description: &str) -> ActionRow {
        ActionRow {
            time: time.to_string(),
            kind: "Info".to_string(),
            description: description.to_string(),
        }
    }

    fn fast() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(5),
            ceiling: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_action_log_dedups_by_time_and_description() {
        let mut log = ActionLog::new();
        assert_eq!(log.observe(&[row("10:00", "Started"), row("10:01", "Thing: 1")]), 2);
        assert_eq!(log.observe(&[row("10:00", "Started"), row("10:01", "Thing: 1")]), 0);
        // Same description at a new time is a new action
        assert_eq!(log.observe(&[row("10:02", "Started")]), 1);
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn test_wait_until_succeeds() {
        let mut calls = 0;
        wait_until("third call", Duration::from_secs(1), Duration::from_millis(1), || {
            calls += 1;
            let done = calls >= 3;
            async move { Ok::<_, BrowserError>(done) }
        })
        .await
        .unwrap();
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        let result = wait_until("never", Duration::from_millis(20), Duration::from_millis(5), || async {
            Ok::<_, BrowserError>(false)
        })
        .await;

        match result {
            Err(BrowserError::Timeout(what)) => assert!(what.starts_with("never")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_until_propagates_probe_errors() {
        let result = wait_until("broken", Duration::from_secs(1), Duration::from_millis(1), || async {
            Err::<bool, _>(BrowserError::ElementNotFound("#gone".to_string()))
        })
        .await;
        assert!(matches!(result, Err(BrowserError::ElementNotFound(_))));
    }

    #[tokio::test]
    async fn test_poll_reaches_terminal_status() {
        let ui = ScriptedUi::new()
            .with_statuses(&[None, Some("Running"), Some("Running"), Some("Run Complete")])
            .with_rows(vec![row("10:00", "Started"), row("10:01", "Thing: 4821 created")]);

        let mut log = ActionLog::new();
        let outcome = poll_status(&ui, &fast(), &mut log).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Terminal {
                state: TerminalState::Complete,
                status: "Run Complete".to_string()
            }
        );
        assert_eq!(log.len(), 2);
        assert_eq!(ui.status_reads(), 4);
    }

    #[tokio::test]
    async fn test_poll_errored_status() {
        let ui = ScriptedUi::new().with_statuses(&[Some("Errored")]);
        let outcome = poll_status(&ui, &fast(), &mut ActionLog::new()).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Terminal { state: TerminalState::Errored, .. }));
    }

    #[tokio::test]
    async fn test_poll_times_out() {
        let ui = ScriptedUi::new().with_statuses(&[Some("Running")]);
        let config = PollConfig {
            interval: Duration::from_millis(5),
            ceiling: Duration::from_millis(30),
        };

        let outcome = poll_status(&ui, &config, &mut ActionLog::new()).await.unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert!(ui.status_reads() >= 2);
    }

    #[tokio::test]
    async fn test_poll_ignores_table_scrape_failures() {
        let ui = ScriptedUi::new()
            .with_statuses(&[Some("Running"), Some("Complete")])
            .failing_rows();

        let outcome = poll_status(&ui, &fast(), &mut ActionLog::new()).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Terminal { .. }));
    }
}
