//! WebDriver process management - spawning and health checking chromedriver

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{BrowserError, BrowserResult};

/// Handle to a WebDriver endpoint, optionally owning the driver process
pub struct DriverHandle {
    child: Option<Child>,
    pub url: String,
}

impl DriverHandle {
    /// Spawn a local driver, or attach to `config.url` when one is configured
    pub async fn start(config: &DriverConfig) -> BrowserResult<Self> {
        match &config.url {
            Some(url) => Self::attach(url, config.startup_timeout).await,
            None => Self::spawn(config).await,
        }
    }

    /// Spawn chromedriver on a local port
    pub async fn spawn(config: &DriverConfig) -> BrowserResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let url = format!("http://127.0.0.1:{}", port);

        info!("Spawning {} on port {}", config.binary.display(), port);

        let child = Command::new(&config.binary)
            .arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                BrowserError::DriverStartup(format!(
                    "Failed to spawn {}: {}",
                    config.binary.display(),
                    e
                ))
            })?;

        let handle = DriverHandle {
            child: Some(child),
            url,
        };

        // Dropping the handle on failure kills the child
        handle.wait_for_ready(config.startup_timeout).await?;

        info!("WebDriver is ready at {}", handle.url);
        Ok(handle)
    }

    /// Use a WebDriver endpoint someone else manages (e.g. a Selenium grid)
    pub async fn attach(url: &str, timeout: Duration) -> BrowserResult<Self> {
        let handle = DriverHandle {
            child: None,
            url: url.trim_end_matches('/').to_string(),
        };
        handle.wait_for_ready(timeout).await?;
        info!("Attached to WebDriver at {}", handle.url);
        Ok(handle)
    }

    /// Wait for the driver to report `ready` on its status endpoint
    async fn wait_for_ready(&self, timeout_duration: Duration) -> BrowserResult<()> {
        let status_url = format!("{}/status", self.url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&status_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body: serde_json::Value = resp.json().await?;
                    if driver_ready(&body) {
                        return Ok(());
                    }
                    debug!("WebDriver not ready yet: {}", body);
                }
                Ok(resp) => {
                    warn!("WebDriver status returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for WebDriver to start...");
                    }
                    // Connection refused is expected while the driver boots
                    if !e.is_connect() {
                        warn!("WebDriver status error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(BrowserError::DriverHealthCheck(attempts))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop the driver if this handle spawned it
    pub fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        info!("Stopping WebDriver (pid: {})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() && exited_within(&mut child, STOP_GRACE) {
                debug!("WebDriver exited after SIGTERM");
                return;
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Longest wait for a graceful exit before the driver is killed
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Reap `child` if it exits within `grace`, checking every few milliseconds
fn exited_within(child: &mut Child, grace: Duration) -> bool {
    let start = std::time::Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if start.elapsed() < grace => std::thread::sleep(Duration::from_millis(10)),
            _ => return false,
        }
    }
}

/// `{"value": {"ready": true, ...}}` per the W3C status command
fn driver_ready(body: &serde_json::Value) -> bool {
    body.pointer("/value/ready")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Configuration for reaching a WebDriver endpoint
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Path to the chromedriver binary
    pub binary: PathBuf,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Existing WebDriver endpoint; skips spawning when set
    pub url: Option<String>,

    /// Timeout for the driver to become ready
    pub startup_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("chromedriver"),
            port: None,
            url: None,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Find a free port to use
fn find_free_port() -> std::io::Result<u16> {
    use std::net::TcpListener;

    Ok(TcpListener::bind("127.0.0.1:0")?.local_addr()?.port())
}
