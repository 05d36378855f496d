//! qarun configuration
//!
//! Read from `qarun.toml` (or `$QARUN_CONFIG`), then overridden by the
//! `QARUN_*` environment variables. Every section is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use qarun_browser::driver::DriverConfig;
use qarun_browser::poller::PollConfig;
use qarun_browser::runner::ExportConfig;
use qarun_browser::webdriver::SessionConfig;
use qarun_browser::{AppConfig, BrowserError, BrowserResult, Credentials, RunSettings, RunnerConfig, UiTimeouts};

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "qarun.toml";

/// Where to look for the config file
pub fn config_path() -> PathBuf {
    std::env::var_os("QARUN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QarunConfig {
    pub app: AppSection,
    pub driver: DriverSection,
    pub browser: BrowserSection,
    pub timing: TimingSection,
    pub ledger: LedgerSection,
}

/// Application under test
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            base_url: AppConfig::default().base_url,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl std::fmt::Debug for AppSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSection")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// chromedriver process or remote WebDriver endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSection {
    pub binary: PathBuf,

    /// 0 picks a free port
    pub port: u16,

    /// Attach here instead of spawning a driver
    pub url: Option<String>,

    pub startup_timeout_secs: u64,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("chromedriver"),
            port: 0,
            url: None,
            startup_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub download_dir: PathBuf,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            download_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub poll_interval_secs: u64,
    pub poll_ceiling_secs: u64,

    /// Wait after clicking export before reading the file
    pub export_settle_secs: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            poll_ceiling_secs: 300,
            export_settle_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub path: PathBuf,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(qarun_common::ledger::DEFAULT_LEDGER_FILE),
        }
    }
}

impl QarunConfig {
    /// Load configuration from file, or defaults when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `QARUN_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("QARUN_BASE_URL") {
            self.app.base_url = url;
        }
        if let Some(username) = lookup("QARUN_USERNAME") {
            self.app.username = username;
        }
        if let Some(password) = lookup("QARUN_PASSWORD") {
            self.app.password = password;
        }
        if let Some(binary) = lookup("QARUN_CHROMEDRIVER") {
            self.driver.binary = PathBuf::from(binary);
        }
        if let Some(url) = lookup("QARUN_WEBDRIVER_URL") {
            self.driver.url = Some(url);
        }
    }

    /// Validate and convert into runner settings
    pub fn into_runner_config(self) -> BrowserResult<RunnerConfig> {
        if self.app.username.is_empty() || self.app.password.is_empty() {
            return Err(BrowserError::InvalidConfig(
                "app.username and app.password must be set (or QARUN_USERNAME / QARUN_PASSWORD)".to_string(),
            ));
        }
        if self.timing.poll_interval_secs == 0 {
            return Err(BrowserError::InvalidConfig("timing.poll_interval_secs must be at least 1".to_string()));
        }

        let driver = DriverConfig {
            binary: self.driver.binary,
            port: (self.driver.port != 0).then_some(self.driver.port),
            url: self.driver.url.filter(|url| !url.is_empty()),
            startup_timeout: Duration::from_secs(self.driver.startup_timeout_secs),
        };

        let session = SessionConfig {
            headless: self.browser.headless,
            window_width: self.browser.window_width,
            window_height: self.browser.window_height,
            download_dir: self.browser.download_dir.clone(),
            ..SessionConfig::default()
        };

        let settings = RunSettings {
            poll: PollConfig {
                interval: Duration::from_secs(self.timing.poll_interval_secs),
                ceiling: Duration::from_secs(self.timing.poll_ceiling_secs),
            },
            export: ExportConfig {
                download_dir: self.browser.download_dir,
                settle: Duration::from_secs(self.timing.export_settle_secs),
                ..ExportConfig::default()
            },
        };

        Ok(RunnerConfig {
            driver,
            session,
            app: AppConfig {
                base_url: self.app.base_url,
                credentials: Credentials {
                    username: self.app.username,
                    password: self.app.password,
                },
            },
            timeouts: UiTimeouts::default(),
            settings,
            ledger_path: self.ledger.path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn with_credentials() -> QarunConfig {
        let mut config = QarunConfig::default();
        config.app.username = "qa".to_string();
        config.app.password = "secret".to_string();
        config
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = QarunConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.app.base_url, "https://demo-dimension.calance.us");
        assert_eq!(config.timing.poll_ceiling_secs, 300);
        assert!(config.browser.headless);
        assert_eq!(config.ledger.path, PathBuf::from("run_history.csv"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qarun.toml");
        std::fs::write(
            &path,
            "[app]\nusername = \"qa\"\n\n[browser]\nheadless = false\n\n[timing]\npoll_ceiling_secs = 60\n",
        )
        .unwrap();

        let config = QarunConfig::load(&path).unwrap();
        assert_eq!(config.app.username, "qa");
        assert_eq!(config.app.base_url, "https://demo-dimension.calance.us");
        assert!(!config.browser.headless);
        assert_eq!(config.browser.window_width, 1920);
        assert_eq!(config.timing.poll_ceiling_secs, 60);
        assert_eq!(config.timing.poll_interval_secs, 1);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qarun.toml");
        std::fs::write(&path, "[timing\n").unwrap();
        assert!(QarunConfig::load(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("QARUN_USERNAME", "env-user"),
            ("QARUN_PASSWORD", "env-pass"),
            ("QARUN_WEBDRIVER_URL", "http://grid:4444"),
        ]
        .into_iter()
        .collect();

        let mut config = QarunConfig::default();
        config.app.username = "file-user".to_string();
        config.apply_env_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.app.username, "env-user");
        assert_eq!(config.app.password, "env-pass");
        assert_eq!(config.driver.url.as_deref(), Some("http://grid:4444"));
        assert_eq!(config.driver.binary, PathBuf::from("chromedriver"));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let result = QarunConfig::default().into_runner_config();
        assert!(matches!(result, Err(BrowserError::InvalidConfig(_))));
    }

    #[test]
    fn test_into_runner_config() {
        let mut config = with_credentials();
        config.timing.poll_ceiling_secs = 42;
        config.browser.download_dir = PathBuf::from("downloads");

        let runner = config.into_runner_config().unwrap();
        assert_eq!(runner.driver.port, None);
        assert_eq!(runner.driver.url, None);
        assert_eq!(runner.settings.poll.ceiling, Duration::from_secs(42));
        assert_eq!(runner.settings.export.export_path(), PathBuf::from("downloads/data.csv"));
        assert_eq!(runner.session.download_dir, PathBuf::from("downloads"));
        assert_eq!(runner.app.credentials.username, "qa");
    }

    #[test]
    fn test_fixed_port_is_kept() {
        let mut config = with_credentials();
        config.driver.port = 9515;
        assert_eq!(config.into_runner_config().unwrap().driver.port, Some(9515));
    }

    #[test]
    fn test_debug_hides_password() {
        let shown = format!("{:?}", with_credentials());
        assert!(!shown.contains("secret"));
    }
}
