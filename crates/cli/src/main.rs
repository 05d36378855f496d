//! qarun CLI - Main Entry Point
//!
//! Launches a new integration run (`--run`) or reports on an existing one
//! (`--report <RUN_ID>`), then prints the newest ledger entry.

use clap::error::ErrorKind;
use clap::{ArgGroup, Parser};
use tracing::{debug, warn};

mod config;
mod output;

use config::QarunConfig;
use qarun_browser::IntegrationRunner;

const NO_MODE_MESSAGE: &str =
    "No valid options provided. Use --run to start a new integration or --report <UUID> to report on an existing run.";

/// qarun - browser-driven integration runs
#[derive(Parser, Debug)]
#[command(name = "qarun")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").args(["run", "report"])))]
struct Cli {
    /// Run a new integration
    #[arg(long)]
    run: bool,

    /// Report on an existing integration run
    #[arg(long, value_name = "RUN_ID", value_parser = parse_run_id)]
    report: Option<String>,
}

/// Run ids are opaque, but a blank one would match any job link on the page
fn parse_run_id(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("run id must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Run,
    Report(String),
}

impl Cli {
    fn mode(&self) -> Option<Mode> {
        if self.run {
            Some(Mode::Run)
        } else {
            self.report.clone().map(Mode::Report)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let Some(mode) = cli.mode() else {
        println!("{}", NO_MODE_MESSAGE);
        std::process::exit(1);
    };

    let path = config::config_path();
    let mut config = QarunConfig::load(&path)?;
    config.apply_env();
    debug!("Loaded configuration from {}: {:?}", path.display(), config);

    let runner = IntegrationRunner::new(config.into_runner_config()?);

    let outcome = match mode {
        Mode::Run => runner.run_new().await?,
        Mode::Report(run_id) => {
            if uuid::Uuid::parse_str(&run_id).is_err() {
                warn!("Run ID '{}' is not a UUID; searching for it anyway", run_id);
            }
            runner.report_existing(&run_id).await?
        }
    };
    debug!(
        "Run {} phases: {}",
        outcome.record.run_id,
        outcome.phases.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
    );

    output::print_latest(&runner.ledger())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flag() {
        let cli = Cli::try_parse_from(["qarun", "--run"]).unwrap();
        assert_eq!(cli.mode(), Some(Mode::Run));
    }

    #[test]
    fn test_report_flag() {
        let cli = Cli::try_parse_from(["qarun", "--report", "6f1c2d4e-0000-4000-8000-000000000001"]).unwrap();
        assert_eq!(cli.mode(), Some(Mode::Report("6f1c2d4e-0000-4000-8000-000000000001".to_string())));
    }

    #[test]
    fn test_no_flag_has_no_mode() {
        let cli = Cli::try_parse_from(["qarun"]).unwrap();
        assert_eq!(cli.mode(), None);
    }

    #[test]
    fn test_flags_are_exclusive() {
        let err = Cli::try_parse_from(["qarun", "--run", "--report", "abc"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_report_needs_a_value() {
        assert!(Cli::try_parse_from(["qarun", "--report"]).is_err());
    }

    #[test]
    fn test_blank_report_id_rejected() {
        for id in ["", "   "] {
            let err = Cli::try_parse_from(["qarun", "--report", id]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_report_id_is_trimmed() {
        let cli = Cli::try_parse_from(["qarun", "--report", " abc "]).unwrap();
        assert_eq!(cli.mode(), Some(Mode::Report("abc".to_string())));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let err = Cli::try_parse_from(["qarun", "--verbose"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }
}
