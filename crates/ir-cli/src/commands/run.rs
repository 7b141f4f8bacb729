//! Run commands - the polling loop and single sweeps.

use anyhow::{Context, Result};
use colored::Colorize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Instrument};

use ir_connectors::InthreatConnector;
use ir_core::{DirectoryBundleSink, JsonFileStateStore, SweepDriver, SweepReport};
use ir_observability::sweep_span;

use crate::config::AppConfig;

/// Outcome of a supervised run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Sweeps started.
    pub sweeps: u64,
    /// Sweeps that ended with an error.
    pub failed: u64,
}

/// Wires the live connector, the bundle directory and the state file into a
/// sweep driver.
pub fn build_driver(config: &AppConfig) -> Result<SweepDriver> {
    let inthreat = config.inthreat_config()?;
    let connector =
        InthreatConnector::new(inthreat).context("Failed to create Inthreat connector")?;

    Ok(SweepDriver::new(
        Arc::new(connector),
        Arc::new(DirectoryBundleSink::new(&config.connector.output_dir)),
        Arc::new(JsonFileStateStore::new(&config.connector.state_path)),
        config.sweep_config(),
    ))
}

/// Sweeps until `shutdown` resolves, pausing `poll_interval` between sweeps.
///
/// Errors escaping a sweep are logged and the next sweep starts after the
/// usual pause. A sweep cut short by shutdown leaves the cursor at its last
/// committed page.
pub async fn supervise<F>(
    driver: &mut SweepDriver,
    poll_interval: Duration,
    shutdown: F,
) -> RunSummary
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut summary = RunSummary::default();

    loop {
        summary.sweeps += 1;
        let span = sweep_span!(summary.sweeps);

        tokio::select! {
            result = driver.sweep().instrument(span) => {
                if let Err(e) = result {
                    summary.failed += 1;
                    error!(sweep = summary.sweeps, error = %e, "Sweep failed, retrying after poll interval");
                }
            }
            _ = &mut shutdown => {
                info!(sweep = summary.sweeps, "Shutdown requested during sweep");
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    summary
}

/// Runs the connector until interrupted.
pub async fn run_forever(config: AppConfig) -> Result<()> {
    let mut driver = build_driver(&config)?;
    let poll_interval = config.poll_interval();

    println!(
        "{} Polling collection {} every {}s (Ctrl-C to stop)",
        "[run]".cyan(),
        config.sekoia.collection,
        poll_interval.as_secs()
    );
    println!("  {} Bundles: {}", "→".green(), config.connector.output_dir.display());
    println!("  {} State: {}", "→".green(), config.connector.state_path.display());

    let summary = supervise(&mut driver, poll_interval, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await;

    println!(
        "\n{} after {} sweep(s), {} failed",
        "Stopped".yellow(),
        summary.sweeps,
        summary.failed
    );
    Ok(())
}

/// Runs a single sweep.
pub async fn run_once(config: AppConfig) -> Result<SweepReport> {
    let mut driver = build_driver(&config)?;
    let report = driver
        .sweep()
        .instrument(sweep_span!(1_u64))
        .await
        .context("Sweep failed")?;
    Ok(report)
}

/// Prints a sweep report for humans.
pub fn print_report(report: &SweepReport) {
    println!("{}", "Sweep Summary".bold());
    println!("─────────────────────");
    println!("Pages:           {}", report.pages);
    println!("Records fetched: {}", report.records_fetched);
    println!("Records sent:    {}", report.records_sent);
    let unresolved = if report.unresolved == 0 {
        "0".green()
    } else {
        report.unresolved.to_string().yellow()
    };
    println!("Unresolved refs: {}", unresolved);
    println!("Stopped on:      {:?}", report.stop_reason);
    println!("Start cursor:    {}", report.start_cursor);
    println!("End cursor:      {}", report.end_cursor);
    println!(
        "Cache:           {} entries, {} hits, {} misses",
        report.cache.entries, report.cache.hits, report.cache.misses
    );
}

/// Machine-readable form of a sweep report.
pub fn report_json(report: &SweepReport) -> serde_json::Value {
    serde_json::json!({
        "pages": report.pages,
        "records_fetched": report.records_fetched,
        "records_sent": report.records_sent,
        "unresolved": report.unresolved,
        "stop_reason": format!("{:?}", report.stop_reason),
        "start_cursor": report.start_cursor.as_str(),
        "end_cursor": report.end_cursor.as_str(),
        "cache": {
            "entries": report.cache.entries,
            "hits": report.cache.hits,
            "misses": report.cache.misses,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ir_connectors::testing::sample_record;
    use ir_connectors::{ConnectorError, MockBehavior, MockInthreatConnector, SecureString};
    use ir_core::{MemoryBundleSink, MemoryStateStore, StateStore, SweepConfig};
    use tempfile::TempDir;

    fn mock_driver(
        mock: Arc<MockInthreatConnector>,
        sink: Arc<MemoryBundleSink>,
    ) -> SweepDriver {
        SweepDriver::new(
            mock,
            sink,
            Arc::new(MemoryStateStore::new()),
            SweepConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_sweeps_until_shutdown() {
        let mock = Arc::new(
            MockInthreatConnector::new("mock").with_collection([sample_record("indicator--1")]),
        );
        let sink = Arc::new(MemoryBundleSink::new());
        let mut driver = mock_driver(mock.clone(), sink.clone());

        let summary = supervise(
            &mut driver,
            Duration::from_secs(60),
            tokio::time::sleep(Duration::from_secs(150)),
        )
        .await;

        assert_eq!(summary, RunSummary { sweeps: 3, failed: 0 });
        // Only the first sweep had anything to deliver.
        assert_eq!(sink.bundles().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_survives_failing_sweeps() {
        let mock = Arc::new(
            MockInthreatConnector::new("mock").with_collection([sample_record("indicator--1")]),
        );
        let mut driver = SweepDriver::new(
            mock,
            Arc::new(MemoryBundleSink::failing("disk full")),
            Arc::new(MemoryStateStore::new()),
            SweepConfig::default(),
        );

        let summary = supervise(
            &mut driver,
            Duration::from_secs(60),
            tokio::time::sleep(Duration::from_secs(90)),
        )
        .await;

        assert_eq!(summary, RunSummary { sweeps: 2, failed: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_failures_do_not_count_as_failed_sweeps() {
        let mock = Arc::new(MockInthreatConnector::new("mock").with_behavior(
            MockBehavior::AlwaysFail(ConnectorError::ConnectionFailed("refused".to_string())),
        ));
        let mut driver = mock_driver(mock, Arc::new(MemoryBundleSink::new()));

        let summary = supervise(
            &mut driver,
            Duration::from_secs(60),
            tokio::time::sleep(Duration::from_secs(30)),
        )
        .await;

        assert_eq!(summary, RunSummary { sweeps: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_build_driver_requires_api_key() {
        let config = AppConfig::default();
        assert!(build_driver(&config).is_err());
    }

    #[tokio::test]
    async fn test_build_driver_uses_configured_paths() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.sekoia.api_key = Some(SecureString::from("key"));
        config.connector.state_path = dir.path().join("state.json");
        config.connector.output_dir = dir.path().join("bundles");

        let driver = build_driver(&config).unwrap();
        assert!(driver.cursor().is_none());

        let store = JsonFileStateStore::new(&config.connector.state_path);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[test]
    fn test_report_json() {
        let report = SweepReport {
            start_cursor: ir_connectors::Cursor::new("a"),
            end_cursor: ir_connectors::Cursor::new("b"),
            pages: 2,
            records_fetched: 40,
            records_sent: 45,
            unresolved: 1,
            stop_reason: ir_core::StopReason::ShortPage,
            cache: Default::default(),
        };

        let json = report_json(&report);
        assert_eq!(json["records_sent"], 45);
        assert_eq!(json["stop_reason"], "ShortPage");
        assert_eq!(json["end_cursor"], "b");
    }
}
