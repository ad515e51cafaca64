//! FAIRWAY — Golf side-bet settlement engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the round from the roster and stakes, and polls the score log,
//! recomputing skins, snake, matches and the ledger whenever it changes.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use fairway::config;
use fairway::dashboard::{self, routes::DashboardState};
use fairway::engine::{ReportCache, Round, RoundReport};
use fairway::feed::ScoreSource;
use fairway::storage::{self, JsonFileSource};
use fairway::types::RoundStatus;

const BANNER: &str = r#"
 _____ _    ___ ______        ___ __   __
|  ___/ \  |_ _|  _ \ \      / / \\ \ / /
| |_ / _ \  | || |_) \ \ /\ / / _ \\ V /
|  _/ ___ \ | ||  _ < \ V  V / ___ \| |
|_|/_/   \_\___|_| \_\ \_/\_/_/   \_\_|

  Skins · Snake · Better-ball match play
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("FAIRWAY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        round = %cfg.round.id,
        course = cfg.course.name.as_deref().unwrap_or("-"),
        holes = cfg.round.holes,
        players = cfg.players.len(),
        pairings = cfg.pairings.len(),
        snake_rule = ?cfg.snake.rule,
        skins_policy = ?cfg.skins.policy,
        "FAIRWAY starting up"
    );

    // -- Build round -----------------------------------------------------

    let round = cfg.build_round().context("Invalid round configuration")?;
    let source = JsonFileSource::new(&cfg.round.score_feed);
    let report_file = cfg.round.report_file.as_str();

    let dashboard_state = Arc::new(DashboardState::new(&cfg.round.id));
    match storage::load_report(Some(report_file)) {
        Ok(Some(saved)) if saved.round_id == cfg.round.id => {
            info!(status = %saved.status, thru = saved.holes_complete, "Resumed last report");
            dashboard_state.publish(saved).await;
        }
        Ok(Some(saved)) => {
            warn!(saved_round = %saved.round_id, "Saved report belongs to another round; ignoring");
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Could not read saved report"),
    }

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port)?;
    }

    // -- One-shot --------------------------------------------------------

    let mut cache = ReportCache::default();

    if cfg.round.poll_interval_secs == 0 {
        let report = run_cycle(&round, &source, &mut cache, report_file)
            .await?
            .context("Score log produced no report")?;
        println!("{report}");
        return Ok(());
    }

    // -- Poll loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.round.poll_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.round.poll_interval_secs,
        feed = %cfg.round.score_feed,
        "Watching score log. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_cycle(&round, &source, &mut cache, report_file).await {
                    Ok(Some(report)) => {
                        let settled = report.status == RoundStatus::Settled;
                        dashboard_state.publish(report).await;
                        if settled && !cfg.dashboard.enabled {
                            info!("Round settled. Nothing left to watch.");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, source = source.name(), "Recompute failed; keeping last report");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    if let Some(report) = cache.report() {
        info!(status = %report.status, thru = report.holes_complete, "FAIRWAY shut down cleanly.");
    }

    Ok(())
}

/// Fetch the feed and recompute when it changed since the last cycle.
///
/// Returns `None` when the feed is unchanged. A completed round is settled
/// before it is published, and every new report is persisted.
async fn run_cycle(
    round: &Round,
    source: &dyn ScoreSource,
    cache: &mut ReportCache,
    report_file: &str,
) -> Result<Option<RoundReport>> {
    let feed = source.fetch_feed().await?;
    if feed.round_id() != round.context().round_id {
        warn!(
            feed_round = feed.round_id(),
            round = %round.context().round_id,
            "Score log is for a different round; its scores will be ignored"
        );
    }

    if cache.get(&feed).is_some() {
        return Ok(None);
    }

    let mut report = round.evaluate(&feed);
    if report.status == RoundStatus::Completed {
        report = report.settle()?;
    }
    log_report(&report);

    if let Err(e) = storage::save_report(&report, Some(report_file)) {
        error!(error = %e, "Failed to save report");
    }

    cache.store(feed, report.clone());
    Ok(Some(report))
}

/// Log a human-readable round summary.
fn log_report(report: &RoundReport) {
    let skins_won = report.skins.iter().filter(|s| s.winner_id.is_some()).count();
    info!(
        round = %report.round_id,
        status = %report.status,
        thru = report.holes_complete,
        skins_won,
        snakes_final = report.snakes.iter().filter(|s| s.is_final).count(),
        matches_decided = report.matches.iter().filter(|m| m.status.is_terminal()).count() / 2,
        escrowed = %report.escrowed,
        issues = report.issues.len(),
        "Report updated"
    );
    for issue in &report.issues {
        warn!(issue = %issue, "Engine issue");
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fairway=info"));

    let json_logging = std::env::var("FAIRWAY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
