//! TrackView CLI
//!
//! Fetch poll logs, resolve routes and replay them against a live backend,
//! or run the deterministic simulation scenarios.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use trackview_core::geodesy::path_length_meters;
use trackview_core::playback::{MAX_SPEED, MIN_SPEED};
use trackview_core::{
    FeedQuery, HttpLogSource, LogFeed, OsrmDirections, PlaybackConfig, PlaybackController,
    PlaybackDriver, PlaybackEvent, PlaybackStatus, Resolution, ResolvedRoute, ResolverConfig,
    RouteObserver, RouteResolver, RouteSegment, TableRow,
};
use trackview_env::{
    CancellationToken, EnvError, Fix, LatLng, PollLogResponse, TokioContext, TrackViewContext,
};
use trackview_sim::scenarios::ScenarioId;
use trackview_sim::{RouteExport, ScenarioResult, ScenarioRunner};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Feed fetch failed; carries the user-facing message
    #[error("fetch failed: {0}")]
    Feed(String),

    #[error("{0}")]
    Usage(String),
}

/// TrackView telemetry CLI
#[derive(Parser, Debug)]
#[command(name = "trackview")]
#[command(about = "Route reconstruction and playback for tracker telemetry", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Backend API base URL
    #[arg(long, global = true, env = "BACKEND_HOST", default_value = "http://localhost:8080/api")]
    backend: String,

    /// OSRM-compatible routing service base URL
    #[arg(long, global = true, env = "OSRM_URL", default_value = "https://router.project-osrm.org")]
    osrm: String,

    /// HTTP timeout in seconds
    #[arg(long, global = true, default_value = "10")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one page of poll logs
    Logs(QueryArgs),

    /// Resolve the route through a page of fixes
    Route {
        #[command(flatten)]
        query: QueryArgs,

        /// Read fixes from a JSON file instead of the backend
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Write the resolved route to a JSON file
        #[arg(long)]
        export: Option<String>,
    },

    /// Resolve, then replay the route in real time
    Playback {
        #[command(flatten)]
        query: QueryArgs,

        /// Read fixes from a JSON file instead of the backend
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Playback speed multiplier (0.1 - 3.0)
        #[arg(long, default_value = "1.0", value_parser = parse_speed)]
        speed: f64,

        /// Print every n-th frame
        #[arg(long, default_value = "10")]
        every: usize,
    },

    /// Run deterministic simulation scenarios
    Sim(SimArgs),
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Device name or part number
    #[arg(short, long, default_value = "")]
    part: String,

    /// Window start (backend timestamp format)
    #[arg(long)]
    start: Option<String>,

    /// Window end (backend timestamp format)
    #[arg(long)]
    end: Option<String>,

    #[arg(long, default_value = "100")]
    limit: u32,

    #[arg(long, default_value = "0")]
    offset: u32,
}

impl QueryArgs {
    fn to_query(&self) -> FeedQuery {
        FeedQuery {
            part: self.part.trim().to_string(),
            start: self.start.clone(),
            end: self.end.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Args, Debug)]
struct SimArgs {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (commute, flaky_router, router_outage, parked,
    /// supersede, teardown, backend_down, shuffled_page, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Fixes per generated trace
    #[arg(long, default_value = "40")]
    fixes: usize,

    /// Playback speed multiplier (0.1 - 3.0)
    #[arg(long, default_value = "1.0", value_parser = parse_speed)]
    speed: f64,

    /// Export route and frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,
}

fn parse_speed(raw: &str) -> Result<f64, String> {
    let speed: f64 = raw.parse().map_err(|e| format!("{}", e))?;
    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(speed)
    } else {
        Err(format!("speed must be between {} and {}", MIN_SPEED, MAX_SPEED))
    }
}

/// Logs each segment as it settles.
struct SegmentLogger;

impl RouteObserver for SegmentLogger {
    fn segment_resolved(&mut self, segment: &RouteSegment) {
        info!(
            index = segment.index,
            points = segment.path.len(),
            source = ?segment.source,
            "segment resolved"
        );
    }

    fn path_resolved(&mut self, path: &[LatLng]) {
        info!(points = path.len(), "path resolved");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let outcome = match &cli.command {
        Command::Logs(query) => run_logs(&cli, query).await,
        Command::Route { query, input, export } => {
            run_route(&cli, query, input.as_ref(), export.as_deref()).await
        }
        Command::Playback {
            query,
            input,
            speed,
            every,
        } => run_playback(&cli, query, input.as_ref(), *speed, *every).await,
        Command::Sim(args) => run_sim(&cli, args).await,
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

// =============================================================================
// LIVE COMMANDS
// =============================================================================

fn http_timeout(cli: &Cli) -> Duration {
    Duration::from_secs(cli.timeout)
}

async fn fetch_page(cli: &Cli, query: &QueryArgs) -> Result<Vec<Fix>, CliError> {
    let source = Arc::new(HttpLogSource::new(&cli.backend, http_timeout(cli))?);
    info!(endpoint = %source.endpoint(), "fetching poll logs");

    let mut feed = LogFeed::with_query(source, query.to_query());
    if !feed.load().await {
        let message = feed.state().error.clone().unwrap_or_default();
        return Err(CliError::Feed(message));
    }

    let page = feed.state().page();
    if page.next_offset().is_some() {
        info!(next_offset = ?page.next_offset(), "more rows available");
    }
    Ok(feed.logs().to_vec())
}

/// Accepts either a bare fix array or a full poll-log response.
fn read_fixes(path: &PathBuf) -> Result<Vec<Fix>, CliError> {
    let text = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Vec<Fix>>(&text) {
        Ok(fixes) => Ok(fixes),
        Err(_) => Ok(serde_json::from_str::<PollLogResponse>(&text)?.data),
    }
}

async fn load_fixes(cli: &Cli, query: &QueryArgs, input: Option<&PathBuf>) -> Result<Vec<Fix>, CliError> {
    match input {
        Some(path) => read_fixes(path),
        None => fetch_page(cli, query).await,
    }
}

async fn resolve(cli: &Cli, fixes: &[Fix]) -> Result<Option<ResolvedRoute>, CliError> {
    let directions = Arc::new(OsrmDirections::new(&cli.osrm, http_timeout(cli))?);
    let resolver = RouteResolver::new(TokioContext::shared(), directions, ResolverConfig::default());

    match resolver.resolve(fixes, &CancellationToken::new(), &mut SegmentLogger).await {
        Resolution::Complete(route) => Ok(Some(route)),
        Resolution::Empty => Ok(None),
        Resolution::Cancelled => Err(CliError::Usage("route resolution cancelled".to_string())),
    }
}

async fn run_logs(cli: &Cli, query: &QueryArgs) -> Result<bool, CliError> {
    let fixes = fetch_page(cli, query).await?;
    let rows: Vec<TableRow> = fixes.iter().map(TableRow::from_fix).collect();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{:<20} {:<24} {:<26} {}", "DEVICE", "BATTERY", "COORDINATES", "TIMESTAMP");
        for row in &rows {
            println!(
                "{:<20} {:<24} {:<26} {}",
                row.device, row.battery.label, row.coordinates, row.timestamp
            );
        }
        info!("{} rows", rows.len());
    }
    Ok(true)
}

async fn run_route(
    cli: &Cli,
    query: &QueryArgs,
    input: Option<&PathBuf>,
    export: Option<&str>,
) -> Result<bool, CliError> {
    let fixes = load_fixes(cli, query, input).await?;
    let Some(route) = resolve(cli, &fixes).await? else {
        warn!("fewer than two fixes more than 50 m apart, nothing to route");
        return Ok(true);
    };

    let length = path_length_meters(&route.path);

    if let Some(path) = export {
        let mut out = RouteExport::new("live", 0);
        out.rows = fixes.iter().map(TableRow::from_fix).collect();
        out.set_route(route.segments.clone(), route.path.clone());
        out.finalize(true, None);
        out.write_to_file(path)?;
        info!("Exported route to {}", path);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&route)?);
    } else {
        for segment in &route.segments {
            println!(
                "#{:<4} {:<22} {:>5} pts  {}",
                segment.index,
                format!("{:?}", segment.source),
                segment.path.len(),
                segment.color
            );
        }
        println!(
            "{} segments ({} straight-line), {} points, {:.0} m",
            route.segments.len(),
            route.degraded_count(),
            route.path.len(),
            length
        );
    }
    Ok(true)
}

async fn run_playback(
    cli: &Cli,
    query: &QueryArgs,
    input: Option<&PathBuf>,
    speed: f64,
    every: usize,
) -> Result<bool, CliError> {
    let fixes = load_fixes(cli, query, input).await?;
    let Some(route) = resolve(cli, &fixes).await? else {
        warn!("nothing to play back");
        return Ok(true);
    };

    let context = TokioContext::shared();
    let controller = std::sync::Mutex::new(PlaybackController::new(route.path));
    let start = match controller.lock() {
        Ok(mut ctl) => {
            ctl.apply(PlaybackEvent::SetSpeed(speed));
            ctl.apply(PlaybackEvent::Play { now: context.now() })
        }
        Err(_) => return Err(CliError::Usage("playback state poisoned".to_string())),
    };
    info!(points = start.path_len, speed, "playing");

    let every = every.max(1);
    let mut count = 0usize;
    let driver = PlaybackDriver::new(context, PlaybackConfig::default());
    let end = driver
        .run(&controller, |frame| {
            let last = frame.status == PlaybackStatus::Finished;
            if count % every == 0 || last {
                if let Some(p) = frame.position {
                    if cli.json {
                        if let Ok(line) = serde_json::to_string(frame) {
                            println!("{}", line);
                        }
                    } else {
                        println!(
                            "t={:>7.2}s  index={:>8.2}  {:.6}, {:.6}",
                            frame.at.as_secs_f64(),
                            frame.index,
                            p.lat,
                            p.lng
                        );
                    }
                }
            }
            count += 1;
        })
        .await;

    info!(frames = count, status = ?end.status, "playback stopped");
    Ok(end.status == PlaybackStatus::Finished)
}

// =============================================================================
// SIMULATION
// =============================================================================

async fn run_sim(cli: &Cli, args: &SimArgs) -> Result<bool, CliError> {
    if args.list {
        for scenario in ScenarioId::all() {
            println!("{:<14} {}", scenario.name(), scenario.description());
        }
        return Ok(true);
    }

    if !cli.json {
        info!("TrackView Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().map_err(|e: String| {
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            CliError::Usage(format!("{}. Available scenarios: {}, all", e, names.join(", ")))
        })?]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        return Err(CliError::Usage(
            "--export only supports a single scenario and seed".to_string(),
        ));
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_fixes(args.fixes)
            .with_speed(args.speed)
            .with_export(args.export.is_some());

        for scenario in &scenarios {
            let result = runner.run(*scenario).await;

            if !cli.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED  segments={} degraded={} frames={}",
                        scenario.name(),
                        seed,
                        result.metrics.segments,
                        result.metrics.degraded,
                        result.metrics.frames
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if let (Some(path), Some(export)) = (&args.export, &result.export) {
                export.write_to_file(path)?;
                info!("Exported {} frames to {}", export.frames.len(), path);
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if cli.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed_count == 0)
}
