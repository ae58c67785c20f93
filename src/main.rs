use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use relink::catalog::{SearchCatalog, SpotifyCatalogBuilder, SqliteCatalog};
use relink::input::{load_tracks, save_results};
use relink::progress::{create_progress_bar, format_duration, init_tracing, log_progress, set_log_only};
use relink::report::BatchReport;
use relink::safety::validate_output_path;
use relink::{JobState, JobTracker, MatchConfig, Matcher};

const TOKEN_ENV: &str = "SPOTIFY_ACCESS_TOKEN";

#[derive(Parser)]
#[command(name = "relink")]
#[command(about = "Match local tracks against a music catalog")]
#[command(group(ArgGroup::new("source").required(true).args(["catalog", "spotify"])))]
struct Args {
    /// Music folder to scan, JSON array of {title, artist, durationMs, path}, or one file name per line
    input: PathBuf,

    /// Results file (JSON); the name must contain "matches"
    output: PathBuf,

    /// Local SQLite catalog built by build-catalog
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Search the Spotify Web API (token from SPOTIFY_ACCESS_TOKEN)
    #[arg(long)]
    spotify: bool,

    /// JSON config file; omitted sections keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Caller key the job is registered under
    #[arg(long, default_value = "cli")]
    caller: String,

    #[arg(long)]
    min_match_rate: Option<f64>,

    /// Pause between catalog searches
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Candidates requested per search
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long, default_value = "250")]
    poll_ms: u64,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long)]
    log_only: bool,
}

fn load_config(args: &Args) -> Result<MatchConfig> {
    let mut config = match &args.config {
        Some(path) => MatchConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => MatchConfig::default(),
    };
    if let Some(rate) = args.min_match_rate {
        config.threshold.min_match_rate = rate;
    }
    if let Some(delay) = args.delay_ms {
        config.search.delay_ms = delay;
    }
    if let Some(limit) = args.limit {
        config.search.limit = limit;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_catalog(args: &Args, config: &MatchConfig) -> Result<Arc<dyn SearchCatalog>> {
    if let Some(path) = &args.catalog {
        let catalog = SqliteCatalog::open(path, config.search.limit)
            .with_context(|| format!("Failed to open catalog {:?}", path))?;
        info!("Opened catalog {:?} ({} tracks)", path, catalog.track_count()?);
        return Ok(Arc::new(catalog));
    }
    let catalog = SpotifyCatalogBuilder::new()
        .access_token(std::env::var(TOKEN_ENV).ok())
        .limit(config.search.limit)
        .timeout(config.search.timeout())
        .build()
        .context("Failed to create Spotify client")?;
    Ok(Arc::new(catalog))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;
    set_log_only(args.log_only);

    let start = Instant::now();
    let config = load_config(&args)?;
    validate_output_path(&args.output, "matches", &[args.input.as_path()])?;

    let tracks = load_tracks(&args.input)
        .with_context(|| format!("Failed to read tracks from {:?}", args.input))?;
    info!("Loaded {} tracks from {:?}", tracks.len(), args.input);

    let catalog = open_catalog(&args, &config)?;
    let tracker = Arc::new(JobTracker::new(Matcher::new(catalog, Arc::new(config))));

    let started = tracker.start_match(&args.caller, tracks);
    let total = started.total as u64;
    let pb = create_progress_bar(total, "Matching");
    let log_interval = (total / 20).max(1);
    let mut last_logged = u64::MAX;

    let job = loop {
        tokio::time::sleep(Duration::from_millis(args.poll_ms)).await;
        let Some(job) = tracker.poll_match(&args.caller).job else {
            bail!("Job for {} disappeared before finishing", args.caller);
        };
        let current = job.current as u64;
        pb.set_position(current);
        if current != last_logged {
            log_progress("match", current, total, log_interval);
            last_logged = current;
        }
        if job.done {
            break job;
        }
    };
    pb.finish_with_message("Matching done");

    if job.state == JobState::Failed {
        bail!(
            "Matching failed: {}",
            job.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let results = job.results.unwrap_or_default();
    save_results(&args.output, &results)
        .with_context(|| format!("Failed to write {:?}", args.output))?;

    BatchReport::from_results(&results, job.threshold).log();
    info!(
        "Wrote {} results to {:?} in {}",
        results.len(),
        args.output,
        format_duration(start.elapsed())
    );

    Ok(())
}
