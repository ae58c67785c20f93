//! Summarize a results file and optionally write a filtered copy.
//!
//! Usage: relink-report <matches.json> [--tracks tracks.json] [--min-score 0.65]
//!        [--samples 15] [--filtered matches_filtered.json] [--filter-min-score 0.60]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use relink::input::{load_results, load_tracks, save_results};
use relink::progress::init_tracing;
use relink::report::{filter_matches, unmatched_samples, BatchReport};
use relink::safety::validate_output_path;
use relink::LocalTrack;

#[derive(Parser)]
#[command(name = "relink-report")]
#[command(about = "Report on and filter relink results")]
struct Args {
    /// Results file written by relink
    results: PathBuf,

    /// Input track list, used to show the local title and artist of samples
    #[arg(long)]
    tracks: Option<PathBuf>,

    /// Representatives scoring below this are listed as problems
    #[arg(long, default_value = "0.65")]
    min_score: f64,

    /// Maximum number of problem samples to show
    #[arg(long, default_value = "15")]
    samples: usize,

    /// Write matched results with a unique catalog id here
    #[arg(long)]
    filtered: Option<PathBuf>,

    #[arg(long, default_value = "0.60")]
    filter_min_score: f64,
}

fn describe_local(tracks: &[LocalTrack], index: usize) -> String {
    match tracks.get(index) {
        Some(track) => format!("{} - {}", track.artist, track.title),
        None => format!("#{}", index),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let results = load_results(&args.results)
        .with_context(|| format!("Failed to read results {:?}", args.results))?;
    let tracks = match &args.tracks {
        Some(path) => {
            load_tracks(path).with_context(|| format!("Failed to read tracks {:?}", path))?
        }
        None => Vec::new(),
    };
    if !tracks.is_empty() && tracks.len() != results.len() {
        warn!(
            "Track list has {} entries but results have {}; samples may be mislabeled",
            tracks.len(),
            results.len()
        );
    }

    BatchReport::from_results(&results, None).log();

    let samples = unmatched_samples(&results, args.min_score, args.samples);
    if samples.is_empty() {
        info!("No representatives below {:.2}", args.min_score);
    } else {
        info!("Problem samples (score < {:.2}):", args.min_score);
        for result in samples {
            let found = match (&result.artists, &result.name) {
                (Some(artists), Some(name)) if result.matched => format!("{} - {}", artists, name),
                _ => "no match".to_string(),
            };
            info!(
                "  [{:.3}] {} => {}",
                result.score,
                describe_local(&tracks, result.input_index),
                found
            );
        }
    }

    if let Some(output) = &args.filtered {
        validate_output_path(output, "matches", &[args.results.as_path()])?;
        let (kept, summary) = filter_matches(&results, args.filter_min_score);
        save_results(output, &kept).with_context(|| format!("Failed to write {:?}", output))?;
        info!(
            "Filtered {:?}: kept {}, below {:.2}: {}, without id: {}, duplicate id: {}, duplicate placeholders: {}",
            output,
            summary.kept,
            args.filter_min_score,
            summary.rejected_by_score,
            summary.without_id,
            summary.duplicate_id,
            summary.duplicate_placeholders
        );
    }

    Ok(())
}
