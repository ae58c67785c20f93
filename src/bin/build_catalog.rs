//! Build a searchable SQLite catalog from a JSON track dump.
//!
//! Usage: build-catalog <dump.json|dump.jsonl> <output-catalog.sqlite3> [--workers N] [--test QUERY]
//!
//! The dump is a JSON array or JSON-lines file of
//! `{id, name, artists, durationMs, externalUrl}` records.

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use relink::catalog::sqlite::{CatalogRow, WRITE_BATCH_SIZE};
use relink::catalog::CatalogWriter;
use relink::input::load_candidates;
use relink::progress::{
    create_progress_bar, create_spinner, format_duration, init_tracing, log_progress, set_log_only,
};
use relink::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "build-catalog")]
#[command(about = "Build an FTS5 track catalog from a JSON dump")]
struct Args {
    /// Track dump (JSON array or JSON lines)
    source: PathBuf,

    /// Output SQLite database; the name must contain "catalog"
    output: PathBuf,

    /// Number of threads used to compute comparison keys (0 = all cores)
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Run a search against the finished catalog
    #[arg(long)]
    test: Option<String>,

    /// Candidates returned by --test
    #[arg(long, default_value = "5")]
    limit: usize,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long)]
    log_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;
    set_log_only(args.log_only);

    validate_output_path(&args.output, "catalog", &[args.source.as_path()])?;

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to configure worker pool")?;
    }

    let start = Instant::now();

    info!("Reading {:?}", args.source);
    let candidates = load_candidates(&args.source)
        .with_context(|| format!("Failed to read dump {:?}", args.source))?;
    let total = candidates.len();
    info!("Loaded {} tracks in {}", total, format_duration(start.elapsed()));

    let key_start = Instant::now();
    let rows: Vec<CatalogRow> = candidates
        .into_par_iter()
        .filter(|c| !c.id.trim().is_empty())
        .map(CatalogRow::from_candidate)
        .collect();
    info!(
        "Computed keys for {} tracks in {} ({} skipped without id)",
        rows.len(),
        format_duration(key_start.elapsed()),
        total - rows.len()
    );

    if args.output.exists() {
        std::fs::remove_file(&args.output)
            .with_context(|| format!("Failed to remove existing {:?}", args.output))?;
    }

    let mut writer = CatalogWriter::create(&args.output)?;
    let pb = create_progress_bar(rows.len() as u64, "Writing tracks");
    let mut inserted = 0usize;
    let mut written = 0u64;
    for chunk in rows.chunks(WRITE_BATCH_SIZE) {
        inserted += writer.write_batch(chunk)?;
        written += chunk.len() as u64;
        pb.set_position(written);
        log_progress("write", written, rows.len() as u64, WRITE_BATCH_SIZE as u64 * 10);
    }
    pb.finish_with_message("Tracks written");
    info!(
        "Inserted {} tracks ({} duplicate ids ignored)",
        inserted,
        rows.len() - inserted
    );

    let spinner = create_spinner("Building FTS index");
    let fts_start = Instant::now();
    writer.build_fts_index()?;
    spinner.finish_and_clear();
    info!("FTS index built in {}", format_duration(fts_start.elapsed()));

    let spinner = create_spinner("Optimizing database");
    writer.optimize()?;
    spinner.finish_and_clear();

    if let Ok(metadata) = std::fs::metadata(&args.output) {
        info!(
            "Catalog size: {:.2} MB",
            metadata.len() as f64 / 1024.0 / 1024.0
        );
    }

    if let Some(query) = &args.test {
        let catalog = writer.into_catalog(args.limit);
        let hits = catalog.search_blocking(query)?;
        info!("Test search {:?}: {} hits", query, hits.len());
        for hit in &hits {
            info!(
                "  {} - {} [{}] ({} ms)",
                hit.artists_joined(),
                hit.name,
                hit.id,
                hit.duration_ms
            );
        }
    }

    info!("Done in {}", format_duration(start.elapsed()));
    Ok(())
}
