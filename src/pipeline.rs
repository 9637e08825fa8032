//! Top-level orchestration: extract analogues, then fetch boundaries.
//!
//! The cache handle and the rate-limited client are built here and handed down;
//! nothing below this module owns process-wide state.

use crate::analogues::{read_similar_cities, write_similar_cities};
use crate::bundle::{BundlePaths, write_bundle};
use crate::cache::BoundaryCache;
use crate::config::{Config, FetcherConfig};
use crate::error::{AnalogueError, Result};
use crate::extractor::{ColumnOutcome, load_matrix, rank_columns};
use crate::fetcher::{BoundaryFetcher, FetchReport};
use crate::geocoder::{Geocoder, NominatimClient};
use prettytable::{Table, row};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub columns: usize,
    pub records: usize,
    pub skipped: Vec<String>,
    /// False when there was nothing to write
    pub written: bool,
    pub output: PathBuf,
}

/// Run the similarity extractor.
/// Returns `Ok(None)` when the input matrix does not exist; nothing is written then.
pub fn run_extract(config: &Config) -> Result<Option<ExtractionSummary>> {
    let start = std::time::Instant::now();
    let input = &config.extractor.input_path;
    let output = &config.extractor.similar_cities_path;

    let matrix = match load_matrix(input) {
        Ok(matrix) => matrix,
        Err(AnalogueError::InputFileMissing { path }) => {
            warn!(
                "The specified file was not found: {}. Please check the file path.",
                path.display()
            );
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let outcomes = rank_columns(&matrix);
    let columns = outcomes.len();
    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            ColumnOutcome::Ranked(record) => records.push(record),
            ColumnOutcome::InsufficientCandidates { future_city, .. } => skipped.push(future_city),
        }
    }

    let written = !records.is_empty();
    if written {
        write_similar_cities(output, &records)?;
        info!(
            "Data processing complete - records={}, skipped={}, output={}, duration={:.2}s",
            records.len(),
            skipped.len(),
            output.display(),
            start.elapsed().as_secs_f32()
        );
    } else {
        warn!("No data to save: no future city had enough scored candidates");
    }

    Ok(Some(ExtractionSummary {
        columns,
        records: records.len(),
        skipped,
        written,
        output: output.clone(),
    }))
}

/// Outcome of a fetch run that finished
#[derive(Debug)]
pub struct FetchOutcome {
    pub report: FetchReport,
    pub bundle: BundlePaths,
}

/// Run the boundary fetcher against the live geocoding service
pub fn run_fetch(config: &Config) -> Result<FetchOutcome> {
    let cache = BoundaryCache::open(&config.fetcher.cache_path)?;
    let geocoder = NominatimClient::new(&config.fetcher)?;
    fetch_with(config, &cache, &geocoder)
}

/// Fetch with explicit dependencies. On `RateLimitExceeded` no bundle is written;
/// boundaries fetched before the refusal are already committed to `cache`.
pub fn fetch_with<G: Geocoder>(
    config: &Config,
    cache: &BoundaryCache,
    geocoder: &G,
) -> Result<FetchOutcome> {
    let start = std::time::Instant::now();
    let FetcherConfig {
        tolerance,
        output_dir,
        ..
    } = &config.fetcher;

    let records = read_similar_cities(&config.extractor.similar_cities_path)?;
    info!(
        "Loaded analogue table - future_cities={}, path={}",
        records.len(),
        config.extractor.similar_cities_path.display()
    );

    let fetcher = BoundaryFetcher::new(cache, geocoder, *tolerance);
    let report = fetcher.run(&records)?;
    let bundle = write_bundle(output_dir, *tolerance, &report.boundaries, &report.today_cities)?;

    info!(
        "Boundaries fetched and saved - duration={:.2}s",
        start.elapsed().as_secs_f32()
    );
    Ok(FetchOutcome { report, bundle })
}

/// Print the completion summary for a fetch run
pub fn print_fetch_summary(report: &FetchReport) {
    let mut table = Table::new();
    table.add_row(row!["Metric", "Count"]);
    table.add_row(row!["Total cities processed", report.processed]);
    table.add_row(row!["Cities in 2050", report.future_cities]);
    table.add_row(row!["Today city references", report.today_city_refs]);
    table.add_row(row!["Cache hits", report.cache_hits]);
    table.add_row(row!["Fetched from geocoder", report.fetched]);
    table.add_row(row!["Boundaries found", report.found()]);
    table.add_row(row!["Boundaries NOT found", report.missing.len()]);
    table.printstd();

    if !report.missing.is_empty() {
        warn!("Cities without boundary: {}", report.missing.join(", "));
    }
}

/// Print the completion summary for an extraction run
pub fn print_extract_summary(summary: &ExtractionSummary) {
    let mut table = Table::new();
    table.add_row(row!["Metric", "Count"]);
    table.add_row(row!["Future cities in matrix", summary.columns]);
    table.add_row(row!["Analogue records", summary.records]);
    table.add_row(row!["Skipped (fewer than 3 scores)", summary.skipped.len()]);
    table.printstd();
    if summary.written {
        println!("Results saved to: {}", summary.output.display());
    } else {
        println!("No data to save; nothing written.");
    }
}
