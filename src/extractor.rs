//! Similarity extractor: top-k present-day analogues per future city
//!
//! The input matrix has one row per present-day city and one `Future_<name>` column per
//! future city. Lower scores mean more similar climates.

use crate::analogues::{ANALOGUE_COUNT, AnalogueRecord, Candidate};
use crate::error::{AnalogueError, Result};
use std::path::Path;
use tracing::{debug, info};

const FUTURE_PREFIX: &str = "Future_";

/// One future city and its score against every present-day city (row-aligned)
#[derive(Debug, Clone, PartialEq)]
pub struct FutureColumn {
    pub header: String,
    pub scores: Vec<Option<f64>>,
}

impl FutureColumn {
    /// Display name: the header without its `Future_` prefix
    pub fn city_name(&self) -> &str {
        self.header
            .strip_prefix(FUTURE_PREFIX)
            .unwrap_or(&self.header)
    }

    pub fn available(&self) -> usize {
        self.scores.iter().filter(|s| s.is_some()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DissimilarityMatrix {
    pub current_cities: Vec<String>,
    pub future_cities: Vec<FutureColumn>,
}

/// Per-column result; a skipped column is reported, not raised
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOutcome {
    Ranked(AnalogueRecord),
    InsufficientCandidates { future_city: String, available: usize },
}

impl DissimilarityMatrix {
    /// Build from parsed CSV rows. Rows without a city name are dropped, as are
    /// columns in which no cell holds a number.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let column_headers: Vec<String> = headers.into_iter().skip(1).collect();
        let mut current_cities = Vec::with_capacity(rows.len());
        let mut columns: Vec<Vec<Option<f64>>> =
            vec![Vec::with_capacity(rows.len()); column_headers.len()];

        for row in rows {
            let Some(name) = row.first().map(|s| s.trim()).filter(|s| !s.is_empty()) else {
                continue;
            };
            current_cities.push(name.to_string());
            for (idx, column) in columns.iter_mut().enumerate() {
                column.push(row.get(idx + 1).and_then(|cell| parse_score(cell)));
            }
        }

        let future_cities: Vec<FutureColumn> = column_headers
            .into_iter()
            .zip(columns)
            .map(|(header, scores)| FutureColumn {
                header: header.trim().to_string(),
                scores,
            })
            .filter(|col| {
                let keep = col.available() > 0;
                if !keep {
                    debug!("Dropping empty column '{}'", col.header);
                }
                keep
            })
            .collect();

        Self {
            current_cities,
            future_cities,
        }
    }
}

fn parse_score(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Load the dissimilarity matrix from CSV
pub fn load_matrix(path: &Path) -> Result<DissimilarityMatrix> {
    if !path.exists() {
        return Err(AnalogueError::InputFileMissing {
            path: path.to_path_buf(),
        });
    }

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    let matrix = DissimilarityMatrix::from_rows(headers, rows);
    debug!(
        "Loaded matrix - current_cities={}, future_cities={}",
        matrix.current_cities.len(),
        matrix.future_cities.len()
    );
    Ok(matrix)
}

/// Rank the `k` most similar present-day cities for one future city.
/// Missing scores are skipped; ties keep input row order.
pub fn top_k(current_cities: &[String], column: &FutureColumn, k: usize) -> Vec<Candidate> {
    let mut pairs: Vec<Candidate> = current_cities
        .iter()
        .zip(&column.scores)
        .filter_map(|(city, score)| {
            score.map(|score| Candidate {
                city: city.clone(),
                score,
            })
        })
        .collect();
    // sort_by is stable
    pairs.sort_by(|a, b| a.score.total_cmp(&b.score));
    pairs.truncate(k);
    pairs
}

/// Outcome for every future-city column, in column order
pub fn rank_columns(matrix: &DissimilarityMatrix) -> Vec<ColumnOutcome> {
    matrix
        .future_cities
        .iter()
        .map(|column| {
            let future_city = column.city_name().to_string();
            let ranked = top_k(&matrix.current_cities, column, ANALOGUE_COUNT);
            match <[Candidate; ANALOGUE_COUNT]>::try_from(ranked) {
                Ok(candidates) => ColumnOutcome::Ranked(AnalogueRecord {
                    future_city,
                    candidates,
                }),
                Err(short) => {
                    debug!(
                        "Skipping '{}' - only {} scored candidates",
                        future_city,
                        short.len()
                    );
                    ColumnOutcome::InsufficientCandidates {
                        future_city,
                        available: short.len(),
                    }
                }
            }
        })
        .collect()
}

/// Records for every column that had enough candidates
pub fn rank_analogues(matrix: &DissimilarityMatrix) -> Vec<AnalogueRecord> {
    let outcomes = rank_columns(matrix);
    let total = outcomes.len();
    let records: Vec<AnalogueRecord> = outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            ColumnOutcome::Ranked(record) => Some(record),
            ColumnOutcome::InsufficientCandidates { .. } => None,
        })
        .collect();
    info!(
        "Ranking completed - columns={}, records={}, skipped={}",
        total,
        records.len(),
        total - records.len()
    );
    records
}
