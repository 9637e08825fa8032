//! Analogue records and the `similar_cities.csv` table that links the extractor to the fetcher

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Number of present-day analogues kept per future city
pub const ANALOGUE_COUNT: usize = 3;

pub const SIMILAR_CITIES_HEADER: [&str; 7] = [
    "City in 2050",
    "Today city 1 name",
    "Today city 1 value",
    "Today city 2 name",
    "Today city 2 value",
    "Today city 3 name",
    "Today city 3 value",
];

/// A present-day city and its dissimilarity to the future city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub city: String,
    pub score: f64,
}

/// Future city with its three closest present-day analogues, ascending by score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogueRecord {
    pub future_city: String,
    pub candidates: [Candidate; ANALOGUE_COUNT],
}

impl AnalogueRecord {
    pub fn today_names(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.city.clone()).collect()
    }
}

#[derive(Debug, Deserialize)]
struct SimilarCitiesRow {
    #[serde(rename = "City in 2050")]
    future_city: String,
    #[serde(rename = "Today city 1 name")]
    name_1: String,
    #[serde(rename = "Today city 1 value")]
    value_1: f64,
    #[serde(rename = "Today city 2 name")]
    name_2: String,
    #[serde(rename = "Today city 2 value")]
    value_2: f64,
    #[serde(rename = "Today city 3 name")]
    name_3: String,
    #[serde(rename = "Today city 3 value")]
    value_3: f64,
}

impl From<SimilarCitiesRow> for AnalogueRecord {
    fn from(row: SimilarCitiesRow) -> Self {
        AnalogueRecord {
            future_city: row.future_city,
            candidates: [
                Candidate {
                    city: row.name_1,
                    score: row.value_1,
                },
                Candidate {
                    city: row.name_2,
                    score: row.value_2,
                },
                Candidate {
                    city: row.name_3,
                    score: row.value_3,
                },
            ],
        }
    }
}

/// Write the flat analogue table
pub fn write_similar_cities(path: &Path, records: &[AnalogueRecord]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(SIMILAR_CITIES_HEADER)?;
    for record in records {
        let mut row = Vec::with_capacity(SIMILAR_CITIES_HEADER.len());
        row.push(record.future_city.clone());
        for candidate in &record.candidates {
            row.push(candidate.city.clone());
            row.push(candidate.score.to_string());
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read the analogue table written by [`write_similar_cities`]
pub fn read_similar_cities(path: &Path) -> Result<Vec<AnalogueRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let row: SimilarCitiesRow = result?;
        records.push(row.into());
    }
    Ok(records)
}

/// Future city -> today city names, as embedded in the front-end bundle
pub fn today_cities_by_future(records: &[AnalogueRecord]) -> BTreeMap<String, Vec<String>> {
    records
        .iter()
        .map(|r| (r.future_city.clone(), r.today_names()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(future: &str, names: [(&str, f64); 3]) -> AnalogueRecord {
        AnalogueRecord {
            future_city: future.to_string(),
            candidates: names.map(|(city, score)| Candidate {
                city: city.to_string(),
                score,
            }),
        }
    }

    #[test]
    fn test_header_and_row_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("similar_cities.csv");
        write_similar_cities(&path, &[record("X", [("A", 1.0), ("B", 2.0), ("C", 3.0)])])
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next().unwrap(),
            "City in 2050,Today city 1 name,Today city 1 value,Today city 2 name,Today city 2 value,Today city 3 name,Today city 3 value"
        );
        assert_eq!(lines.next().unwrap(), "X,A,1,B,2,C,3");
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_names_with_commas_survive_the_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("similar_cities.csv");
        let records = vec![record(
            "Washington, D.C.",
            [("Austin", 0.4), ("Nashville, TN", 0.55), ("Memphis", 0.61)],
        )];
        write_similar_cities(&path, &records).unwrap();

        let read = read_similar_cities(&path).unwrap();
        assert_eq!(read, records);
    }

    #[test]
    fn test_today_cities_mapping_has_names_only() {
        let records = vec![
            record("Paris", [("Canberra", 0.2), ("Madrid", 0.3), ("Rome", 0.4)]),
            record("London", [("Barcelona", 0.1), ("Madrid", 0.2), ("Lisbon", 0.5)]),
        ];
        let mapping = today_cities_by_future(&records);
        assert_eq!(mapping["London"], vec!["Barcelona", "Madrid", "Lisbon"]);
        assert_eq!(mapping["Paris"], vec!["Canberra", "Madrid", "Rome"]);
    }
}
