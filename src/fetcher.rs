//! Boundary fetcher: resolves every referenced city to a cached, simplified boundary

use crate::analogues::{AnalogueRecord, today_cities_by_future};
use crate::cache::{BoundaryCache, city_key};
use crate::error::Result;
use crate::geocoder::{Geocoder, Lookup, NotFoundReason};
use crate::geometry::simplify_boundary;
use geojson::FeatureCollection;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Terminal state for one city
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    CacheHit(FeatureCollection),
    Fetched(FeatureCollection),
    NotFound(NotFoundReason),
}

impl Resolution {
    pub fn boundary(&self) -> Option<&FeatureCollection> {
        match self {
            Resolution::CacheHit(fc) | Resolution::Fetched(fc) => Some(fc),
            Resolution::NotFound(_) => None,
        }
    }
}

/// Totals and outputs of a completed fetch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub processed: usize,
    pub future_cities: usize,
    pub today_city_refs: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub missing: Vec<String>,
    #[serde(skip)]
    pub boundaries: BTreeMap<String, FeatureCollection>,
    #[serde(skip)]
    pub today_cities: BTreeMap<String, Vec<String>>,
}

impl FetchReport {
    pub fn found(&self) -> usize {
        self.boundaries.len()
    }
}

/// Every city named in the table, future cities and analogues alike, without repeats.
/// Order is first appearance, row by row.
pub fn collect_cities(records: &[AnalogueRecord]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut cities = Vec::new();
    for record in records {
        let names = std::iter::once(record.future_city.as_str())
            .chain(record.candidates.iter().map(|c| c.city.as_str()));
        for name in names {
            if seen.insert(name) {
                cities.push(name.to_string());
            }
        }
    }
    cities
}

/// Resolves cities through the cache first and the geocoder on a miss
pub struct BoundaryFetcher<'a, G: Geocoder> {
    cache: &'a BoundaryCache,
    geocoder: &'a G,
    tolerance: f64,
}

impl<'a, G: Geocoder> BoundaryFetcher<'a, G> {
    pub fn new(cache: &'a BoundaryCache, geocoder: &'a G, tolerance: f64) -> Self {
        Self {
            cache,
            geocoder,
            tolerance,
        }
    }

    /// Resolve one city. A `RateLimitExceeded` error must end the run.
    pub fn resolve_city(&self, city: &str) -> Result<Resolution> {
        let key = city_key(city);
        if let Some(collection) = self.cache.get(&key)? {
            debug!("Retrieving boundary for '{}' from cache", city);
            return Ok(Resolution::CacheHit(collection));
        }

        info!("'{}' not in cache, fetching boundary from geocoder", city);
        let geometry = match self.geocoder.search(city)? {
            Lookup::Found(geometry) => geometry,
            Lookup::NotFound(reason) => return Ok(Resolution::NotFound(reason)),
        };

        let collection = match simplify_boundary(&geometry, self.tolerance) {
            Ok(Some(collection)) => collection,
            Ok(None) => return Ok(Resolution::NotFound(NotFoundReason::EmptyAfterSimplify)),
            Err(e) => {
                warn!("Could not simplify boundary for '{}': {}", city, e);
                return Ok(Resolution::NotFound(NotFoundReason::Malformed {
                    message: e.to_string(),
                }));
            }
        };

        self.cache.put(&key, city, &collection)?;
        debug!("Stored boundary for '{}' in cache", city);
        Ok(Resolution::Fetched(collection))
    }

    /// Resolve every city referenced by `records`.
    /// Stops at the first rate-limit error; earlier cities are already in the cache.
    pub fn run(&self, records: &[AnalogueRecord]) -> Result<FetchReport> {
        let cities = collect_cities(records);
        let total = cities.len();
        info!("Resolving boundaries - cities={}", total);

        let mut report = FetchReport {
            future_cities: records.len(),
            today_city_refs: records.iter().map(|r| r.candidates.len()).sum(),
            today_cities: today_cities_by_future(records),
            ..Default::default()
        };

        for (idx, city) in cities.into_iter().enumerate() {
            let resolution = self.resolve_city(&city)?;
            report.processed += 1;
            match resolution {
                Resolution::CacheHit(collection) => {
                    report.cache_hits += 1;
                    report.boundaries.insert(city, collection);
                }
                Resolution::Fetched(collection) => {
                    report.fetched += 1;
                    report.boundaries.insert(city, collection);
                }
                Resolution::NotFound(reason) => {
                    warn!("Boundary data not found for '{}': {}", city, reason);
                    report.missing.push(city);
                }
            }
            if (idx + 1) % 25 == 0 {
                info!("Boundary progress - processed={}/{}", idx + 1, total);
            }
        }

        info!(
            "Boundary resolution completed - processed={}, cache_hits={}, fetched={}, missing={}",
            report.processed,
            report.cache_hits,
            report.fetched,
            report.missing.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analogues::Candidate;

    fn record(future: &str, names: [&str; 3]) -> AnalogueRecord {
        AnalogueRecord {
            future_city: future.to_string(),
            candidates: names.map(|city| Candidate {
                city: city.to_string(),
                score: 0.5,
            }),
        }
    }

    #[test]
    fn test_collect_cities_deduplicates_in_first_seen_order() {
        let records = vec![
            record("Paris", ["Canberra", "Madrid", "Rome"]),
            record("London", ["Barcelona", "Madrid", "Paris"]),
        ];
        let cities = collect_cities(&records);
        assert_eq!(
            cities,
            vec!["Paris", "Canberra", "Madrid", "Rome", "London", "Barcelona"]
        );
        let unique: HashSet<_> = cities.iter().collect();
        assert_eq!(unique.len(), cities.len());
    }

    #[test]
    fn test_collect_cities_empty() {
        assert!(collect_cities(&[]).is_empty());
    }
}
