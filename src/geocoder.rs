//! Geocoding client for city boundaries (Nominatim search API)

use crate::config::FetcherConfig;
use crate::error::{AnalogueError, Result};
use crate::geometry::{is_polygonal, kind_name};
use crate::throttle::Throttle;
use geojson::Geometry;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Why a city ended up without a boundary
#[derive(Debug, Clone, PartialEq)]
pub enum NotFoundReason {
    NoResults,
    NoGeometry,
    NotPolygon { kind: String },
    HttpStatus { status: u16 },
    Malformed { message: String },
    Transport { message: String },
    EmptyAfterSimplify,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::NoResults => write!(f, "no search results"),
            NotFoundReason::NoGeometry => write!(f, "best match has no boundary geometry"),
            NotFoundReason::NotPolygon { kind } => write!(f, "best match is a {kind}, not a polygon"),
            NotFoundReason::HttpStatus { status } => write!(f, "HTTP {status}"),
            NotFoundReason::Malformed { message } => write!(f, "malformed response: {message}"),
            NotFoundReason::Transport { message } => write!(f, "request failed: {message}"),
            NotFoundReason::EmptyAfterSimplify => write!(f, "boundary vanished when simplified"),
        }
    }
}

/// Result of a single place lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Geometry),
    NotFound(NotFoundReason),
}

/// Seam between the fetcher and the network
pub trait Geocoder {
    /// Look up the boundary of `place`. `Err(RateLimitExceeded)` means the provider refused us
    /// and the run must stop; every other failure is a `Lookup::NotFound`.
    fn search(&self, place: &str) -> Result<Lookup>;
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    geojson: Option<Geometry>,
}

/// Map a raw provider response onto a lookup result
pub fn interpret_response(place: &str, status: u16, body: &str) -> Result<Lookup> {
    if status == 403 {
        error!("Geocoder refused request for '{}' (HTTP 403)", place);
        return Err(AnalogueError::RateLimitExceeded {
            city: place.to_string(),
        });
    }
    if status != 200 {
        warn!("Error fetching data for '{}': HTTP {}", place, status);
        return Ok(Lookup::NotFound(NotFoundReason::HttpStatus { status }));
    }

    let hits: Vec<SearchHit> = match serde_json::from_str(body) {
        Ok(hits) => hits,
        Err(e) => {
            warn!("Malformed geocoder response for '{}': {}", place, e);
            return Ok(Lookup::NotFound(NotFoundReason::Malformed {
                message: e.to_string(),
            }));
        }
    };

    let Some(best) = hits.into_iter().next() else {
        debug!("No search results for '{}'", place);
        return Ok(Lookup::NotFound(NotFoundReason::NoResults));
    };
    let Some(geometry) = best.geojson else {
        debug!("Best match for '{}' carries no geometry", place);
        return Ok(Lookup::NotFound(NotFoundReason::NoGeometry));
    };
    if !is_polygonal(&geometry) {
        debug!("GeoJSON for '{}' is a {}, not a polygon", place, kind_name(&geometry));
        return Ok(Lookup::NotFound(NotFoundReason::NotPolygon {
            kind: kind_name(&geometry).to_string(),
        }));
    }
    Ok(Lookup::Found(geometry))
}

/// Rate-limited blocking client for the Nominatim search endpoint
pub struct NominatimClient {
    http: Client,
    endpoint: String,
    throttle: Throttle,
}

impl NominatimClient {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            throttle: Throttle::per_second(config.requests_per_second)?,
        })
    }
}

impl Geocoder for NominatimClient {
    fn search(&self, place: &str) -> Result<Lookup> {
        self.throttle.wait();
        debug!("Querying geocoder for '{}'", place);

        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("q", place),
                ("format", "json"),
                ("polygon_geojson", "1"),
                ("limit", "1"),
            ])
            .send();

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Request for '{}' failed: {}", place, e);
                return Ok(Lookup::NotFound(NotFoundReason::Transport {
                    message: e.to_string(),
                }));
            }
        };

        let status = resp.status().as_u16();
        let body = match resp.text() {
            Ok(body) => body,
            Err(e) => {
                warn!("Reading response for '{}' failed: {}", place, e);
                return Ok(Lookup::NotFound(NotFoundReason::Transport {
                    message: e.to_string(),
                }));
            }
        };
        interpret_response(place, status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLYGON_HIT: &str = r#"[{
        "place_id": 1,
        "display_name": "Madrid, Spain",
        "geojson": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
    }]"#;

    #[test]
    fn test_polygon_is_found() {
        let lookup = interpret_response("Madrid", 200, POLYGON_HIT).unwrap();
        assert!(matches!(lookup, Lookup::Found(_)));
    }

    #[test]
    fn test_point_is_not_a_boundary() {
        let body = r#"[{"geojson": {"type": "Point", "coordinates": [2.35, 48.85]}}]"#;
        assert_eq!(
            interpret_response("Paris", 200, body).unwrap(),
            Lookup::NotFound(NotFoundReason::NotPolygon {
                kind: "Point".to_string()
            })
        );
    }

    #[test]
    fn test_empty_and_geometryless_results() {
        assert_eq!(
            interpret_response("Atlantis", 200, "[]").unwrap(),
            Lookup::NotFound(NotFoundReason::NoResults)
        );
        assert_eq!(
            interpret_response("Atlantis", 200, r#"[{"display_name": "x"}]"#).unwrap(),
            Lookup::NotFound(NotFoundReason::NoGeometry)
        );
    }

    #[test]
    fn test_forbidden_aborts() {
        let err = interpret_response("Rome", 403, "").unwrap_err();
        assert!(matches!(err, AnalogueError::RateLimitExceeded { ref city } if city == "Rome"));
    }

    #[test]
    fn test_other_status_and_garbage_are_missing() {
        assert_eq!(
            interpret_response("Rome", 503, "").unwrap(),
            Lookup::NotFound(NotFoundReason::HttpStatus { status: 503 })
        );
        assert!(matches!(
            interpret_response("Rome", 200, "<html>").unwrap(),
            Lookup::NotFound(NotFoundReason::Malformed { .. })
        ));
    }
}
