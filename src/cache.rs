//! Persistent boundary cache.
//!
//! SQLite key-value store: key = hash of the city name, value = simplified
//! GeoJSON FeatureCollection. Entries are never expired. Single writer only.

use crate::error::Result;
use geojson::FeatureCollection;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Stable cache key for a city name: NFKC, whitespace collapsed, BLAKE3 hex
pub fn city_key(name: &str) -> String {
    let normalized = name
        .nfkc()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

pub struct BoundaryCache {
    conn: Connection,
}

impl BoundaryCache {
    /// Open (or create) the cache file, creating parent directories as needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        tracing::debug!("Boundary cache opened at {}", path.display());
        Ok(Self { conn })
    }

    /// In-memory cache (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS boundaries (
                key TEXT PRIMARY KEY,
                city TEXT NOT NULL,
                collection TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<FeatureCollection>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT collection FROM boundaries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(text) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<FeatureCollection>(&text) {
            Ok(collection) => Ok(Some(collection)),
            Err(e) => {
                tracing::warn!("Ignoring corrupt cache entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM boundaries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Store a simplified boundary; committed immediately so an aborted run keeps it
    pub fn put(&self, key: &str, city: &str, collection: &FeatureCollection) -> Result<()> {
        let text = serde_json::to_string(collection)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO boundaries (key, city, collection, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![key, city, text, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM boundaries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{Feature, Geometry, Value};
    use tempfile::tempdir;

    fn square() -> FeatureCollection {
        let ring = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 1.0],
            vec![0.0, 0.0],
        ];
        FeatureCollection {
            bbox: None,
            features: vec![Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        }
    }

    #[test]
    fn test_city_key_is_stable_and_normalized() {
        assert_eq!(city_key("São Paulo"), city_key("São  Paulo "));
        // decomposed "a" + combining tilde folds to the same key
        assert_eq!(city_key("São Paulo"), city_key("Sa\u{0303}o Paulo"));
        assert_ne!(city_key("Paris"), city_key("Parish"));
        assert_eq!(city_key("Paris").len(), 64);
    }

    #[test]
    fn test_put_get_round_trip() {
        let cache = BoundaryCache::in_memory().unwrap();
        let key = city_key("Madrid");
        assert!(!cache.contains(&key).unwrap());
        assert!(cache.get(&key).unwrap().is_none());

        cache.put(&key, "Madrid", &square()).unwrap();
        assert!(cache.contains(&key).unwrap());
        assert_eq!(cache.get(&key).unwrap().unwrap(), square());
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_entries_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("boundaries.sqlite3");
        {
            let cache = BoundaryCache::open(&path).unwrap();
            cache.put(&city_key("Lisbon"), "Lisbon", &square()).unwrap();
        }
        let reopened = BoundaryCache::open(&path).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        assert!(reopened.get(&city_key("Lisbon")).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_entry_reads_as_miss_and_is_overwritten() {
        let cache = BoundaryCache::in_memory().unwrap();
        let key = city_key("Quito");
        cache
            .conn
            .execute(
                "INSERT INTO boundaries (key, city, collection, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![key, "Quito", "{not json", "2024-01-01T00:00:00Z"],
            )
            .unwrap();

        assert!(cache.contains(&key).unwrap());
        assert!(cache.get(&key).unwrap().is_none());

        cache.put(&key, "Quito", &square()).unwrap();
        assert_eq!(cache.get(&key).unwrap().unwrap(), square());
        assert_eq!(cache.len().unwrap(), 1);
    }
}
