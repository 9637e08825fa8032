//! Front-end bundle: the simplified boundaries GeoJSON and `boundaries.js`

use crate::error::Result;
use geojson::FeatureCollection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const BOUNDARIES_JS: &str = "boundaries.js";

/// `city_boundaries_simplified_<tolerance>.geojson`
pub fn boundaries_file_name(tolerance: f64) -> String {
    format!("city_boundaries_simplified_{}.geojson", tolerance)
}

/// Paths of the files written for the front end
#[derive(Debug, Clone)]
pub struct BundlePaths {
    pub geojson: PathBuf,
    pub script: PathBuf,
}

/// Write the boundary map and the script bundle that embeds it alongside
/// the future -> today city names mapping.
pub fn write_bundle(
    out_dir: &Path,
    tolerance: f64,
    boundaries: &BTreeMap<String, FeatureCollection>,
    today_cities: &BTreeMap<String, Vec<String>>,
) -> Result<BundlePaths> {
    fs::create_dir_all(out_dir)?;

    let geojson = out_dir.join(boundaries_file_name(tolerance));
    fs::write(&geojson, to_json(boundaries)?)?;

    let script = out_dir.join(BOUNDARIES_JS);
    fs::write(&script, render_script(boundaries, today_cities)?)?;

    tracing::info!(
        "Bundle written - boundaries={}, geojson={}, script={}",
        boundaries.len(),
        geojson.display(),
        script.display()
    );
    Ok(BundlePaths { geojson, script })
}

/// `var boundaries = {...};` followed by `var todayCities = {...};`
pub fn render_script(
    boundaries: &BTreeMap<String, FeatureCollection>,
    today_cities: &BTreeMap<String, Vec<String>>,
) -> Result<String> {
    Ok(format!(
        "var boundaries = {};\n\nvar todayCities = {};",
        to_json(boundaries)?,
        to_json(today_cities)?
    ))
}

fn to_json<T: ?Sized + Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_name_uses_tolerance() {
        assert_eq!(
            boundaries_file_name(0.005),
            "city_boundaries_simplified_0.005.geojson"
        );
        assert_eq!(
            boundaries_file_name(0.01),
            "city_boundaries_simplified_0.01.geojson"
        );
    }

    #[test]
    fn test_script_assigns_both_variables() {
        let boundaries = BTreeMap::new();
        let mut today = BTreeMap::new();
        today.insert(
            "Paris".to_string(),
            vec!["Canberra".to_string(), "Madrid".to_string(), "Rome".to_string()],
        );
        let script = render_script(&boundaries, &today).unwrap();
        assert_eq!(
            script,
            "var boundaries = {};\n\nvar todayCities = {\"Paris\":[\"Canberra\",\"Madrid\",\"Rome\"]};"
        );
    }

    #[test]
    fn test_write_bundle_creates_both_files() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("site");
        let paths = write_bundle(&out, 0.005, &BTreeMap::new(), &BTreeMap::new()).unwrap();
        assert_eq!(fs::read_to_string(&paths.geojson).unwrap(), "{}");
        assert!(
            fs::read_to_string(&paths.script)
                .unwrap()
                .starts_with("var boundaries = {};")
        );
    }
}
