use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_USER_AGENT: &str =
    "climate city analogue mapping project (contact: maintainer@example.org)";

const DEFAULT_LOG_LEVEL: &str = "city_analogues=info";

/// Main configuration structure loaded from city_analogues.toml and environment variables
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub extractor: ExtractorConfig,
    pub fetcher: FetcherConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Paths used by the similarity extractor
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub input_path: PathBuf,
    pub similar_cities_path: PathBuf,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("city-vs-future-city.csv"),
            similar_cities_path: PathBuf::from("similar_cities.csv"),
        }
    }
}

/// Boundary fetcher settings: the geocoding endpoint, throttling, simplification and output
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub requests_per_second: f64,
    pub timeout_ms: u64,
    pub tolerance: f64,
    pub cache_path: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            requests_per_second: 0.5,
            timeout_ms: 10_000,
            tolerance: 0.005,
            cache_path: PathBuf::from("city_boundaries_cache").join("boundaries.sqlite3"),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub log_level: String,
    /// Where the TOML file was read from, if any
    pub config_source: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            config_source: None,
        }
    }
}

impl RuntimeConfig {
    /// Log filter from `log_level`, falling back to the default on a bad directive
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        tracing_subscriber::EnvFilter::try_new(&self.log_level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_LEVEL))
    }

    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
            config_source: None,
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses CITY_ANALOGUES_CONFIG or falls back to ./city_analogues.toml, then the user config dir
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Same as [`Config::load`], but an explicit file path wins over the lookup chain.
    ///
    /// Not validated here; callers validate once their own overrides are applied.
    pub fn load_from(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Ok(env_path) = std::env::var("CITY_ANALOGUES_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::dotenv();
        }

        let path = match explicit {
            Some(path) if !path.exists() => {
                anyhow::bail!("config file {} not found", path.display());
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::locate_file()?,
        };

        let mut config = match &path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };

        config.runtime = RuntimeConfig::load_from_env();
        config.runtime.config_source = path;
        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Parse a TOML document; missing sections and keys keep their defaults
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn locate_file() -> anyhow::Result<Option<PathBuf>> {
        if let Ok(path) = std::env::var("CITY_ANALOGUES_CONFIG") {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "CITY_ANALOGUES_CONFIG points to {} which does not exist",
                    path.display()
                );
            }
            return Ok(Some(path));
        }

        let local = Path::new("city_analogues.toml");
        if local.exists() {
            return Ok(Some(local.to_path_buf()));
        }

        Ok(dirs::config_dir()
            .map(|dir| dir.join("city-analogues").join("config.toml"))
            .filter(|path| path.exists()))
    }

    /// Apply CA_* environment overrides (env wins over the file)
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply CA_* overrides from any variable source; unparsable numbers are rejected
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(v) = lookup("CA_INPUT") {
            self.extractor.input_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CA_SIMILAR_CITIES") {
            self.extractor.similar_cities_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CA_ENDPOINT") {
            self.fetcher.endpoint = v;
        }
        if let Some(v) = lookup("CA_USER_AGENT") {
            self.fetcher.user_agent = v;
        }
        if let Some(v) = lookup("CA_REQUESTS_PER_SECOND") {
            self.fetcher.requests_per_second = parse_number("CA_REQUESTS_PER_SECOND", &v)?;
        }
        if let Some(v) = lookup("CA_TIMEOUT_MS") {
            self.fetcher.timeout_ms = parse_number("CA_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("CA_TOLERANCE") {
            self.fetcher.tolerance = parse_number("CA_TOLERANCE", &v)?;
        }
        if let Some(v) = lookup("CA_CACHE_PATH") {
            self.fetcher.cache_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CA_OUTPUT_DIR") {
            self.fetcher.output_dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.fetcher.validate()
    }
}

fn parse_number<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", name, value, e))
}

impl FetcherConfig {
    /// Validate fetcher settings against the provider's usage policy
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.requests_per_second > 0.0 && self.requests_per_second <= 1.0) {
            anyhow::bail!(
                "requests_per_second must be in (0, 1], got {}",
                self.requests_per_second
            );
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            anyhow::bail!("tolerance must be a positive number, got {}", self.tolerance);
        }
        if self.timeout_ms == 0 {
            anyhow::bail!("timeout_ms must be > 0");
        }
        if self.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent must identify the application");
        }
        if !self.user_agent.contains('@') {
            tracing::warn!(
                "user_agent '{}' carries no contact address; the provider may block it",
                self.user_agent
            );
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            anyhow::bail!("endpoint '{}' must be an http(s) URL", self.endpoint);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fetcher.requests_per_second, 0.5);
        assert_eq!(config.fetcher.timeout_ms, 10_000);
        assert_eq!(config.fetcher.tolerance, 0.005);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [fetcher]
            tolerance = 0.01
            requests_per_second = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.fetcher.tolerance, 0.01);
        assert_eq!(config.fetcher.requests_per_second, 1.0);
        assert_eq!(config.fetcher.timeout_ms, 10_000);
        assert_eq!(
            config.extractor.similar_cities_path,
            PathBuf::from("similar_cities.csv")
        );
    }

    #[test]
    fn test_rejects_rate_above_policy() {
        let mut fetcher = FetcherConfig::default();
        fetcher.requests_per_second = 2.0;
        assert!(fetcher.validate().is_err());
        fetcher.requests_per_second = 0.0;
        assert!(fetcher.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_tolerance_and_endpoint() {
        let mut fetcher = FetcherConfig::default();
        fetcher.tolerance = -1.0;
        assert!(fetcher.validate().is_err());

        let mut fetcher = FetcherConfig::default();
        fetcher.endpoint = "ftp://example.org".to_string();
        assert!(fetcher.validate().is_err());
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_out_of_range_env_rate_can_be_corrected_before_validation() {
        let mut config = Config::default();
        config
            .apply_overrides_from(vars(&[("CA_REQUESTS_PER_SECOND", "2"), ("CA_TOLERANCE", "0.01")]))
            .unwrap();
        assert_eq!(config.fetcher.requests_per_second, 2.0);
        assert_eq!(config.fetcher.tolerance, 0.01);
        assert!(config.validate().is_err());

        config.fetcher.requests_per_second = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparsable_env_number_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides_from(vars(&[("CA_TIMEOUT_MS", "ten seconds")]))
            .unwrap_err();
        assert!(err.to_string().contains("CA_TIMEOUT_MS"));
        assert_eq!(config.fetcher.timeout_ms, 10_000);
    }

    #[test]
    fn test_log_filter_comes_from_runtime_level() {
        let runtime = RuntimeConfig {
            log_level: "city_analogues=debug".to_string(),
            config_source: None,
        };
        assert_eq!(runtime.env_filter().to_string(), "city_analogues=debug");

        let bad = RuntimeConfig {
            log_level: "city_analogues=loud".to_string(),
            config_source: None,
        };
        assert_eq!(bad.env_filter().to_string(), DEFAULT_LOG_LEVEL);
    }
}
