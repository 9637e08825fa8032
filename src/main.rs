use anyhow::Result;
use city_analogues::config::Config;
use city_analogues::pipeline::{print_extract_summary, print_fetch_summary, run_extract, run_fetch};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

/// Climate city analogues - present-day matches for 2050 cities, with map boundaries
#[derive(Parser, Debug)]
#[command(name = "city-analogues", version, about, long_about = None)]
struct Cli {
    /// Path to config file (overrides CITY_ANALOGUES_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank the three closest present-day cities for every future city
    Extract(ExtractArgs),
    /// Resolve, cache and bundle city boundaries from the analogue table
    Fetch(FetchArgs),
    /// Extract, then fetch
    Run {
        #[command(flatten)]
        extract: ExtractArgs,
        #[command(flatten)]
        fetch: FetchArgs,
    },
}

#[derive(Args, Debug, Default)]
struct ExtractArgs {
    /// Dissimilarity matrix CSV
    #[arg(long)]
    input: Option<PathBuf>,
    /// Analogue table written by extract and read by fetch
    #[arg(long)]
    similar_cities: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct FetchArgs {
    /// Simplification tolerance in degrees
    #[arg(long)]
    tolerance: Option<f64>,
    /// Maximum geocoder requests per second (at most 1)
    #[arg(long)]
    rate: Option<f64>,
    /// Timeout for every geocoder request, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Boundary cache file
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Directory for the GeoJSON and script bundle
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl ExtractArgs {
    fn apply(self, config: &mut Config) {
        if let Some(input) = self.input {
            config.extractor.input_path = input;
        }
        if let Some(path) = self.similar_cities {
            config.extractor.similar_cities_path = path;
        }
    }
}

impl FetchArgs {
    fn apply(self, config: &mut Config) {
        if let Some(tolerance) = self.tolerance {
            config.fetcher.tolerance = tolerance;
        }
        if let Some(rate) = self.rate {
            config.fetcher.requests_per_second = rate;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.fetcher.timeout_ms = timeout_ms;
        }
        if let Some(cache) = self.cache {
            config.fetcher.cache_path = cache;
        }
        if let Some(dir) = self.output_dir {
            config.fetcher.output_dir = dir;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load_from(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(config.runtime.env_filter())
        .with_target(false)
        .init();

    match &config.runtime.config_source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    let (extract, fetch) = match cli.command {
        Commands::Extract(args) => {
            args.apply(&mut config);
            (true, false)
        }
        Commands::Fetch(args) => {
            args.apply(&mut config);
            (false, true)
        }
        Commands::Run {
            extract: extract_args,
            fetch: fetch_args,
        } => {
            extract_args.apply(&mut config);
            fetch_args.apply(&mut config);
            (true, true)
        }
    };
    config.validate()?;

    if extract {
        match run_extract(&config)? {
            Some(summary) => {
                print_extract_summary(&summary);
                if !summary.written && fetch {
                    info!("Nothing extracted; skipping boundary fetch");
                    return Ok(());
                }
            }
            None => {
                if fetch {
                    info!("No input matrix; skipping boundary fetch");
                }
                return Ok(());
            }
        }
    }

    if fetch {
        match run_fetch(&config) {
            Ok(outcome) => {
                print_fetch_summary(&outcome.report);
                println!("Boundaries saved to {}", outcome.bundle.geojson.display());
            }
            Err(e) if e.is_fatal_for_run() => {
                error!("{}; aborting run, cached boundaries are kept", e);
                std::process::exit(2);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
