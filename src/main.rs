use anyhow::{Context, Result};
use bnbscan::airbnb::AirbnbApi;
use bnbscan::api_client::{ApiClient, ThreadSleeper};
use bnbscan::availability::{self, dataset_stats};
use bnbscan::boundary::BoundaryIndex;
use bnbscan::checkpoint::CheckpointStore;
use bnbscan::config::ScrapeConfig;
use bnbscan::export;
use bnbscan::logging::init_logging;
use bnbscan::orchestrator::ScanOrchestrator;
use bnbscan::params::{generate_scan_combinations, DateSelection};
use bnbscan::progress::{CliReporter, ProgressReporter, Reporters};
use bnbscan::run_tracker::RunTracker;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[clap(author, version, about = "bnbscan - Airbnb availability scanner per municipality")]
struct Args {
    /// JSON config file; the flags below override its values
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Municipality to scan (repeatable)
    #[clap(short, long = "municipality")]
    municipalities: Vec<String>,

    /// First day of the scan period (YYYY-MM-DD)
    #[clap(long)]
    start: Option<NaiveDate>,

    /// Last day of the scan period (YYYY-MM-DD)
    #[clap(long)]
    end: Option<NaiveDate>,

    /// Days between measurement dates
    #[clap(long)]
    interval: Option<u32>,

    /// Stay lengths in nights, comma separated
    #[clap(long, value_delimiter = ',')]
    nights: Vec<u32>,

    /// Guest counts, comma separated
    #[clap(long, value_delimiter = ',')]
    guests: Vec<u32>,

    /// Number of scans running at the same time
    #[clap(short, long)]
    workers: Option<usize>,

    /// Repeated API calls per scan
    #[clap(long)]
    repeats: Option<usize>,

    /// Run at most this many scans, leaving the rest for a resume
    #[clap(long)]
    max_tasks: Option<usize>,

    /// GeoJSON file with municipality boundaries
    #[clap(short, long)]
    boundaries: Option<PathBuf>,

    /// Directory that receives the run folder
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Continue the run stored in this run folder
    #[clap(long)]
    resume: Option<PathBuf>,

    /// Search endpoint URL
    #[clap(long)]
    endpoint: Option<String>,

    /// API key for the search endpoint (falls back to AIRBNB_API_KEY)
    #[clap(long)]
    api_key: Option<String>,

    /// Print the scan plan and exit
    #[clap(long)]
    dry_run: bool,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn apply_overrides(config: &mut ScrapeConfig, args: &Args) {
    if !args.municipalities.is_empty() {
        config.municipalities = args.municipalities.clone();
    }
    if let Some(start) = args.start {
        config.period_start = start;
    }
    if let Some(end) = args.end {
        config.period_end = end;
    }
    if let Some(days) = args.interval {
        config.dates = DateSelection::Interval { days };
    }
    if !args.nights.is_empty() {
        config.nights = args.nights.clone();
    }
    if !args.guests.is_empty() {
        config.guests = args.guests.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(repeats) = args.repeats {
        config.repeat_calls = repeats;
    }
    if args.max_tasks.is_some() {
        config.max_tasks = args.max_tasks;
    }
    if let Some(path) = &args.boundaries {
        config.boundary_file = path.clone();
    }
    if let Some(dir) = &args.output {
        config.output_dir = dir.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.airbnb.endpoint = endpoint.clone();
    }
    if let Some(key) = args.api_key.clone().or_else(|| std::env::var("AIRBNB_API_KEY").ok()) {
        config.airbnb.api_key = Some(key);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    // a resumed run reuses the config saved in its folder
    let config_path = args.config.clone().or_else(|| {
        args.resume
            .as_ref()
            .map(|dir| dir.join("config.json"))
            .filter(|path| path.exists())
    });
    let mut config = match &config_path {
        Some(path) => ScrapeConfig::load(path)?,
        None => ScrapeConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    let combinations = generate_scan_combinations(&config.plan_request())?;
    if args.dry_run {
        for combination in &combinations {
            println!("{}", combination);
        }
        println!(
            "{} combinations × {} municipalities = {} scans",
            combinations.len(),
            config.municipalities.len(),
            combinations.len() * config.municipalities.len()
        );
        return Ok(());
    }

    let boundaries = BoundaryIndex::from_geojson_file(&config.boundary_file, &config.boundary_name_property)?;
    debug!("Known municipalities: {}", boundaries.names().join(", "));

    let run_dir = match &args.resume {
        Some(dir) => dir.clone(),
        None => export::create_run_dir(&config.output_dir, &config.municipalities, Utc::now())?,
    };
    let mut saved = config.clone();
    saved.airbnb.api_key = None;
    export::write_config_json(&saved, &run_dir)?;

    let api = AirbnbApi::new(config.airbnb.clone()).context("Failed to build HTTP client")?;
    let client = ApiClient::with_sleeper(Arc::new(api), Arc::new(ThreadSleeper), config.retry_policy()?);
    info!(
        "Scanning {} municipalities via {} into {}",
        config.municipalities.len(),
        client.source_name(),
        run_dir.display()
    );
    let tracker = Arc::new(RunTracker::open(&run_dir)?);
    let reporters: Vec<Arc<dyn ProgressReporter>> = vec![Arc::new(CliReporter::new()), tracker.clone()];
    let orchestrator = ScanOrchestrator::new(client, config.orchestrator_options()?)
        .with_checkpoint(CheckpointStore::in_dir(&run_dir))
        .with_reporter(Arc::new(Reporters(reporters)));

    let outcome = match orchestrator.run(&config.municipalities, &combinations, &boundaries) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracker.fail(&e.to_string());
            return Err(e.into());
        }
    };
    let pending = outcome.summary.pending;
    let records = outcome.dataset.into_records();

    export::write_records_csv(&records, &run_dir.join("listings.csv"))?;
    let per_listing = availability::per_listing(&records, config.period_start, config.period_end);
    export::write_availability_csv(&per_listing, &run_dir.join("availability.csv"))?;
    export::write_timeline_csv(&availability::timeline(&records), &run_dir.join("timeline.csv"))?;

    let stats = dataset_stats(&records);
    println!("\n=== Summary ===");
    println!("Total records: {}", stats.records);
    println!("Unique listings: {}", stats.unique_listings);
    for (property_type, count) in &stats.per_type {
        println!("  • {}: {}", property_type, count);
    }
    if let (Some(mean), Some(min), Some(max)) = (stats.mean_price, stats.min_price, stats.max_price) {
        println!("Average price: €{:.2} (range €{:.0} - €{:.0})", mean, min, max);
    }
    println!("Saved to: {}", run_dir.display());
    if pending > 0 {
        println!("Resume with: --resume {}", run_dir.display());
    }

    Ok(())
}
