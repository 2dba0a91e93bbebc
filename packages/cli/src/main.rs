#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the billwatch anomaly detection engine.
//!
//! Reads bills from a JSON file (an array of bill records), runs the
//! detection pipeline against real Open-Meteo weather data, and prints
//! verdicts. Also exposes the peer-cohort inventory and raw HDD lookups
//! for poking at the subsystems directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use billwatch_anomaly::AnomalyEngine;
use billwatch_anomaly_models::EngineConfig;
use billwatch_bill_models::Bill;
use billwatch_peer::PeerStatsService;
use billwatch_weather::open_meteo::OpenMeteoProvider;
use billwatch_weather::{WeatherKey, WeatherNormalizer};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "billwatch_cli", about = "Energy bill anomaly detection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run anomaly detection over a JSON file of bills
    Detect {
        /// Path to a JSON array of bill records
        file: PathBuf,
        /// Detect a single bill by id instead of the whole file
        #[arg(long)]
        bill_id: Option<u64>,
    },
    /// List the peer cohorts present in a JSON file of bills
    Peers {
        /// Path to a JSON array of bill records
        file: PathBuf,
        /// Only show cohorts for this year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Look up heating degree days for a postal code and year
    Hdd {
        /// Postal code (e.g. "10115")
        postal_code: String,
        /// Calendar year
        year: i32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Detect { file, bill_id } => detect(&file, bill_id).await,
        Commands::Peers { file, year } => peers(&file, year),
        Commands::Hdd { postal_code, year } => hdd(&postal_code, year).await,
    }
}

fn read_bills(path: &Path) -> Result<Vec<Bill>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let bills: Vec<Bill> = serde_json::from_str(&raw)?;
    log::info!("loaded {} bills from {}", bills.len(), path.display());
    Ok(bills)
}

fn default_normalizer() -> WeatherNormalizer {
    WeatherNormalizer::new(
        Arc::new(OpenMeteoProvider::new()),
        WeatherNormalizer::default_staleness(),
    )
}

async fn detect(file: &Path, bill_id: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let bills = read_bills(file)?;
    let normalizer = default_normalizer();

    // Warm the cache up front so the per-bill fan-out mostly hits it.
    let keys: Vec<WeatherKey> = {
        let mut keys: Vec<WeatherKey> = bills
            .iter()
            .map(|b| WeatherKey {
                postal_code: b.postal_code.clone(),
                year: b.year,
            })
            .collect();
        keys.sort_by(|a, b| (&a.postal_code, a.year).cmp(&(&b.postal_code, b.year)));
        keys.dedup();
        keys
    };
    let warmed = normalizer.prefetch(&keys).await;
    log::info!("weather cache warmed for {warmed} of {} keys", keys.len());

    let engine = AnomalyEngine::new(EngineConfig::default(), normalizer);

    if let Some(id) = bill_id {
        let Some(bill) = bills.iter().find(|b| b.id == id) else {
            return Err(format!("no bill with id {id} in {}", file.display()).into());
        };
        let result = engine.detect(bill, &bills, &bills).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let outcomes = engine.batch_detect(&bills).await;
    let mut flagged = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => {
                if result.has_anomaly {
                    flagged += 1;
                }
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            Err(err) => eprintln!("bill {}: {err}", outcome.bill_id),
        }
    }
    log::info!("{flagged} of {} bills flagged", outcomes.len());
    Ok(())
}

fn peers(file: &Path, year: Option<i32>) -> Result<(), Box<dyn std::error::Error>> {
    let bills = read_bills(file)?;
    let service = PeerStatsService::default();

    for stats in service.group_summaries(&bills) {
        if year.is_some_and(|y| y != stats.key.year) {
            continue;
        }
        println!(
            "{}: {} bills, mean {:.0} kWh, p25-p75 {:.0}-{:.0} kWh, avg cost {:.2} EUR",
            stats.key,
            stats.sample_size,
            stats.mean_kwh,
            stats.percentiles.p25,
            stats.percentiles.p75,
            stats.avg_cost_euros,
        );
    }
    Ok(())
}

async fn hdd(postal_code: &str, year: i32) -> Result<(), Box<dyn std::error::Error>> {
    let normalizer = default_normalizer();
    let reading = normalizer.get_hdd(postal_code, year).await?;
    let staleness = if reading.stale { " (stale)" } else { "" };
    match reading.avg_temp_celsius {
        Some(avg) => println!(
            "{postal_code}/{year}: {:.1} HDD{staleness}, avg temp {avg:.1} C",
            reading.hdd
        ),
        None => println!("{postal_code}/{year}: {:.1} HDD{staleness}", reading.hdd),
    }
    Ok(())
}
