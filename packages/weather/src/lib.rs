#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Heating-degree-day (HDD) lookup for weather normalization.
//!
//! The detection engine asks "how much heating demand did this postal
//! code see in this year?" through [`WeatherNormalizer::get_hdd`]. The
//! normalizer caches answers, coalesces concurrent lookups for the same
//! key into one underlying fetch, and degrades to the last-known value
//! when the upstream source fails. Where the data actually comes from is
//! behind the [`HddProvider`] trait; [`open_meteo::OpenMeteoProvider`]
//! is the production implementation.

pub mod normalizer;
pub mod open_meteo;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use normalizer::WeatherNormalizer;

/// Errors that can occur while resolving weather data.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream source answered but the payload was unusable, or no
    /// cached fallback exists for a failed fetch.
    #[error("weather data unavailable for {postal_code}/{year}: {message}")]
    Unavailable {
        /// Postal code of the failed lookup.
        postal_code: String,
        /// Year of the failed lookup.
        year: i32,
        /// Description of what went wrong.
        message: String,
    },
}

/// Cache key: one postal code in one calendar year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherKey {
    /// Postal code (e.g. `"10115"`).
    pub postal_code: String,
    /// Calendar year.
    pub year: i32,
}

impl fmt::Display for WeatherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.postal_code, self.year)
    }
}

/// What a provider reports for one key: the year's heating degree days
/// and, when the source exposes it, the average temperature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSample {
    /// Heating degree days against an 18 °C base.
    pub hdd: f64,
    /// Mean daily temperature over the year, °C.
    pub avg_temp_celsius: Option<f64>,
}

/// A cached weather observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRecord {
    /// Postal code this record covers.
    pub postal_code: String,
    /// Calendar year this record covers.
    pub year: i32,
    /// Heating degree days.
    pub hdd: f64,
    /// Mean daily temperature, °C.
    pub avg_temp_celsius: Option<f64>,
    /// When the value was fetched from the provider.
    pub fetched_at: DateTime<Utc>,
}

/// The answer handed to detectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HddReading {
    /// Heating degree days.
    pub hdd: f64,
    /// Mean daily temperature, °C, when known.
    pub avg_temp_celsius: Option<f64>,
    /// `true` when this value came from an expired cache entry because
    /// a refresh fetch failed (degraded mode).
    pub stale: bool,
}

/// Source of heating-degree-day values.
///
/// Implementations perform the actual (possibly remote) lookup for one
/// key. Retry policy belongs here, not in the detectors — callers above
/// treat any error as "no weather evidence".
#[async_trait]
pub trait HddProvider: Send + Sync {
    /// Fetches the HDD sample for a postal code and year.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError`] if the value cannot be obtained.
    async fn fetch_hdd(&self, postal_code: &str, year: i32) -> Result<WeatherSample, WeatherError>;
}
