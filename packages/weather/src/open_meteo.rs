//! Open-Meteo archive provider.
//!
//! Production [`HddProvider`]: resolves a postal code to approximate
//! coordinates, pulls the year's daily mean temperatures from the free
//! Open-Meteo archive API, and folds them into heating degree days
//! against the standard 18 °C base.
//!
//! Transient HTTP failures (timeouts, connection resets, 429, 5xx) are
//! retried here with exponential backoff. Callers above the
//! [`WeatherNormalizer`](crate::WeatherNormalizer) never retry — by the
//! time an error leaves this module it is worth degrading on.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{HddProvider, WeatherError, WeatherSample};

/// Base temperature for HDD calculation, °C. A day colder than this on
/// average contributes its shortfall to the year's heating demand.
const BASE_TEMPERATURE_CELSIUS: f64 = 18.0;

/// Open-Meteo historical archive endpoint (free, no API key needed).
const API_BASE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

/// Maximum retry attempts for transient HTTP errors. With exponential
/// backoff (2s, 4s, 8s) the total wait before giving up is 14 seconds.
const MAX_RETRIES: u32 = 3;

/// HDD source backed by the Open-Meteo archive API.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl Default for OpenMeteoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenMeteoProvider {
    /// Creates a provider against the public Open-Meteo archive.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    /// Creates a provider against a different endpoint (mirrors, tests).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn send_with_retry(
        &self,
        postal_code: &str,
        year: i32,
    ) -> Result<ArchiveResponse, WeatherError> {
        let (latitude, longitude) = coordinates_for(postal_code);
        let params = [
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("start_date", format!("{year}-01-01")),
            ("end_date", format!("{year}-12-31")),
            ("daily", "temperature_2m_mean".to_string()),
            ("timezone", "Europe/Berlin".to_string()),
        ];

        let mut last_error: Option<WeatherError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(1u64 << attempt); // 2s, 4s, 8s
                log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
                tokio::time::sleep(delay).await;
            }

            let result = self.client.get(&self.base_url).query(&params).send().await;

            match result {
                Err(e) => {
                    if is_transient(&e) && attempt < MAX_RETRIES {
                        log::warn!("  transient error: {e}");
                        last_error = Some(WeatherError::Http(e));
                        continue;
                    }
                    return Err(WeatherError::Http(e));
                }
                Ok(response) => {
                    let status = response.status();

                    // 429 and 5xx are worth another attempt
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error()
                    {
                        if attempt < MAX_RETRIES {
                            log::warn!("  HTTP {status}");
                            last_error =
                                Some(unavailable(postal_code, year, format!("HTTP {status}")));
                            continue;
                        }
                        return Err(unavailable(
                            postal_code,
                            year,
                            format!("HTTP {status} after {MAX_RETRIES} retries"),
                        ));
                    }

                    // Other 4xx are permanent
                    if status.is_client_error() {
                        return Err(unavailable(postal_code, year, format!("HTTP {status}")));
                    }

                    return response
                        .json::<ArchiveResponse>()
                        .await
                        .map_err(WeatherError::Http);
                }
            }
        }

        // Should be unreachable, but in case the loop exits without returning:
        Err(last_error.unwrap_or_else(|| {
            unavailable(
                postal_code,
                year,
                "request failed after all retries".to_string(),
            )
        }))
    }
}

#[async_trait]
impl HddProvider for OpenMeteoProvider {
    async fn fetch_hdd(&self, postal_code: &str, year: i32) -> Result<WeatherSample, WeatherError> {
        let response = self.send_with_retry(postal_code, year).await?;

        let Some(daily) = response.daily else {
            return Err(unavailable(
                postal_code,
                year,
                "no daily temperature series in response".to_string(),
            ));
        };

        let temperatures = daily.temperature_2m_mean;
        let known: Vec<f64> = temperatures.iter().flatten().copied().collect();
        if known.is_empty() {
            return Err(unavailable(
                postal_code,
                year,
                "temperature series is empty".to_string(),
            ));
        }

        let hdd = heating_degree_days(&temperatures);
        #[allow(clippy::cast_precision_loss)]
        let avg_temp = known.iter().sum::<f64>() / known.len() as f64;

        log::debug!("fetched HDD for {postal_code}/{year}: {hdd} (avg temp {avg_temp:.1} °C)");

        Ok(WeatherSample {
            hdd,
            avg_temp_celsius: Some(avg_temp),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: Option<DailySeries>,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    temperature_2m_mean: Vec<Option<f64>>,
}

/// Sums each day's shortfall below the base temperature. Days without a
/// reading are skipped.
fn heating_degree_days(daily_temperatures: &[Option<f64>]) -> f64 {
    let hdd: f64 = daily_temperatures
        .iter()
        .flatten()
        .filter(|temp| **temp < BASE_TEMPERATURE_CELSIUS)
        .map(|temp| BASE_TEMPERATURE_CELSIUS - temp)
        .sum();
    (hdd * 10.0).round() / 10.0
}

/// Approximate coordinates for a German postal code, keyed off the
/// leading digit's region. Good enough for year-scale HDD: weather
/// within a region is far more similar than across years.
fn coordinates_for(postal_code: &str) -> (f64, f64) {
    match postal_code.chars().next() {
        Some('0') => (51.05, 13.74),  // Dresden
        Some('1') => (52.52, 13.40),  // Berlin
        Some('2') => (53.55, 9.99),   // Hamburg
        Some('3') => (52.37, 9.73),   // Hannover
        Some('4') => (51.23, 6.78),   // Düsseldorf
        Some('5') => (50.94, 6.96),   // Cologne
        Some('6') => (50.11, 8.68),   // Frankfurt
        Some('7') => (48.78, 9.18),   // Stuttgart
        Some('8') => (48.14, 11.58),  // Munich
        Some('9') => (49.45, 11.08),  // Nuremberg
        _ => (51.16, 10.45),          // center of Germany
    }
}

fn unavailable(postal_code: &str, year: i32, message: String) -> WeatherError {
    WeatherError::Unavailable {
        postal_code: postal_code.to_string(),
        year,
        message,
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
