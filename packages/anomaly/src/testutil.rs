//! Shared fixtures for detector and engine tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use billwatch_bill_models::{Bill, PropertyType};
use billwatch_weather::{HddProvider, WeatherError, WeatherNormalizer, WeatherSample};
use chrono::NaiveDate;

pub(crate) fn bill(id: u64, user_id: u64, year: i32, kwh: f64) -> Bill {
    Bill {
        id,
        user_id,
        year,
        consumption_kwh: kwh,
        total_cost_euros: kwh * 0.30,
        billing_start_date: NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
        billing_end_date: NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
        postal_code: "10115".to_string(),
        household_size: 3,
        property_type: PropertyType::Apartment,
        tariff_rate: 0.30,
    }
}

/// Provider with no data at all.
pub(crate) struct NoWeather;

#[async_trait]
impl HddProvider for NoWeather {
    async fn fetch_hdd(&self, postal_code: &str, year: i32) -> Result<WeatherSample, WeatherError> {
        Err(WeatherError::Unavailable {
            postal_code: postal_code.to_string(),
            year,
            message: "no data".to_string(),
        })
    }
}

/// Provider answering from a fixed year → HDD table (postal code ignored).
pub(crate) struct StaticWeather {
    by_year: HashMap<i32, f64>,
}

#[async_trait]
impl HddProvider for StaticWeather {
    async fn fetch_hdd(&self, postal_code: &str, year: i32) -> Result<WeatherSample, WeatherError> {
        self.by_year.get(&year).map_or_else(
            || {
                Err(WeatherError::Unavailable {
                    postal_code: postal_code.to_string(),
                    year,
                    message: "year not in fixture".to_string(),
                })
            },
            |hdd| {
                Ok(WeatherSample {
                    hdd: *hdd,
                    avg_temp_celsius: None,
                })
            },
        )
    }
}

pub(crate) fn no_weather() -> WeatherNormalizer {
    WeatherNormalizer::new(Arc::new(NoWeather), WeatherNormalizer::default_staleness())
}

pub(crate) fn static_weather(pairs: &[(i32, f64)]) -> WeatherNormalizer {
    let by_year = pairs.iter().copied().collect();
    WeatherNormalizer::new(
        Arc::new(StaticWeather { by_year }),
        WeatherNormalizer::default_staleness(),
    )
}
