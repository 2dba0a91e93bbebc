//! Weather-adjusted detector: deviation from an HDD-based expectation.

use async_trait::async_trait;
use billwatch_anomaly_models::{DetectorKind, DetectorScore, ScoreInputs};
use billwatch_bill_models::Bill;

use crate::scale;
use crate::{DetectionContext, Detector};

/// Scores a bill against what the year's heating demand predicts.
///
/// Expected consumption is `kwh_per_hdd × hdd + base_load`. The two
/// coefficients come from a least-squares fit over the household's own
/// prior (HDD, consumption) pairs when at least two exist; otherwise
/// population defaults from the engine config. A cold winter then raises
/// the expectation instead of raising the alarm.
///
/// Not applicable when no HDD value can be resolved for the bill's
/// postal code and year.
pub struct WeatherAdjustedDetector;

/// Least-squares line through (HDD, kWh) pairs: `(slope, intercept)`.
///
/// `None` when the HDD values have no spread — a vertical fit predicts
/// nothing.
fn fit_line(pairs: &[(f64, f64)]) -> Option<(f64, f64)> {
    #[allow(clippy::cast_precision_loss)]
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let var_x: f64 = pairs.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if var_x.abs() < f64::EPSILON {
        return None;
    }
    let cov: f64 = pairs
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    let slope = cov / var_x;
    Some((slope, mean_y - slope * mean_x))
}

#[async_trait]
impl Detector for WeatherAdjustedDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Weather
    }

    async fn evaluate(&self, bill: &Bill, ctx: &DetectionContext<'_>) -> Option<DetectorScore> {
        let reading = match ctx.weather.get_hdd(&bill.postal_code, bill.year).await {
            Ok(reading) => reading,
            Err(err) => {
                log::warn!(
                    "bill {}: no weather data, skipping weather-adjusted check: {err}",
                    bill.id
                );
                return None;
            }
        };

        // Pair each prior year's consumption with its HDD. Years whose
        // weather cannot be resolved just drop out of the fit.
        let mut pairs: Vec<(f64, f64)> = Vec::new();
        for prior in ctx
            .history
            .iter()
            .filter(|b| b.user_id == bill.user_id && b.year < bill.year)
        {
            match ctx.weather.get_hdd(&prior.postal_code, prior.year).await {
                Ok(prior_reading) => pairs.push((prior_reading.hdd, prior.consumption_kwh)),
                Err(err) => {
                    log::debug!("no HDD for {}/{}: {err}", prior.postal_code, prior.year);
                }
            }
        }

        let fit = if pairs.len() >= 2 {
            fit_line(&pairs)
        } else {
            None
        };
        let fitted = fit.is_some();
        let (kwh_per_hdd, base_load) = fit.unwrap_or((
            ctx.config.default_kwh_per_hdd,
            ctx.config.default_base_load_kwh,
        ));

        let predicted = kwh_per_hdd * reading.hdd + base_load;
        if !predicted.is_finite() || predicted <= 0.0 {
            log::debug!(
                "bill {}: degenerate weather prediction ({predicted} kWh), skipping",
                bill.id
            );
            return None;
        }

        let deviation_percent = (bill.consumption_kwh - predicted) / predicted * 100.0;
        let score = scale::round2(scale::deviation_score(deviation_percent));

        let direction = if deviation_percent >= 0.0 {
            "higher"
        } else {
            "lower"
        };
        let profile = if fitted {
            "your own heating profile"
        } else {
            "a typical household profile"
        };
        let mut explanation = format!(
            "After adjusting for weather ({:.0} heating degree days), consumption of {:.0} kWh is {:.1}% {direction} than the expected {:.0} kWh from {profile}.",
            reading.hdd,
            bill.consumption_kwh,
            deviation_percent.abs(),
            predicted,
        );
        if reading.stale {
            explanation.push_str(" Weather data comes from an older cached fetch.");
        }

        Some(DetectorScore {
            detector: DetectorKind::Weather,
            score,
            explanation,
            inputs: ScoreInputs {
                actual_kwh: bill.consumption_kwh,
                reference_kwh: scale::round2(predicted),
                deviation_percent,
                z_score: None,
                percentile_band: None,
                sample_size: None,
                hdd: Some(reading.hdd),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use billwatch_anomaly_models::EngineConfig;
    use billwatch_peer::PeerStatsService;
    use billwatch_weather::WeatherNormalizer;

    use super::*;
    use crate::testutil;

    async fn evaluate(
        bill: &Bill,
        history: &[Bill],
        weather: &WeatherNormalizer,
    ) -> Option<DetectorScore> {
        let config = EngineConfig::default();
        let peers = PeerStatsService::default();
        let ctx = DetectionContext {
            history,
            cohort: &[],
            peers: &peers,
            weather,
            config: &config,
        };
        WeatherAdjustedDetector.evaluate(bill, &ctx).await
    }

    #[tokio::test]
    async fn not_applicable_without_weather_data() {
        let subject = testutil::bill(1, 7, 2024, 4500.0);
        let weather = testutil::no_weather();
        assert!(evaluate(&subject, &[], &weather).await.is_none());
    }

    #[tokio::test]
    async fn fits_the_households_own_heating_profile() {
        // Two priors on the line kwh = 0.8 * hdd + 1000.
        let weather = testutil::static_weather(&[(2022, 3000.0), (2023, 3200.0), (2024, 3100.0)]);
        let history = [
            testutil::bill(2, 7, 2022, 3400.0),
            testutil::bill(3, 7, 2023, 3560.0),
        ];

        // Prediction for 2024: 0.8 * 3100 + 1000 = 3480.
        let on_line = testutil::bill(1, 7, 2024, 3480.0);
        let score = evaluate(&on_line, &history, &weather).await.unwrap();
        assert!((score.score - 0.0).abs() < f64::EPSILON);
        assert!((score.inputs.reference_kwh - 3480.0).abs() < 1e-6);
        assert_eq!(score.inputs.hdd, Some(3100.0));
        assert!(score.explanation.contains("own heating profile"));

        // 30% above the prediction lands at the 15–30 band's upper edge.
        let elevated = testutil::bill(1, 7, 2024, 4524.0);
        let score = evaluate(&elevated, &history, &weather).await.unwrap();
        assert!((score.score - 6.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn single_prior_year_uses_population_defaults() {
        let weather = testutil::static_weather(&[(2023, 3200.0), (2024, 3000.0)]);
        let history = [testutil::bill(2, 7, 2023, 3560.0)];

        // Default profile: 0.8 kWh/HDD + 1200 base → 3600 expected.
        let subject = testutil::bill(1, 7, 2024, 3600.0);
        let score = evaluate(&subject, &history, &weather).await.unwrap();
        assert!((score.score - 0.0).abs() < f64::EPSILON);
        assert!((score.inputs.reference_kwh - 3600.0).abs() < 1e-6);
        assert!(score.explanation.contains("typical household profile"));
    }

    #[tokio::test]
    async fn identical_prior_winters_fall_back_to_defaults() {
        // Two priors with the same HDD: no usable slope.
        let weather = testutil::static_weather(&[(2022, 3000.0), (2023, 3000.0), (2024, 3000.0)]);
        let history = [
            testutil::bill(2, 7, 2022, 3400.0),
            testutil::bill(3, 7, 2023, 3500.0),
        ];
        let subject = testutil::bill(1, 7, 2024, 3600.0);
        let score = evaluate(&subject, &history, &weather).await.unwrap();
        // Default profile: 0.8 * 3000 + 1200 = 3600.
        assert!((score.score - 0.0).abs() < f64::EPSILON);
        assert!(score.explanation.contains("typical household profile"));
    }

    #[test]
    fn least_squares_recovers_a_known_line() {
        let pairs = [(3000.0, 3400.0), (3200.0, 3560.0), (3400.0, 3720.0)];
        let (slope, intercept) = fit_line(&pairs).unwrap();
        assert!((slope - 0.8).abs() < 1e-9);
        assert!((intercept - 1000.0).abs() < 1e-6);
    }
}
