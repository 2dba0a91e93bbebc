//! Peer detector: z-score against similar households.

use async_trait::async_trait;
use billwatch_anomaly_models::{DetectorKind, DetectorScore, ScoreInputs};
use billwatch_bill_models::Bill;

use crate::scale;
use crate::{DetectionContext, Detector};

/// Scores a bill against the cohort of bills sharing its peer key
/// (household-size bucket, property type, year).
///
/// Not applicable when the cohort is below the minimum sample size or
/// has zero spread — a z-score against no variance means nothing.
pub struct PeerDetector;

#[async_trait]
impl Detector for PeerDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Peer
    }

    async fn evaluate(&self, bill: &Bill, ctx: &DetectionContext<'_>) -> Option<DetectorScore> {
        let stats = ctx.peers.stats_for(bill, ctx.cohort)?;

        if stats.stddev_kwh == 0.0 {
            log::debug!(
                "peer group {}: zero spread across {} bills, skipping z-score",
                stats.key,
                stats.sample_size
            );
            return None;
        }

        let z = (bill.consumption_kwh - stats.mean_kwh) / stats.stddev_kwh;
        let score = scale::round2(scale::z_score_points(z));
        let deviation_percent = (bill.consumption_kwh - stats.mean_kwh) / stats.mean_kwh * 100.0;
        let band = stats.percentile_band(bill.consumption_kwh);

        let direction = if deviation_percent >= 0.0 {
            "above"
        } else {
            "below"
        };
        let explanation = format!(
            "Consumption of {:.0} kWh is {:.1}% {direction} the {:.0} kWh average for {} ({band}, z-score {z:.2}, {} peers).",
            bill.consumption_kwh,
            deviation_percent.abs(),
            stats.mean_kwh,
            stats.key,
            stats.sample_size,
        );

        Some(DetectorScore {
            detector: DetectorKind::Peer,
            score,
            explanation,
            inputs: ScoreInputs {
                actual_kwh: bill.consumption_kwh,
                reference_kwh: stats.mean_kwh,
                deviation_percent,
                z_score: Some(scale::round2(z)),
                percentile_band: Some(band.to_string()),
                sample_size: Some(stats.sample_size),
                hdd: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use billwatch_anomaly_models::EngineConfig;
    use billwatch_peer::PeerStatsService;

    use super::*;
    use crate::testutil;

    async fn evaluate(bill: &Bill, cohort: &[Bill]) -> Option<DetectorScore> {
        let config = EngineConfig::default();
        let peers = PeerStatsService::new(config.min_peer_sample_size, config.household_bucket_cap);
        let weather = testutil::no_weather();
        let ctx = DetectionContext {
            history: &[],
            cohort,
            peers: &peers,
            weather: &weather,
            config: &config,
        };
        PeerDetector.evaluate(bill, &ctx).await
    }

    /// Six peers: mean 3000, population stddev exactly 1000.
    fn spread_cohort() -> Vec<Bill> {
        vec![
            testutil::bill(10, 10, 2024, 2000.0),
            testutil::bill(11, 11, 2024, 2000.0),
            testutil::bill(12, 12, 2024, 2000.0),
            testutil::bill(13, 13, 2024, 4000.0),
            testutil::bill(14, 14, 2024, 4000.0),
            testutil::bill(15, 15, 2024, 4000.0),
        ]
    }

    #[tokio::test]
    async fn undersized_cohort_is_not_applicable() {
        let subject = testutil::bill(1, 7, 2024, 4500.0);
        // Cohort exists but is below the minimum sample size of 5.
        let cohort: Vec<Bill> = (10..14)
            .map(|i| testutil::bill(i, i, 2024, 3000.0))
            .collect();
        assert!(evaluate(&subject, &cohort).await.is_none());
    }

    #[tokio::test]
    async fn zero_spread_is_not_applicable() {
        let subject = testutil::bill(1, 7, 2024, 4500.0);
        let cohort: Vec<Bill> = (10..16)
            .map(|i| testutil::bill(i, i, 2024, 3000.0))
            .collect();
        assert!(evaluate(&subject, &cohort).await.is_none());
    }

    #[tokio::test]
    async fn z_score_maps_through_the_bands() {
        // z = (5500 - 3000) / 1000 = 2.5 → 5 + 0.5 * 3 = 6.5.
        let subject = testutil::bill(1, 7, 2024, 5500.0);
        let score = evaluate(&subject, &spread_cohort()).await.unwrap();
        assert!((score.score - 6.5).abs() < 1e-9);
        assert!((score.inputs.z_score.unwrap() - 2.5).abs() < 1e-9);
        assert_eq!(score.inputs.sample_size, Some(6));
        assert_eq!(score.inputs.percentile_band.as_deref(), Some("top 10%"));
    }

    #[tokio::test]
    async fn below_average_scores_zero_but_stays_applicable() {
        let subject = testutil::bill(1, 7, 2024, 2200.0);
        let score = evaluate(&subject, &spread_cohort()).await.unwrap();
        assert!((score.score - 0.0).abs() < f64::EPSILON);
        assert!(score.inputs.z_score.unwrap() < 0.0);
        assert!(score.explanation.contains("below"));
    }

    #[tokio::test]
    async fn different_year_is_a_different_cohort() {
        let subject = testutil::bill(1, 7, 2025, 4500.0);
        assert!(evaluate(&subject, &spread_cohort()).await.is_none());
    }
}
