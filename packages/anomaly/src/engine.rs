//! Engine entry points: single-bill and batch detection.

use billwatch_anomaly_models::{AnomalyResult, DetectorKind, DetectorScores, EngineConfig};
use billwatch_bill_models::Bill;
use billwatch_peer::PeerStatsService;
use billwatch_weather::WeatherNormalizer;
use futures::future::join_all;

use crate::{
    DetectionContext, Detector, EngineError, HistoricalDetector, PeerDetector,
    WeatherAdjustedDetector, combine,
};

/// The assembled detection pipeline.
///
/// Holds the three detectors, the peer statistics service, and the
/// shared weather cache. Construct once and reuse; detection calls only
/// read from it, so the engine can serve many bills concurrently.
pub struct AnomalyEngine {
    config: EngineConfig,
    peers: PeerStatsService,
    weather: WeatherNormalizer,
    detectors: Vec<Box<dyn Detector>>,
}

/// One bill's outcome in a batch: a verdict or that bill's own error.
#[derive(Debug)]
pub struct BatchOutcome {
    /// The evaluated bill.
    pub bill_id: u64,
    /// Verdict, or the per-item failure that did not abort the batch.
    pub result: Result<AnomalyResult, EngineError>,
}

impl AnomalyEngine {
    /// Assembles the engine from its configuration and the shared
    /// weather cache.
    #[must_use]
    pub fn new(config: EngineConfig, weather: WeatherNormalizer) -> Self {
        let peers = PeerStatsService::new(config.min_peer_sample_size, config.household_bucket_cap);
        Self {
            config,
            peers,
            weather,
            detectors: vec![
                Box::new(HistoricalDetector),
                Box::new(PeerDetector),
                Box::new(WeatherAdjustedDetector),
            ],
        }
    }

    /// Runs every detector over one bill and combines the sub-scores.
    ///
    /// `history` supplies the user's other bills (prior years are picked
    /// out per detector); `cohort` supplies candidate peer bills. Both
    /// may be over-inclusive — detectors filter by user, year, and peer
    /// key themselves.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidBill`] when the bill violates a
    /// record-level invariant. Nothing else fails: detectors without
    /// evidence are simply absent from the result.
    pub async fn detect(
        &self,
        bill: &Bill,
        history: &[Bill],
        cohort: &[Bill],
    ) -> Result<AnomalyResult, EngineError> {
        bill.validate()?;

        let ctx = DetectionContext {
            history,
            cohort,
            peers: &self.peers,
            weather: &self.weather,
            config: &self.config,
        };

        let mut scores = DetectorScores::default();
        for detector in &self.detectors {
            let outcome = detector.evaluate(bill, &ctx).await;
            match detector.kind() {
                DetectorKind::Historical => scores.historical = outcome,
                DetectorKind::Peer => scores.peer = outcome,
                DetectorKind::Weather => scores.weather = outcome,
            }
        }

        log::debug!(
            "bill {}: {} of {} detectors applicable",
            bill.id,
            scores.available().len(),
            self.detectors.len()
        );

        Ok(combine::combine(bill, scores, &self.config))
    }

    /// Detects over a whole bill set, drawing each bill's history and
    /// peer cohort from the set itself.
    ///
    /// Bills are processed concurrently but results come back in input
    /// order, one [`BatchOutcome`] per input bill. A failing bill
    /// (invalid input) yields its own error entry and leaves every other
    /// outcome untouched.
    pub async fn batch_detect(&self, bills: &[Bill]) -> Vec<BatchOutcome> {
        let runs = bills.iter().map(|bill| async move {
            let result = self.detect(bill, bills, bills).await;
            if let Err(err) = &result {
                log::warn!("bill {}: detection failed: {err}", bill.id);
            }
            BatchOutcome {
                bill_id: bill.id,
                result,
            }
        });
        join_all(runs).await
    }
}
