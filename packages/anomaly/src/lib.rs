#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Consumption anomaly detection for household energy bills.
//!
//! Three independent detectors score a bill against three baselines:
//! the household's own history ([`HistoricalDetector`]), a cohort of
//! similar households ([`PeerDetector`]), and a weather-normalized
//! expectation ([`WeatherAdjustedDetector`]). The [`engine`] runs all
//! three and merges whatever sub-scores are available into one
//! [`AnomalyResult`](billwatch_anomaly_models::AnomalyResult).
//!
//! A detector that cannot compute — no history, too few peers, weather
//! source down — returns `None` (*not applicable*), never an error and
//! never a zero. Only a malformed bill fails a detection call.

pub mod combine;
pub mod engine;
pub mod historical;
pub mod peer;
pub mod weather;

mod scale;

#[cfg(test)]
pub(crate) mod testutil;

use async_trait::async_trait;
use billwatch_anomaly_models::{DetectorKind, DetectorScore, EngineConfig};
use billwatch_bill_models::Bill;
use billwatch_peer::PeerStatsService;
use billwatch_weather::WeatherNormalizer;

pub use engine::{AnomalyEngine, BatchOutcome};
pub use historical::HistoricalDetector;
pub use peer::PeerDetector;
pub use weather::WeatherAdjustedDetector;

/// Errors that can fail a detection call.
///
/// Deliberately narrow: everything except a malformed input bill
/// degrades to an absent detector result instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The input bill violates a record-level invariant. Rejected before
    /// any detector runs; no partial result is produced.
    #[error(transparent)]
    InvalidBill(#[from] billwatch_bill_models::InvalidBill),
}

/// Everything a detector may consult besides the bill itself.
///
/// Borrowed per call; detectors never mutate any of it.
pub struct DetectionContext<'a> {
    /// The user's other bills. Detectors pick out prior years themselves.
    pub history: &'a [Bill],
    /// Candidate peer bills. Cohort membership is decided by key.
    pub cohort: &'a [Bill],
    /// Peer statistics service.
    pub peers: &'a PeerStatsService,
    /// Shared weather cache, constructed once and injected.
    pub weather: &'a WeatherNormalizer,
    /// Engine constants.
    pub config: &'a EngineConfig,
}

/// One scoring strategy.
///
/// The combiner depends only on this contract, so adding a detector
/// never touches combination logic.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Which slot this detector fills in the combined result.
    fn kind(&self) -> DetectorKind;

    /// Scores a bill, or returns `None` when this detector has
    /// insufficient evidence to say anything.
    async fn evaluate(&self, bill: &Bill, ctx: &DetectionContext<'_>) -> Option<DetectorScore>;
}
