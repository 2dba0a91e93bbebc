#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Anomaly detection result types and engine configuration.
//!
//! The central distinction these types encode: a detector that found
//! nothing scores `0`, a detector that could not look is *absent*
//! (`None`). The two must never collapse into each other — "no data"
//! reported as "confirmed normal" is a correctness bug, so absence is a
//! tagged state all the way up to the combined verdict, where it becomes
//! [`Severity::Unknown`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The three independent detectors.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectorKind {
    /// Compares against the household's own prior years.
    Historical,
    /// Compares against similar households in the same year.
    Peer,
    /// Compares against a weather-normalized expectation.
    Weather,
}

/// Ordinal severity of a combined verdict.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    /// Consumption within expected range.
    Normal,
    /// Elevated consumption worth a look.
    Warning,
    /// Strongly anomalous consumption.
    Critical,
    /// No detector could produce evidence. Distinct from [`Normal`](Self::Normal):
    /// nothing was confirmed.
    Unknown,
}

impl Severity {
    /// Classifies a combined score against the configured thresholds.
    ///
    /// Thresholds are inclusive lower bounds: a score exactly at the
    /// warning threshold is a warning, exactly at the critical threshold
    /// is critical.
    #[must_use]
    pub fn classify(combined_score: f64, warning_threshold: f64, critical_threshold: f64) -> Self {
        if combined_score >= critical_threshold {
            Self::Critical
        } else if combined_score >= warning_threshold {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// `true` for [`Warning`](Self::Warning) and [`Critical`](Self::Critical).
    #[must_use]
    pub const fn is_anomalous(self) -> bool {
        matches!(self, Self::Warning | Self::Critical)
    }
}

/// Label for the dominant finding across detectors.
///
/// Only upward findings appear here: decreases never raise a score, so
/// they can never dominate a verdict.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnomalyType {
    /// Sharp rise against the household's own history.
    ConsumptionSpike,
    /// Noticeable but not extreme rise against own history.
    ModerateIncrease,
    /// Far above the peer cohort.
    PeerOutlierHigh,
    /// Above the peer average without being an outlier.
    AbovePeerAverage,
    /// Rise that weather differences cannot account for.
    UnexplainedSpike,
    /// Deviation from the weather-normalized expectation, below spike level.
    ModerateDeviation,
    /// Nothing elevated.
    Normal,
}

/// The raw numbers behind one sub-score, kept for auditability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreInputs {
    /// The bill's actual consumption, kWh.
    pub actual_kwh: f64,
    /// What the detector compared against (historical baseline, peer
    /// mean, or weather-normalized prediction), kWh.
    pub reference_kwh: f64,
    /// Deviation of actual from the reference, percent.
    pub deviation_percent: f64,
    /// Standard deviations above the peer mean (peer detector only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
    /// Cohort percentile band (peer detector only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile_band: Option<String>,
    /// Peer cohort size (peer detector only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<usize>,
    /// Heating degree days used for the prediction (weather detector only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdd: Option<f64>,
}

/// One detector's applicable outcome.
///
/// A detector that cannot compute produces no `DetectorScore` at all;
/// there is deliberately no "empty" value of this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorScore {
    /// Which detector produced this.
    pub detector: DetectorKind,
    /// Anomaly sub-score in `[0, 10]`.
    pub score: f64,
    /// Human-readable account of the comparison.
    pub explanation: String,
    /// The numbers the score was derived from.
    pub inputs: ScoreInputs,
}

/// Sub-scores of all three detectors; absent means *not applicable*.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorScores {
    /// Own-history comparison, when prior bills exist.
    pub historical: Option<DetectorScore>,
    /// Peer comparison, when the cohort is large enough.
    pub peer: Option<DetectorScore>,
    /// Weather-normalized comparison, when HDD data is available.
    pub weather: Option<DetectorScore>,
}

impl DetectorScores {
    /// The applicable sub-scores, in fixed detector order.
    #[must_use]
    pub fn available(&self) -> Vec<&DetectorScore> {
        [&self.historical, &self.peer, &self.weather]
            .into_iter()
            .flatten()
            .collect()
    }

    /// The highest-scoring applicable detector, if any. Ties resolve to
    /// the earlier detector in historical/peer/weather order.
    #[must_use]
    pub fn dominant(&self) -> Option<&DetectorScore> {
        self.available()
            .into_iter()
            .reduce(|best, next| if next.score > best.score { next } else { best })
    }

    /// `true` when no detector could compute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.historical.is_none() && self.peer.is_none() && self.weather.is_none()
    }
}

/// The combined verdict for one bill. Created fresh per detection call
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyResult {
    /// The evaluated bill.
    pub bill_id: u64,
    /// Its owning user.
    pub user_id: u64,
    /// Bill year.
    pub year: i32,
    /// Per-detector sub-scores; each may be absent.
    pub detector_scores: DetectorScores,
    /// Weighted combined score in `[0, 10]`, one decimal. `None` when
    /// every detector was unavailable.
    pub combined_score: Option<f64>,
    /// Severity tier. [`Severity::Unknown`] when no evidence exists.
    pub severity: Severity,
    /// `true` iff severity is warning or critical.
    pub has_anomaly: bool,
    /// Dominant finding across detectors.
    pub primary_anomaly_type: AnomalyType,
    /// Human-readable summary naming the dominant detector.
    pub explanation: String,
    /// Fixed, severity-keyed suggestions.
    pub recommendations: Vec<String>,
    /// Estimated cost of the excess consumption, euros. Omitted when no
    /// baseline is available or the deviation is not positive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_extra_cost_euros: Option<f64>,
    /// When this verdict was produced.
    pub detected_at: DateTime<Utc>,
}

/// Relative weights of the three detectors.
///
/// When a detector is unavailable its weight is redistributed
/// proportionally over the remaining ones, so a verdict from two
/// detectors still uses the full weight budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorWeights {
    /// Weight of the historical detector.
    pub historical: f64,
    /// Weight of the peer detector.
    pub peer: f64,
    /// Weight of the weather-adjusted detector.
    pub weather: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            historical: 0.4,
            peer: 0.3,
            weather: 0.3,
        }
    }
}

impl DetectorWeights {
    /// The weight assigned to one detector.
    #[must_use]
    pub const fn for_detector(&self, detector: DetectorKind) -> f64 {
        match detector {
            DetectorKind::Historical => self.historical,
            DetectorKind::Peer => self.peer,
            DetectorKind::Weather => self.weather,
        }
    }
}

/// Tunable constants of the detection engine.
///
/// The defaults are the documented contract; overriding them is for
/// experimentation and tests, not per-request behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Detector weights for the combined score.
    pub weights: DetectorWeights,
    /// Combined scores at or above this are warnings.
    pub warning_threshold: f64,
    /// Combined scores at or above this are critical.
    pub critical_threshold: f64,
    /// Minimum cohort size before peer statistics are usable.
    pub min_peer_sample_size: usize,
    /// Household sizes at or above this share one peer bucket.
    pub household_bucket_cap: u8,
    /// Population default: heating consumption per degree day, kWh/HDD.
    /// Used when a household has too little history to fit its own curve.
    pub default_kwh_per_hdd: f64,
    /// Population default: weather-independent base load, kWh/year.
    pub default_base_load_kwh: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: DetectorWeights::default(),
            warning_threshold: 4.0,
            critical_threshold: 7.0,
            min_peer_sample_size: 5,
            household_bucket_cap: 5,
            default_kwh_per_hdd: 0.8,
            default_base_load_kwh: 1200.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_thresholds_are_inclusive_lower_bounds() {
        assert_eq!(Severity::classify(3.9, 4.0, 7.0), Severity::Normal);
        assert_eq!(Severity::classify(4.0, 4.0, 7.0), Severity::Warning);
        assert_eq!(Severity::classify(6.9, 4.0, 7.0), Severity::Warning);
        assert_eq!(Severity::classify(7.0, 4.0, 7.0), Severity::Critical);
        assert_eq!(Severity::classify(10.0, 4.0, 7.0), Severity::Critical);
    }

    #[test]
    fn unknown_is_not_anomalous() {
        assert!(!Severity::Unknown.is_anomalous());
        assert!(!Severity::Normal.is_anomalous());
        assert!(Severity::Warning.is_anomalous());
        assert!(Severity::Critical.is_anomalous());
    }

    #[test]
    fn dominant_prefers_highest_then_earliest() {
        let score = |detector, value: f64| DetectorScore {
            detector,
            score: value,
            explanation: String::new(),
            inputs: ScoreInputs {
                actual_kwh: 0.0,
                reference_kwh: 0.0,
                deviation_percent: 0.0,
                z_score: None,
                percentile_band: None,
                sample_size: None,
                hdd: None,
            },
        };

        let scores = DetectorScores {
            historical: Some(score(DetectorKind::Historical, 6.0)),
            peer: Some(score(DetectorKind::Peer, 8.0)),
            weather: Some(score(DetectorKind::Weather, 8.0)),
        };
        assert_eq!(scores.dominant().unwrap().detector, DetectorKind::Peer);

        let empty = DetectorScores::default();
        assert!(empty.dominant().is_none());
        assert!(empty.is_empty());
    }

    #[test]
    fn default_weights_sum_to_one() {
        let w = DetectorWeights::default();
        assert!((w.historical + w.peer + w.weather - 1.0).abs() < 1e-9);
    }
}
