//! Merging detector sub-scores into one verdict.

use billwatch_anomaly_models::{
    AnomalyResult, AnomalyType, DetectorKind, DetectorScores, EngineConfig, Severity,
};
use billwatch_bill_models::Bill;
use chrono::Utc;

use crate::scale;

/// Combines whatever sub-scores are available into an [`AnomalyResult`].
///
/// Absent detectors redistribute their weight proportionally over the
/// remaining ones; with a single available detector the combined score
/// is that detector's score. With none, the verdict itself is absent:
/// severity [`Unknown`](Severity::Unknown), no anomaly claimed — an
/// unevaluated bill is not a normal one.
#[must_use]
pub fn combine(bill: &Bill, scores: DetectorScores, config: &EngineConfig) -> AnomalyResult {
    let available = scores.available();

    if available.is_empty() {
        return AnomalyResult {
            bill_id: bill.id,
            user_id: bill.user_id,
            year: bill.year,
            detector_scores: scores,
            combined_score: None,
            severity: Severity::Unknown,
            has_anomaly: false,
            primary_anomaly_type: AnomalyType::Normal,
            explanation:
                "No detector had enough data to evaluate this bill; its consumption level is \
                 unconfirmed rather than normal."
                    .to_string(),
            recommendations: recommendations_for(Severity::Unknown),
            estimated_extra_cost_euros: None,
            detected_at: Utc::now(),
        };
    }

    let total_weight: f64 = available
        .iter()
        .map(|s| config.weights.for_detector(s.detector))
        .sum();
    let weighted: f64 = available
        .iter()
        .map(|s| s.score * config.weights.for_detector(s.detector))
        .sum::<f64>()
        / total_weight;
    let combined = scale::round1(weighted);

    let severity = Severity::classify(combined, config.warning_threshold, config.critical_threshold);
    let has_anomaly = severity.is_anomalous();

    // available is non-empty, so a dominant detector exists.
    let dominant = scores
        .dominant()
        .expect("non-empty scores have a dominant detector");
    let primary_anomaly_type = primary_type(
        dominant.detector,
        dominant.score,
        &dominant.inputs,
        config,
    );
    let explanation = if has_anomaly {
        format!(
            "{} comparison shows the strongest deviation, {:.1}% above its expected level. {}",
            detector_label(dominant.detector),
            dominant.inputs.deviation_percent,
            dominant.explanation
        )
    } else {
        "Consumption is within the normal range across all available checks.".to_string()
    };

    let estimated_extra_cost_euros = extra_cost(bill, &scores);

    AnomalyResult {
        bill_id: bill.id,
        user_id: bill.user_id,
        year: bill.year,
        detector_scores: scores,
        combined_score: Some(combined),
        severity,
        has_anomaly,
        primary_anomaly_type,
        explanation,
        recommendations: recommendations_for(severity),
        estimated_extra_cost_euros,
        detected_at: Utc::now(),
    }
}

/// Fixed, severity-keyed suggestions. Content, not computation.
#[must_use]
pub fn recommendations_for(severity: Severity) -> Vec<String> {
    let lines: &[&str] = match severity {
        Severity::Normal => &[
            "Continue current energy practices",
            "Keep an eye on next year's bill for changes",
        ],
        Severity::Warning => &[
            "Check for new appliances or changed usage patterns",
            "Review thermostat settings and heating schedules",
            "Check insulation and window seals",
        ],
        Severity::Critical => &[
            "Check for equipment malfunctions or continuously running devices",
            "Review heating/cooling system efficiency",
            "Consider a professional energy audit",
            "Consider energy-efficient appliances",
        ],
        Severity::Unknown => &[
            "Add more billing history to enable year-over-year comparison",
            "Complete the household profile so peer comparison can apply",
        ],
    };
    lines.iter().map(ToString::to_string).collect()
}

fn detector_label(detector: DetectorKind) -> &'static str {
    match detector {
        DetectorKind::Historical => "Year-over-year",
        DetectorKind::Peer => "Peer group",
        DetectorKind::Weather => "Weather-adjusted",
    }
}

fn primary_type(
    detector: DetectorKind,
    score: f64,
    inputs: &billwatch_anomaly_models::ScoreInputs,
    config: &EngineConfig,
) -> AnomalyType {
    if score < config.warning_threshold {
        return AnomalyType::Normal;
    }
    match detector {
        DetectorKind::Historical => {
            if inputs.deviation_percent > 30.0 {
                AnomalyType::ConsumptionSpike
            } else {
                AnomalyType::ModerateIncrease
            }
        }
        DetectorKind::Peer => {
            if inputs.z_score.unwrap_or(0.0) > 2.0 {
                AnomalyType::PeerOutlierHigh
            } else {
                AnomalyType::AbovePeerAverage
            }
        }
        DetectorKind::Weather => {
            if inputs.deviation_percent > 25.0 {
                AnomalyType::UnexplainedSpike
            } else {
                AnomalyType::ModerateDeviation
            }
        }
    }
}

/// Cost of the excess over the best available baseline: the weather
/// prediction, else the historical baseline, else the peer mean.
/// Omitted entirely when there is no baseline or no excess.
fn extra_cost(bill: &Bill, scores: &DetectorScores) -> Option<f64> {
    let reference_kwh = scores
        .weather
        .as_ref()
        .or(scores.historical.as_ref())
        .or(scores.peer.as_ref())
        .map(|s| s.inputs.reference_kwh)?;

    let extra_kwh = bill.consumption_kwh - reference_kwh;
    (extra_kwh > 0.0).then(|| scale::round2(extra_kwh * bill.tariff_rate))
}
