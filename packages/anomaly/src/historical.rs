//! Own-history detector: year-over-year consumption change.

use async_trait::async_trait;
use billwatch_anomaly_models::{DetectorKind, DetectorScore, ScoreInputs};
use billwatch_bill_models::Bill;

use crate::scale;
use crate::{DetectionContext, Detector};

/// How many recent prior years feed the baseline average.
const BASELINE_YEARS: usize = 3;

/// Scores a bill against the household's own previous years.
///
/// With two or more prior years on record the baseline is the average of
/// up to the last three; with exactly one it is that year. No prior data
/// means this detector has nothing to say.
pub struct HistoricalDetector;

struct Baseline {
    kwh: f64,
    years_used: usize,
}

fn baseline(bill: &Bill, history: &[Bill]) -> Option<Baseline> {
    let mut prior: Vec<&Bill> = history
        .iter()
        .filter(|b| b.user_id == bill.user_id && b.year < bill.year)
        .collect();
    if prior.is_empty() {
        return None;
    }

    prior.sort_by_key(|b| std::cmp::Reverse(b.year));
    if prior.len() == 1 {
        return Some(Baseline {
            kwh: prior[0].consumption_kwh,
            years_used: 1,
        });
    }

    prior.truncate(BASELINE_YEARS);
    #[allow(clippy::cast_precision_loss)]
    let kwh = prior.iter().map(|b| b.consumption_kwh).sum::<f64>() / prior.len() as f64;
    Some(Baseline {
        kwh,
        years_used: prior.len(),
    })
}

#[async_trait]
impl Detector for HistoricalDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Historical
    }

    async fn evaluate(&self, bill: &Bill, ctx: &DetectionContext<'_>) -> Option<DetectorScore> {
        let base = baseline(bill, ctx.history)?;

        let change_percent = (bill.consumption_kwh - base.kwh) / base.kwh * 100.0;
        let score = scale::round2(scale::deviation_score(change_percent));

        let baseline_label = if base.years_used == 1 {
            "last year".to_string()
        } else {
            format!("the average of your last {} years", base.years_used)
        };
        let explanation = if change_percent >= 0.0 {
            format!(
                "Consumption rose from {:.0} kWh to {:.0} kWh, a {:.1}% increase on {}.",
                base.kwh, bill.consumption_kwh, change_percent, baseline_label
            )
        } else {
            format!(
                "Consumption fell from {:.0} kWh to {:.0} kWh, a {:.1}% decrease on {}.",
                base.kwh,
                bill.consumption_kwh,
                change_percent.abs(),
                baseline_label
            )
        };

        Some(DetectorScore {
            detector: DetectorKind::Historical,
            score,
            explanation,
            inputs: ScoreInputs {
                actual_kwh: bill.consumption_kwh,
                reference_kwh: base.kwh,
                deviation_percent: change_percent,
                z_score: None,
                percentile_band: None,
                sample_size: None,
                hdd: None,
            },
        })
    }
}
