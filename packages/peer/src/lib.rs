#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Peer cohort grouping and distributional statistics.
//!
//! Two bills are peers iff they agree on household-size bucket, property
//! type, and year. [`PeerStatsService`] computes mean, standard deviation
//! and a percentile table over a cohort on demand — nothing is persisted,
//! and groups below the minimum sample size are reported as unavailable
//! rather than as unreliable numbers.

use std::collections::BTreeMap;
use std::fmt;

use billwatch_bill_models::{Bill, PropertyType};
use serde::{Deserialize, Serialize};

/// Household-size bucket.
///
/// Sizes at or above the cap share a single open-ended bucket, so a
/// 6-person and a 9-person household compare against the same peers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdBucket {
    /// Bucketed household size (capped).
    pub size: u8,
    /// Whether this is the open-ended top bucket ("5+").
    pub open_ended: bool,
}

impl HouseholdBucket {
    /// Default cap: households of 5 or more people share one bucket.
    pub const DEFAULT_CAP: u8 = 5;

    /// Buckets a raw household size.
    ///
    /// A cap below 1 is treated as 1.
    #[must_use]
    pub fn for_size(household_size: u8, cap: u8) -> Self {
        let cap = cap.max(1);
        if household_size >= cap {
            Self {
                size: cap,
                open_ended: true,
            }
        } else {
            Self {
                size: household_size,
                open_ended: false,
            }
        }
    }
}

impl fmt::Display for HouseholdBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.open_ended {
            write!(f, "{}+", self.size)
        } else {
            write!(f, "{}", self.size)
        }
    }
}

/// Identity of a peer cohort: bills sharing this key are peers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PeerGroupKey {
    /// Bucketed household size.
    pub household_bucket: HouseholdBucket,
    /// Property category.
    pub property_type: PropertyType,
    /// Bill year.
    pub year: i32,
}

impl PeerGroupKey {
    /// Derives the cohort key for a bill.
    #[must_use]
    pub fn for_bill(bill: &Bill, bucket_cap: u8) -> Self {
        Self {
            household_bucket: HouseholdBucket::for_size(bill.household_size, bucket_cap),
            property_type: bill.property_type,
            year: bill.year,
        }
    }
}

impl fmt::Display for PeerGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-person {} households, {}",
            self.household_bucket, self.property_type, self.year
        )
    }
}

/// Consumption percentiles over a cohort, by linear interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileTable {
    /// 25th percentile, kWh.
    pub p25: f64,
    /// Median, kWh.
    pub p50: f64,
    /// 75th percentile, kWh.
    pub p75: f64,
    /// 90th percentile, kWh.
    pub p90: f64,
}

/// Distributional statistics for one peer cohort.
///
/// Only produced when the cohort meets the minimum sample size, so a
/// present value is always backed by enough data to compare against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerGroupStats {
    /// Cohort identity.
    pub key: PeerGroupKey,
    /// Number of bills behind these statistics.
    pub sample_size: usize,
    /// Population mean consumption, kWh.
    pub mean_kwh: f64,
    /// Population standard deviation of consumption, kWh.
    pub stddev_kwh: f64,
    /// Consumption percentiles.
    pub percentiles: PercentileTable,
    /// Mean invoiced cost across the cohort, euros.
    pub avg_cost_euros: f64,
    /// Cohort-wide effective price: total cost over total consumption.
    pub avg_cost_per_kwh: f64,
}

impl PeerGroupStats {
    /// Human label for where a consumption value falls in this cohort.
    #[must_use]
    pub fn percentile_band(&self, consumption_kwh: f64) -> &'static str {
        if consumption_kwh >= self.percentiles.p90 {
            "top 10%"
        } else if consumption_kwh >= self.percentiles.p75 {
            "top 25%"
        } else if consumption_kwh <= self.percentiles.p25 {
            "bottom 25%"
        } else {
            "middle 50%"
        }
    }
}

/// On-demand peer statistics over caller-supplied cohorts.
///
/// Deterministic for a fixed cohort: values are sorted before any
/// percentile math and no ordering of the input slice leaks through.
#[derive(Debug, Clone, Copy)]
pub struct PeerStatsService {
    min_sample_size: usize,
    bucket_cap: u8,
}

impl Default for PeerStatsService {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_SAMPLE_SIZE, HouseholdBucket::DEFAULT_CAP)
    }
}

impl PeerStatsService {
    /// Default minimum cohort size before statistics are considered usable.
    pub const DEFAULT_MIN_SAMPLE_SIZE: usize = 5;

    /// Creates a service with explicit thresholds.
    #[must_use]
    pub const fn new(min_sample_size: usize, bucket_cap: u8) -> Self {
        Self {
            min_sample_size,
            bucket_cap,
        }
    }

    /// The cohort key a bill belongs to, under this service's bucketing.
    #[must_use]
    pub fn key_for(&self, bill: &Bill) -> PeerGroupKey {
        PeerGroupKey::for_bill(bill, self.bucket_cap)
    }

    /// Statistics for `subject`'s cohort, computed over `bills`.
    ///
    /// The subject bill itself is excluded (by id) so a household is
    /// never compared against a distribution containing its own reading.
    /// Returns `None` when fewer than the minimum number of peer bills
    /// share the subject's key — unavailable, not zero.
    #[must_use]
    pub fn stats_for(&self, subject: &Bill, bills: &[Bill]) -> Option<PeerGroupStats> {
        let key = self.key_for(subject);
        let cohort: Vec<&Bill> = bills
            .iter()
            .filter(|b| b.id != subject.id && self.key_for(b) == key)
            .collect();
        self.compute(key, &cohort)
    }

    /// Statistics for every distinct cohort present in `bills`, ordered
    /// by key. Groups below the minimum sample size are omitted.
    ///
    /// Unlike [`stats_for`](Self::stats_for) no bill is excluded: this
    /// is the cohort-inventory view, not a comparison against a subject.
    #[must_use]
    pub fn group_summaries(&self, bills: &[Bill]) -> Vec<PeerGroupStats> {
        let mut groups: BTreeMap<PeerGroupKey, Vec<&Bill>> = BTreeMap::new();
        for bill in bills {
            groups.entry(self.key_for(bill)).or_default().push(bill);
        }
        groups
            .into_iter()
            .filter_map(|(key, cohort)| self.compute(key, &cohort))
            .collect()
    }

    fn compute(&self, key: PeerGroupKey, cohort: &[&Bill]) -> Option<PeerGroupStats> {
        if cohort.len() < self.min_sample_size {
            log::debug!(
                "peer group {key}: {} bills, need {} — unavailable",
                cohort.len(),
                self.min_sample_size
            );
            return None;
        }

        let mut consumptions: Vec<f64> = cohort.iter().map(|b| b.consumption_kwh).collect();
        consumptions.sort_by(f64::total_cmp);

        #[allow(clippy::cast_precision_loss)]
        let n = consumptions.len() as f64;
        let mean = consumptions.iter().sum::<f64>() / n;
        let variance = consumptions.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let total_cost: f64 = cohort.iter().map(|b| b.total_cost_euros).sum();
        let total_kwh: f64 = consumptions.iter().sum();

        Some(PeerGroupStats {
            key,
            sample_size: cohort.len(),
            mean_kwh: mean,
            stddev_kwh: variance.sqrt(),
            percentiles: PercentileTable {
                p25: percentile(&consumptions, 0.25),
                p50: percentile(&consumptions, 0.50),
                p75: percentile(&consumptions, 0.75),
                p90: percentile(&consumptions, 0.90),
            },
            avg_cost_euros: total_cost / n,
            avg_cost_per_kwh: total_cost / total_kwh,
        })
    }
}

/// Linear-interpolation percentile over an ascending-sorted slice.
///
/// `q` in [0, 1]. The slice must be non-empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let rank = q * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let frac = rank - rank.floor();
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}
