#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Energy bill input records shared across the billwatch system.
//!
//! A [`Bill`] is the immutable unit of input for anomaly detection: one
//! billing period for one household, already extracted and verified
//! upstream. The engine only reads these records — storage, OCR, and
//! the verification workflow live outside this workspace and hand bills
//! in through this data contract.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Property category a household lives in.
///
/// Used (together with household size and year) to decide which bills
/// count as peers of each other.
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
pub enum PropertyType {
    /// Flat in a multi-unit building.
    Apartment,
    /// Free-standing or terraced house.
    House,
    /// Anything else (mixed-use, commercial conversions, ...).
    Other,
}

/// A single household energy bill for one billing period.
///
/// Owned by the caller; the detection engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    /// Unique bill identifier assigned by the storage layer.
    pub id: u64,
    /// Owning user.
    pub user_id: u64,
    /// Calendar year the bill covers.
    pub year: i32,
    /// Total consumption over the billing period, in kWh. Always positive.
    pub consumption_kwh: f64,
    /// Total invoiced cost in euros.
    pub total_cost_euros: f64,
    /// First day of the billing period.
    pub billing_start_date: NaiveDate,
    /// Last day of the billing period. Always after the start date.
    pub billing_end_date: NaiveDate,
    /// Postal code of the supplied address (e.g. `"10115"`).
    pub postal_code: String,
    /// Number of people in the household. Always positive.
    pub household_size: u8,
    /// Property category.
    pub property_type: PropertyType,
    /// Contracted price per kWh, in euros. Always positive.
    pub tariff_rate: f64,
}

impl Bill {
    /// Checks the record-level invariants the detection engine relies on.
    ///
    /// Called once at the engine boundary, before any detector runs. A
    /// bill that fails validation produces no partial result.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBill`] naming the first violated invariant.
    pub fn validate(&self) -> Result<(), InvalidBill> {
        if self.consumption_kwh <= 0.0 {
            return Err(InvalidBill::NonPositiveConsumption {
                id: self.id,
                value: self.consumption_kwh,
            });
        }
        if self.total_cost_euros < 0.0 {
            return Err(InvalidBill::NegativeCost {
                id: self.id,
                value: self.total_cost_euros,
            });
        }
        if self.billing_start_date >= self.billing_end_date {
            return Err(InvalidBill::EmptyBillingPeriod {
                id: self.id,
                start: self.billing_start_date,
                end: self.billing_end_date,
            });
        }
        if self.household_size == 0 {
            return Err(InvalidBill::NonPositiveHouseholdSize { id: self.id });
        }
        if self.tariff_rate <= 0.0 {
            return Err(InvalidBill::NonPositiveTariff {
                id: self.id,
                value: self.tariff_rate,
            });
        }
        Ok(())
    }

    /// Number of days between the start and end of the billing period.
    #[must_use]
    pub fn billing_days(&self) -> i64 {
        (self.billing_end_date - self.billing_start_date).num_days()
    }

    /// Average daily consumption over the billing period, in kWh.
    #[must_use]
    pub fn daily_avg_kwh(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let days = self.billing_days().max(1) as f64;
        self.consumption_kwh / days
    }

    /// Effective price paid per kWh, in euros.
    ///
    /// Derived from the invoiced total rather than the contracted
    /// [`tariff_rate`](Self::tariff_rate), so standing charges show up
    /// here.
    #[must_use]
    pub fn cost_per_kwh(&self) -> f64 {
        self.total_cost_euros / self.consumption_kwh
    }
}

/// A bill that violates a record-level invariant.
///
/// The only hard failure in the detection pipeline: everything else
/// degrades to an absent detector result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidBill {
    /// Consumption must be strictly positive.
    #[error("bill {id}: consumption must be positive, got {value} kWh")]
    NonPositiveConsumption {
        /// Offending bill.
        id: u64,
        /// The rejected consumption value.
        value: f64,
    },

    /// Total cost must not be negative.
    #[error("bill {id}: total cost must not be negative, got {value} EUR")]
    NegativeCost {
        /// Offending bill.
        id: u64,
        /// The rejected cost value.
        value: f64,
    },

    /// The billing period must start before it ends.
    #[error("bill {id}: billing period must start before it ends ({start} >= {end})")]
    EmptyBillingPeriod {
        /// Offending bill.
        id: u64,
        /// Claimed period start.
        start: NaiveDate,
        /// Claimed period end.
        end: NaiveDate,
    },

    /// Household size must be at least one person.
    #[error("bill {id}: household size must be positive")]
    NonPositiveHouseholdSize {
        /// Offending bill.
        id: u64,
    },

    /// Tariff rate must be strictly positive.
    #[error("bill {id}: tariff rate must be positive, got {value} EUR/kWh")]
    NonPositiveTariff {
        /// Offending bill.
        id: u64,
        /// The rejected tariff value.
        value: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill() -> Bill {
        Bill {
            id: 1,
            user_id: 7,
            year: 2024,
            consumption_kwh: 3200.0,
            total_cost_euros: 1056.0,
            billing_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            billing_end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            postal_code: "10115".to_string(),
            household_size: 3,
            property_type: PropertyType::Apartment,
            tariff_rate: 0.33,
        }
    }

    #[test]
    fn accepts_well_formed_bill() {
        assert!(bill().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_consumption() {
        let mut b = bill();
        b.consumption_kwh = 0.0;
        assert!(matches!(
            b.validate(),
            Err(InvalidBill::NonPositiveConsumption { id: 1, .. })
        ));
    }

    #[test]
    fn rejects_inverted_billing_period() {
        let mut b = bill();
        b.billing_end_date = b.billing_start_date;
        assert!(matches!(
            b.validate(),
            Err(InvalidBill::EmptyBillingPeriod { .. })
        ));
    }

    #[test]
    fn rejects_zero_household() {
        let mut b = bill();
        b.household_size = 0;
        assert!(matches!(
            b.validate(),
            Err(InvalidBill::NonPositiveHouseholdSize { id: 1 })
        ));
    }

    #[test]
    fn rejects_free_energy() {
        let mut b = bill();
        b.tariff_rate = 0.0;
        assert!(matches!(
            b.validate(),
            Err(InvalidBill::NonPositiveTariff { .. })
        ));
    }

    #[test]
    fn full_year_billing_days() {
        assert_eq!(bill().billing_days(), 365);
    }

    #[test]
    fn derived_unit_cost_uses_invoiced_total() {
        let b = bill();
        assert!((b.cost_per_kwh() - 0.33).abs() < 1e-9);
    }

    #[test]
    fn property_type_round_trips_as_snake_case() {
        use std::str::FromStr as _;
        assert_eq!(PropertyType::Apartment.to_string(), "apartment");
        assert_eq!(
            PropertyType::from_str("house").unwrap(),
            PropertyType::House
        );
    }
}
