//! Parcel selection: which units of which parcels a sale consumes

use crate::core::{Consumption, Parcel, ParcelId};
use crate::tax::au::{days_held, is_long_term};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Which selection step produced an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionPhase {
    Fifo,
    LongTerm,
    ShortTerm,
}

impl SelectionPhase {
    pub fn display(&self) -> &'static str {
        match self {
            SelectionPhase::Fifo => "FIFO",
            SelectionPhase::LongTerm => "LONG-TERM",
            SelectionPhase::ShortTerm => "SHORT-TERM",
        }
    }
}

impl std::fmt::Display for SelectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Units to take from one parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub parcel_id: ParcelId,
    pub units: Decimal,
    pub phase: SelectionPhase,
}

impl Consumption for Allocation {
    fn parcel_id(&self) -> ParcelId {
        self.parcel_id
    }

    fn units(&self) -> Decimal {
        self.units
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("insufficient cost basis: {available} units available, {required} required")]
    InsufficientCostBasis { available: Decimal, required: Decimal },
}

pub trait ParcelSelector {
    /// Plan which parcels cover `units` sold on `sale_date`.
    ///
    /// The returned allocations sum exactly to `units`. Nothing is mutated; the caller
    /// commits the plan to the pool.
    fn allocate(
        &self,
        parcels: &[Parcel],
        units: Decimal,
        sale_date: NaiveDate,
    ) -> Result<Vec<Allocation>, SelectionError>;
}

/// Oldest parcels first
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

/// Discount-eligible parcels first, each group by highest cost per unit
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxOptimal;

/// Parcel selection strategy, chosen once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    #[value(name = "tax_optimal", alias = "tax-optimal")]
    TaxOptimal,
    #[value(name = "fifo")]
    Fifo,
}

impl Strategy {
    pub fn display(&self) -> &'static str {
        match self {
            Strategy::TaxOptimal => "tax_optimal",
            Strategy::Fifo => "fifo",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl ParcelSelector for Strategy {
    fn allocate(
        &self,
        parcels: &[Parcel],
        units: Decimal,
        sale_date: NaiveDate,
    ) -> Result<Vec<Allocation>, SelectionError> {
        match self {
            Strategy::TaxOptimal => TaxOptimal.allocate(parcels, units, sale_date),
            Strategy::Fifo => Fifo.allocate(parcels, units, sale_date),
        }
    }
}

impl ParcelSelector for Fifo {
    fn allocate(
        &self,
        parcels: &[Parcel],
        units: Decimal,
        sale_date: NaiveDate,
    ) -> Result<Vec<Allocation>, SelectionError> {
        let mut candidates = eligible(parcels, units, sale_date)?;
        // stable: equal dates keep pool insertion order
        candidates.sort_by_key(|p| p.purchase_date);

        let mut allocations = Vec::new();
        let remaining = take(&candidates, units, SelectionPhase::Fifo, &mut allocations);
        debug_assert!(remaining.is_zero());
        Ok(allocations)
    }
}

impl ParcelSelector for TaxOptimal {
    fn allocate(
        &self,
        parcels: &[Parcel],
        units: Decimal,
        sale_date: NaiveDate,
    ) -> Result<Vec<Allocation>, SelectionError> {
        let candidates = eligible(parcels, units, sale_date)?;
        let (mut long_term, mut short_term): (Vec<&Parcel>, Vec<&Parcel>) = candidates
            .into_iter()
            .partition(|p| is_long_term(days_held(p.purchase_date, sale_date)));
        long_term.sort_by(|a, b| highest_cost_first(a, b));
        short_term.sort_by(|a, b| highest_cost_first(a, b));

        log::debug!(
            "Tax-optimal selection for {} units: {} long-term, {} short-term parcels",
            units,
            long_term.len(),
            short_term.len()
        );

        let mut allocations = Vec::new();
        let remaining = take(&long_term, units, SelectionPhase::LongTerm, &mut allocations);
        let remaining = take(&short_term, remaining, SelectionPhase::ShortTerm, &mut allocations);
        debug_assert!(remaining.is_zero());
        Ok(allocations)
    }
}

/// Parcels with units left that were bought on or before the sale date, in pool order.
/// Fails when together they cannot cover the sale.
fn eligible(
    parcels: &[Parcel],
    units: Decimal,
    sale_date: NaiveDate,
) -> Result<Vec<&Parcel>, SelectionError> {
    let candidates: Vec<&Parcel> = parcels
        .iter()
        .filter(|p| p.remaining_units > Decimal::ZERO && p.purchase_date <= sale_date)
        .collect();
    let available: Decimal = candidates.iter().map(|p| p.remaining_units).sum();
    if available < units {
        return Err(SelectionError::InsufficientCostBasis {
            available,
            required: units,
        });
    }
    Ok(candidates)
}

fn highest_cost_first(a: &Parcel, b: &Parcel) -> Ordering {
    b.cost_per_unit()
        .cmp(&a.cost_per_unit())
        .then_with(|| a.purchase_date.cmp(&b.purchase_date))
}

/// Walk `parcels` in order taking whole parcels until the last, which is split.
/// Returns the units still needed.
fn take(
    parcels: &[&Parcel],
    mut needed: Decimal,
    phase: SelectionPhase,
    allocations: &mut Vec<Allocation>,
) -> Decimal {
    for parcel in parcels {
        if needed <= Decimal::ZERO {
            break;
        }
        let units = needed.min(parcel.remaining_units);
        log::debug!(
            "  {}: {} units from {} ({}) @ {}/unit",
            phase,
            units,
            parcel.id,
            parcel.purchase_date,
            parcel.cost_per_unit()
        );
        allocations.push(Allocation {
            parcel_id: parcel.id,
            units,
            phase,
        });
        needed -= units;
    }
    needed
}
