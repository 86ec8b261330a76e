use crate::core::{Parcel, ParcelId, Sale};
use crate::tax::au::{days_held, is_long_term, FinancialYear, CGT_DISCOUNT_RATE};
use crate::tax::selector::SelectionPhase;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The part of one parcel allocated to a sale
#[derive(Debug, Clone, Copy)]
pub struct ParcelSlice<'a> {
    pub parcel: &'a Parcel,
    pub units: Decimal,
    pub phase: SelectionPhase,
}

/// One computed tax line per (sale, parcel slice)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CgtRecord {
    pub symbol: String,
    pub sale_date: NaiveDate,
    pub purchase_date: NaiveDate,
    pub units: Decimal,
    pub days_held: i64,
    pub is_long_term: bool,
    pub currency: String,
    pub purchase_rate: Decimal,
    pub sale_rate: Decimal,
    pub cost_basis_domestic: Decimal,
    pub gross_proceeds_domestic: Decimal,
    pub sale_commission_domestic: Decimal,
    pub net_proceeds_domestic: Decimal,
    pub capital_gain_domestic: Decimal,
    pub discount_rate_applied: Decimal,
    pub taxable_gain_domestic: Decimal,
    pub parcel_source_id: ParcelId,
    pub selection_phase: SelectionPhase,
    pub financial_year: FinancialYear,
}

impl CgtRecord {
    pub fn is_discounted(&self) -> bool {
        !self.discount_rate_applied.is_zero()
    }
}

/// Compute the gain on one parcel slice.
///
/// `purchase_rate` converts the parcel's currency to AUD at the purchase date and
/// `sale_rate` the sale's currency at the sale date. Sale commission is shared pro rata
/// by units across the slices of a sale.
pub fn compute(slice: &ParcelSlice, sale: &Sale, purchase_rate: Decimal, sale_rate: Decimal) -> CgtRecord {
    let parcel = slice.parcel;
    let units = slice.units;

    let cost_basis_domestic = units * parcel.cost_per_unit() * purchase_rate;

    let gross_proceeds = units * sale.sale_price;
    let proportional_commission = if sale.units_sold.is_zero() {
        Decimal::ZERO
    } else {
        sale.commission * units / sale.units_sold
    };
    let net_proceeds_domestic = (gross_proceeds - proportional_commission) * sale_rate;

    let capital_gain_domestic = net_proceeds_domestic - cost_basis_domestic;

    let days_held = days_held(parcel.purchase_date, sale.sale_date);
    let is_long_term = is_long_term(days_held);

    let discount_rate_applied = if is_long_term && capital_gain_domestic > Decimal::ZERO {
        CGT_DISCOUNT_RATE
    } else {
        Decimal::ZERO
    };
    let taxable_gain_domestic = capital_gain_domestic * (Decimal::ONE - discount_rate_applied);

    CgtRecord {
        symbol: sale.symbol.clone(),
        sale_date: sale.sale_date,
        purchase_date: parcel.purchase_date,
        units,
        days_held,
        is_long_term,
        currency: sale.currency.clone(),
        purchase_rate,
        sale_rate,
        cost_basis_domestic,
        gross_proceeds_domestic: gross_proceeds * sale_rate,
        sale_commission_domestic: proportional_commission * sale_rate,
        net_proceeds_domestic,
        capital_gain_domestic,
        discount_rate_applied,
        taxable_gain_domestic,
        parcel_source_id: parcel.id,
        selection_phase: slice.phase,
        financial_year: FinancialYear::from_date(sale.sale_date),
    }
}
