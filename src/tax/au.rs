use crate::tax::gain::CgtRecord;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Minimum whole days held for a parcel to qualify for the CGT discount.
///
/// The ATO test is "at least 12 months"; a flat 365 days is used, inclusive.
pub const LONG_TERM_DAYS: i64 = 365;

/// Discount applied to capital gains (never losses) on long-term parcels
pub const CGT_DISCOUNT_RATE: Decimal = dec!(0.5);

pub fn days_held(purchase_date: NaiveDate, sale_date: NaiveDate) -> i64 {
    (sale_date - purchase_date).num_days()
}

pub fn is_long_term(days_held: i64) -> bool {
    days_held >= LONG_TERM_DAYS
}

/// Australian financial year (runs 1 July to 30 June)
/// The year value represents the end year (e.g., 2025 = 2024-25 financial year)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinancialYear(pub i32);

impl FinancialYear {
    pub fn from_date(date: NaiveDate) -> Self {
        if date.month() >= 7 {
            FinancialYear(date.year() + 1)
        } else {
            FinancialYear(date.year())
        }
    }

    /// 1 July of the previous calendar year
    #[allow(dead_code)]
    pub fn start_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0 - 1, 7, 1).unwrap_or(NaiveDate::MIN)
    }

    /// 30 June
    #[allow(dead_code)]
    pub fn end_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0, 6, 30).unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        FinancialYear::from_date(date) == *self
    }

    /// Display as "2024-25" format
    pub fn display(&self) -> String {
        format!("{}-{:02}", self.0 - 1, self.0.rem_euclid(100))
    }
}

impl std::fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Net capital gain for a financial year, worked out the way the ATO return does it:
/// losses first reduce gains that cannot be discounted, then discountable gains, and only
/// what is left of the discountable gains is halved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetCapitalGain {
    pub short_term_gains: Decimal,
    pub long_term_gains: Decimal,
    pub current_year_losses: Decimal,
    pub prior_year_losses: Decimal,
    pub losses_applied: Decimal,
    pub discount: Decimal,
    pub net_capital_gain: Decimal,
    pub losses_carried_forward: Decimal,
}

impl NetCapitalGain {
    pub fn calculate<'a, I>(records: I, prior_year_losses: Decimal) -> Self
    where
        I: IntoIterator<Item = &'a CgtRecord>,
    {
        let mut short_term_gains = Decimal::ZERO;
        let mut long_term_gains = Decimal::ZERO;
        let mut current_year_losses = Decimal::ZERO;

        for record in records {
            let gain = record.capital_gain_domestic;
            if gain < Decimal::ZERO {
                current_year_losses += -gain;
            } else if record.is_long_term {
                long_term_gains += gain;
            } else {
                short_term_gains += gain;
            }
        }

        let mut losses = current_year_losses + prior_year_losses.max(Decimal::ZERO);
        let against_short = losses.min(short_term_gains);
        losses -= against_short;
        let against_long = losses.min(long_term_gains);
        losses -= against_long;

        let remaining_long = long_term_gains - against_long;
        let discount = remaining_long * CGT_DISCOUNT_RATE;
        let net_capital_gain = (short_term_gains - against_short) + (remaining_long - discount);

        NetCapitalGain {
            short_term_gains,
            long_term_gains,
            current_year_losses,
            prior_year_losses: prior_year_losses.max(Decimal::ZERO),
            losses_applied: against_short + against_long,
            discount,
            net_capital_gain,
            losses_carried_forward: losses,
        }
    }
}
