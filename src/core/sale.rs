use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One disposal event to be taxed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub symbol: String,
    pub sale_date: NaiveDate,
    pub units_sold: Decimal,
    /// Price per unit in the sale currency
    pub sale_price: Decimal,
    /// Total brokerage paid on the sale, in the sale currency
    pub commission: Decimal,
    pub currency: String,
}

impl Sale {
    pub fn new(
        symbol: impl Into<String>,
        sale_date: NaiveDate,
        units_sold: Decimal,
        sale_price: Decimal,
        commission: Decimal,
    ) -> Self {
        Sale {
            symbol: symbol.into(),
            sale_date,
            units_sold,
            sale_price,
            commission,
            currency: "USD".to_string(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Returns the first broken input contract, if any
    pub fn contract_violation(&self) -> Option<&'static str> {
        if self.units_sold <= Decimal::ZERO {
            Some("units sold must be positive")
        } else if self.sale_price < Decimal::ZERO {
            Some("sale price must not be negative")
        } else if self.commission < Decimal::ZERO {
            Some("commission must not be negative")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn contract_violations() {
        let date = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
        assert_eq!(Sale::new("AAPL", date, dec!(10), dec!(1), dec!(0)).contract_violation(), None);
        assert!(Sale::new("AAPL", date, dec!(0), dec!(1), dec!(0))
            .contract_violation()
            .is_some());
        assert!(Sale::new("AAPL", date, dec!(10), dec!(-1), dec!(0))
            .contract_violation()
            .is_some());
        assert!(Sale::new("AAPL", date, dec!(10), dec!(1), dec!(-5))
            .contract_violation()
            .is_some());
    }
}
