use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain warning types emitted during ingestion and calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Warning {
    /// Symbol has no parcels at all; the sale was skipped.
    MissingCostBasis,
    /// Parcels exist but do not cover the sale; the sale was skipped.
    InsufficientCostBasis {
        #[schemars(with = "f64")]
        available: Decimal,
        #[schemars(with = "f64")]
        required: Decimal,
    },
    /// A date field matched none of the accepted formats; the row was dropped.
    InvalidDate { value: String },
    /// No exchange rate could be found; the sale was skipped.
    MissingExchangeRate { currency: String, date: NaiveDate },
    /// Statement row type was neither a buy nor a sell.
    UnknownTransactionType { value: String },
    /// Statement row could not be used.
    InvalidRow { reason: String },
    /// Commission cell was unreadable; the row was kept with the default commission.
    InvalidCommission {
        value: String,
        #[schemars(with = "f64")]
        default: Decimal,
    },
}

impl Warning {
    pub fn kind(&self) -> &'static str {
        match self {
            Warning::MissingCostBasis => "MissingCostBasis",
            Warning::InsufficientCostBasis { .. } => "InsufficientCostBasis",
            Warning::InvalidDate { .. } => "InvalidDate",
            Warning::MissingExchangeRate { .. } => "MissingExchangeRate",
            Warning::UnknownTransactionType { .. } => "UnknownTransactionType",
            Warning::InvalidRow { .. } => "InvalidRow",
            Warning::InvalidCommission { .. } => "InvalidCommission",
        }
    }

    /// Whether the warning caused a sale to be left out of the results
    pub fn skips_sale(&self) -> bool {
        matches!(
            self,
            Warning::MissingCostBasis
                | Warning::InsufficientCostBasis { .. }
                | Warning::MissingExchangeRate { .. }
        )
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingCostBasis => write!(f, "no cost basis found, sale skipped"),
            Warning::InsufficientCostBasis { available, required } => write!(
                f,
                "only {} units available to cover {} sold, sale skipped",
                available.normalize(),
                required.normalize()
            ),
            Warning::InvalidDate { value } => {
                write!(f, "could not parse date '{}', row dropped", value)
            }
            Warning::MissingExchangeRate { currency, date } => {
                write!(f, "no {}/AUD rate for {}, sale skipped", currency, date)
            }
            Warning::UnknownTransactionType { value } => {
                write!(f, "unknown transaction type '{}', row ignored", value)
            }
            Warning::InvalidRow { reason } => write!(f, "{}, row dropped", reason),
            Warning::InvalidCommission { value, default } => write!(
                f,
                "could not parse commission '{}', default {} used",
                value,
                default.normalize()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum Severity {
    Info,
    Warning,
}

/// A warning tied to the symbol and sale it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub symbol: String,
    pub sale_date: Option<NaiveDate>,
    pub warning: Warning,
    pub message: String,
}

impl Diagnostic {
    pub fn new(symbol: impl Into<String>, sale_date: Option<NaiveDate>, warning: Warning) -> Self {
        let severity = if warning.skips_sale() {
            Severity::Warning
        } else {
            Severity::Info
        };
        let symbol = symbol.into();
        let message = match sale_date {
            Some(date) => format!("{} {}: {}", symbol, date, warning),
            None if symbol.is_empty() => warning.to_string(),
            None => format!("{}: {}", symbol, warning),
        };
        Diagnostic {
            severity,
            symbol,
            sale_date,
            warning,
            message,
        }
    }
}

/// Audit record of one committed sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub severity: Severity,
    pub symbol: String,
    pub sale_date: NaiveDate,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn skipped_sales_are_warnings() {
        let date = NaiveDate::from_ymd_opt(2024, 8, 1);
        let d = Diagnostic::new(
            "MSFT",
            date,
            Warning::InsufficientCostBasis {
                available: dec!(50),
                required: dec!(80),
            },
        );
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(
            d.message,
            "MSFT 2024-08-01: only 50 units available to cover 80 sold, sale skipped"
        );

        let d = Diagnostic::new(
            "",
            None,
            Warning::UnknownTransactionType {
                value: "DIVIDEND".to_string(),
            },
        );
        assert_eq!(d.severity, Severity::Info);
        assert_eq!(d.message, "unknown transaction type 'DIVIDEND', row ignored");
    }

    #[test]
    fn warnings_serialize_tagged() {
        let json = serde_json::to_string(&Warning::MissingCostBasis).unwrap();
        assert_eq!(json, r#"{"type":"MissingCostBasis"}"#);
    }
}
