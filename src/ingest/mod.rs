//! Broker statement ingestion: CSV exports into parcels and sales

pub mod cost_basis;
pub mod dates;

use crate::core::{Diagnostic, Parcel, ParcelPool, PoolError, Sale, Warning};
use aucgt_derive::CsvSchema;
use dates::DateParser;
use rust_decimal::Decimal;
use std::io::Read;
use std::str::FromStr;

pub use cost_basis::{CostBasisFile, ParcelRecord};

const BUY_TYPES: &[&str] = &["BUY", "PURCHASE", "PURCHASED", "ACQUIRED", "B", "BOUGHT", "LONG"];
const SELL_TYPES: &[&str] = &["SELL", "SOLD", "SALE", "S", "SHORT"];

/// Column description generated by `#[derive(CsvSchema)]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvField {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
    pub description: &'static str,
}

impl CsvField {
    fn matches(&self, header: &str) -> bool {
        let header = header.trim();
        header.eq_ignore_ascii_case(self.name)
            || self.aliases.iter().any(|a| header.eq_ignore_ascii_case(a))
    }
}

/// One row of a broker statement, mapped onto canonical columns
#[derive(Debug, Clone, Default, PartialEq, Eq, CsvSchema)]
pub struct StatementRow {
    /// Ticker of the security traded
    #[csv(alias = "Symbol", alias = "Ticker", alias = "Stock", alias = "Security")]
    pub symbol: String,
    /// Trade date, in any of the accepted date formats
    #[csv(alias = "Trade Date", alias = "Date", alias = "Transaction Date", alias = "Execution Date")]
    pub date: String,
    /// BUY or SELL (or a broker synonym)
    #[csv(
        alias = "Type",
        alias = "Transaction Type",
        alias = "Action",
        alias = "Side",
        alias = "Activity Type",
        alias = "Activity_Type"
    )]
    pub r#type: String,
    /// Units traded; sign is ignored
    #[csv(alias = "Quantity", alias = "Shares", alias = "Units", alias = "Qty")]
    pub quantity: String,
    /// Price per unit in the trade currency
    #[csv(
        alias = "Price (USD)",
        alias = "Price",
        alias = "Unit Price",
        alias = "Execution Price",
        alias = "Price_USD",
        alias = "Price USD",
        alias = "Price (AUD)",
        alias = "Price AUD"
    )]
    pub price: String,
    /// Brokerage for the trade; sign is ignored
    #[csv(
        alias = "Commission (USD)",
        alias = "Commission",
        alias = "Fees",
        alias = "Commission & Fees",
        alias = "Commission_USD",
        alias = "Commission USD",
        alias = "Commission (AUD)"
    )]
    pub commission: Option<String>,
    /// ISO currency code of the trade; defaults from the price column header
    #[csv(alias = "Currency", alias = "CCY")]
    pub currency: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{source_name}: required column '{column}' not found (accepted headers: {aliases})")]
    MissingColumn {
        source_name: String,
        column: &'static str,
        aliases: String,
    },
    #[error("{source_name}: {error}")]
    Csv {
        source_name: String,
        #[source]
        error: csv::Error,
    },
}

/// Position of each canonical column in one file's header
struct ColumnMap {
    indices: Vec<Option<usize>>,
    currency: String,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord, source_name: &str) -> Result<Self, IngestError> {
        let schema = StatementRow::csv_schema();
        let mut indices = Vec::with_capacity(schema.len());
        for field in schema {
            let index = headers.iter().position(|h| field.matches(h));
            if index.is_none() && field.required {
                return Err(IngestError::MissingColumn {
                    source_name: source_name.to_string(),
                    column: field.name,
                    aliases: field.aliases.join(", "),
                });
            }
            indices.push(index);
        }

        let price_header = schema
            .iter()
            .zip(&indices)
            .find(|(field, _)| field.name == "price")
            .and_then(|(_, index)| index.and_then(|i| headers.get(i)))
            .unwrap_or_default();
        let currency = if price_header.to_uppercase().contains("AUD") {
            "AUD"
        } else {
            "USD"
        };
        log::debug!("{}: prices read as {}", source_name, currency);

        Ok(ColumnMap {
            indices,
            currency: currency.to_string(),
        })
    }

    fn row(&self, record: &csv::StringRecord) -> StatementRow {
        let get = |i: usize| {
            self.indices[i]
                .and_then(|idx| record.get(idx))
                .map(|v| v.trim().to_string())
        };
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        StatementRow {
            symbol: get(0).unwrap_or_default().to_uppercase(),
            date: get(1).unwrap_or_default(),
            r#type: get(2).unwrap_or_default(),
            quantity: get(3).unwrap_or_default(),
            price: get(4).unwrap_or_default(),
            commission: non_empty(get(5)),
            currency: non_empty(get(6)),
        }
    }
}

/// Normalized output of one or more statements
#[derive(Debug, Clone, Default)]
pub struct Statement {
    pub pool: ParcelPool,
    pub sales: Vec<Sale>,
    pub warnings: Vec<Diagnostic>,
}

/// Accumulates buys and sells across statement files
#[derive(Debug, Clone)]
pub struct StatementReader {
    dates: DateParser,
    default_commission: Decimal,
    buys: Vec<Parcel>,
    sales: Vec<Sale>,
    warnings: Vec<Diagnostic>,
}

impl StatementReader {
    pub fn new(default_commission: Decimal) -> Self {
        StatementReader {
            dates: DateParser::default(),
            default_commission,
            buys: Vec::new(),
            sales: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn read<R: Read>(&mut self, reader: R, source_name: &str) -> Result<(), IngestError> {
        let csv_err = |error| IngestError::Csv {
            source_name: source_name.to_string(),
            error,
        };
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = rdr.headers().map_err(csv_err)?.clone();
        let columns = ColumnMap::from_headers(&headers, source_name)?;

        let (mut buys, mut sells) = (0, 0);
        for record in rdr.records() {
            let record = record.map_err(csv_err)?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            let row = columns.row(&record);
            match self.classify(row, &columns.currency) {
                Some(Trade::Buy(parcel)) => {
                    buys += 1;
                    self.buys.push(parcel);
                }
                Some(Trade::Sell(sale)) => {
                    sells += 1;
                    self.sales.push(sale);
                }
                None => {}
            }
        }
        log::info!("{}: {} buys, {} sells", source_name, buys, sells);
        Ok(())
    }

    /// Build the pool on top of `opening` (e.g. an imported cost basis)
    pub fn finish(self, opening: ParcelPool) -> Result<Statement, PoolError> {
        let mut pool = opening;
        let mut buys = self.buys;
        buys.sort_by_key(|p| p.purchase_date);
        for parcel in buys {
            pool.add(parcel)?;
        }
        let mut sales = self.sales;
        sales.sort_by_key(|s| s.sale_date);
        Ok(Statement {
            pool,
            sales,
            warnings: self.warnings,
        })
    }

    fn classify(&mut self, row: StatementRow, default_currency: &str) -> Option<Trade> {
        let kind = row.r#type.trim().to_uppercase();
        let is_buy = BUY_TYPES.contains(&kind.as_str());
        if !is_buy && !SELL_TYPES.contains(&kind.as_str()) {
            self.warn(&row.symbol, Warning::UnknownTransactionType { value: row.r#type });
            return None;
        }
        if row.symbol.is_empty() {
            self.warn(
                "",
                Warning::InvalidRow {
                    reason: format!("{} row without a symbol", kind),
                },
            );
            return None;
        }

        let date = match self.dates.parse(&row.date) {
            Ok(date) => date,
            Err(_) => {
                self.warn(&row.symbol, Warning::InvalidDate { value: row.date });
                return None;
            }
        };
        let (Some(quantity), Some(price)) = (parse_amount(&row.quantity), parse_amount(&row.price))
        else {
            self.warn(
                &row.symbol,
                Warning::InvalidRow {
                    reason: format!("unreadable quantity '{}' or price '{}'", row.quantity, row.price),
                },
            );
            return None;
        };
        let units = quantity.abs();
        let currency = row
            .currency
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| default_currency.to_string());

        if units.is_zero() || price < Decimal::ZERO || (is_buy && price.is_zero()) {
            self.warn(
                &row.symbol,
                Warning::InvalidRow {
                    reason: format!("{} {} with units={} price={}", kind, date, units, price),
                },
            );
            return None;
        }

        let commission = match row.commission.as_deref() {
            None => self.default_commission,
            Some(cell) => match parse_amount(cell) {
                Some(c) => c.abs(),
                None => {
                    let warning = Warning::InvalidCommission {
                        value: cell.to_string(),
                        default: self.default_commission,
                    };
                    self.warn(&row.symbol, warning);
                    self.default_commission
                }
            },
        };

        if is_buy {
            let parcel = Parcel::new(row.symbol, date, units, price, commission).with_currency(currency);
            Some(Trade::Buy(parcel))
        } else {
            let sale = Sale::new(row.symbol, date, units, price, commission).with_currency(currency);
            Some(Trade::Sell(sale))
        }
    }

    fn warn(&mut self, symbol: &str, warning: Warning) {
        let diagnostic = Diagnostic::new(symbol, None, warning);
        log::warn!("{}", diagnostic.message);
        self.warnings.push(diagnostic);
    }
}

enum Trade {
    Buy(Parcel),
    Sell(Sale),
}

/// Broker amounts: "$1,234.50", "-3", "(12.00)"
fn parse_amount(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let cleaned: String = s.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    let cleaned = cleaned.trim_start_matches("A").trim_start_matches("US");
    let value = Decimal::from_str(cleaned)
        .or_else(|_| Decimal::from_scientific(cleaned))
        .ok()?;
    Some(if negative { -value } else { value })
}
