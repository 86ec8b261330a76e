//! Currency conversion to AUD

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::str::FromStr;

/// Days to look back for a published rate when a date has none (weekends, holidays)
pub const MAX_LOOKBACK_DAYS: i64 = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateError {
    #[error("no {currency}/AUD rate for {date} or the {lookback} days before")]
    NoRate {
        currency: String,
        date: NaiveDate,
        lookback: i64,
    },
    #[error("unsupported currency {0}")]
    UnsupportedCurrency(String),
    #[error("no exchange rates found in rate file")]
    Empty,
}

/// Source of exchange rates into AUD
pub trait RateSource {
    /// Multiplier converting one unit of `currency` into AUD on `date`
    fn rate(&self, currency: &str, date: NaiveDate) -> Result<Decimal, RateError>;
}

/// Same rate for every date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRate(pub Decimal);

impl RateSource for FixedRate {
    fn rate(&self, currency: &str, _date: NaiveDate) -> Result<Decimal, RateError> {
        if currency.eq_ignore_ascii_case("AUD") {
            Ok(Decimal::ONE)
        } else {
            Ok(self.0)
        }
    }
}

/// Daily rates as published by the Reserve Bank of Australia, quoted as
/// foreign currency per one AUD.
#[derive(Debug, Clone, Default)]
pub struct RbaRates {
    rates: HashMap<String, BTreeMap<NaiveDate, Decimal>>,
}

impl RbaRates {
    /// Read an RBA historical rates CSV for `currency`.
    ///
    /// Metadata lines (Title, Description, Series ID, ...) are skipped: a row is data
    /// when its first field is a date and its second a positive number.
    #[allow(dead_code)]
    pub fn read_csv<R: Read>(reader: R, currency: &str) -> anyhow::Result<RbaRates> {
        let mut rates = RbaRates::default();
        rates.extend_csv(reader, currency)?;
        Ok(rates)
    }

    /// Add the rates in another RBA file. Dates already loaded take the newer file's quote.
    pub fn extend_csv<R: Read>(&mut self, reader: R, currency: &str) -> anyhow::Result<()> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let series = self.rates.entry(currency.to_uppercase()).or_default();
        let mut loaded = 0;
        for record in rdr.records() {
            let record = record?;
            let (Some(date), Some(rate)) = (record.get(0), record.get(1)) else {
                continue;
            };
            let Some(date) = parse_rba_date(date.trim()) else {
                continue;
            };
            match Decimal::from_str(rate.trim()) {
                Ok(rate) if rate > Decimal::ZERO => {
                    series.insert(date, rate);
                    loaded += 1;
                }
                _ => log::debug!("Skipping RBA row for {} with rate '{}'", date, rate),
            }
        }

        if loaded == 0 {
            return Err(RateError::Empty.into());
        }
        if let (Some((first, _)), Some((last, _))) = (series.first_key_value(), series.last_key_value()) {
            log::info!(
                "Loaded {} {}/AUD rates covering {} to {}",
                loaded,
                currency.to_uppercase(),
                first,
                last
            );
        }
        Ok(())
    }

    #[allow(dead_code)]
    pub fn insert(&mut self, currency: &str, date: NaiveDate, foreign_per_aud: Decimal) {
        self.rates
            .entry(currency.to_uppercase())
            .or_default()
            .insert(date, foreign_per_aud);
    }

    /// Published quote for `date`, falling back to the most recent earlier quote
    fn quote(&self, currency: &str, date: NaiveDate) -> Result<(NaiveDate, Decimal), RateError> {
        let series = self
            .rates
            .get(&currency.to_uppercase())
            .ok_or_else(|| RateError::UnsupportedCurrency(currency.to_string()))?;
        let earliest = date - Duration::days(MAX_LOOKBACK_DAYS);
        series
            .range(earliest..=date)
            .next_back()
            .map(|(d, r)| (*d, *r))
            .ok_or_else(|| RateError::NoRate {
                currency: currency.to_string(),
                date,
                lookback: MAX_LOOKBACK_DAYS,
            })
    }
}

impl RateSource for RbaRates {
    fn rate(&self, currency: &str, date: NaiveDate) -> Result<Decimal, RateError> {
        if currency.eq_ignore_ascii_case("AUD") {
            return Ok(Decimal::ONE);
        }
        let (quoted, foreign_per_aud) = self.quote(currency, date)?;
        if quoted != date {
            log::debug!("No {} rate for {}, using {} from {}", currency, date, foreign_per_aud, quoted);
        }
        Ok(Decimal::ONE / foreign_per_aud)
    }
}

fn parse_rba_date(s: &str) -> Option<NaiveDate> {
    ["%d-%b-%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const RBA_CSV: &str = "\
F11 EXCHANGE RATES,,
Title,AUD/USD Exchange Rate,Trade-weighted Index
Description,AUD/USD,TWI
Frequency,Daily,Daily
Series ID,FXRUSD,FXRTWI
,,
02-Jan-2024,0.6800,62.1
03-Jan-2024,0.6750,61.9
05-Jan-2024,0.6400,61.0
";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn reads_rba_file_skipping_metadata() {
        let rates = RbaRates::read_csv(RBA_CSV.as_bytes(), "usd").unwrap();
        assert_eq!(rates.rate("USD", date("2024-01-05")).unwrap(), dec!(1) / dec!(0.64));
        assert_eq!(rates.rate("USD", date("2024-01-05")).unwrap(), dec!(1.5625));
    }

    #[test]
    fn missing_days_use_previous_rate() {
        let rates = RbaRates::read_csv(RBA_CSV.as_bytes(), "USD").unwrap();
        assert_eq!(
            rates.rate("USD", date("2024-01-04")).unwrap(),
            rates.rate("USD", date("2024-01-03")).unwrap()
        );
        assert_eq!(
            rates.rate("USD", date("2024-01-15")).unwrap(),
            rates.rate("USD", date("2024-01-05")).unwrap()
        );
    }

    #[test]
    fn lookback_is_bounded() {
        let rates = RbaRates::read_csv(RBA_CSV.as_bytes(), "USD").unwrap();
        assert!(matches!(
            rates.rate("USD", date("2024-01-16")),
            Err(RateError::NoRate { .. })
        ));
        assert!(matches!(
            rates.rate("USD", date("2023-12-31")),
            Err(RateError::NoRate { .. })
        ));
    }

    #[test]
    fn aud_and_unknown_currencies() {
        let rates = RbaRates::read_csv(RBA_CSV.as_bytes(), "USD").unwrap();
        assert_eq!(rates.rate("AUD", date("1999-01-01")).unwrap(), Decimal::ONE);
        assert_eq!(
            rates.rate("EUR", date("2024-01-05")),
            Err(RateError::UnsupportedCurrency("EUR".to_string()))
        );
    }

    #[test]
    fn empty_file_is_an_error() {
        assert!(RbaRates::read_csv("Title,AUD/USD\n".as_bytes(), "USD").is_err());
    }

    #[test]
    fn rate_files_are_merged() {
        let older = "\
Series ID,FXRUSD
28-Jun-2019,0.7013
01-Jul-2019,0.6979
";
        let mut rates = RbaRates::read_csv(older.as_bytes(), "USD").unwrap();
        rates.extend_csv(RBA_CSV.as_bytes(), "USD").unwrap();

        assert_eq!(rates.rate("USD", date("2019-07-01")).unwrap(), dec!(1) / dec!(0.6979));
        assert_eq!(rates.rate("USD", date("2024-01-03")).unwrap(), dec!(1) / dec!(0.6750));
        // lookback does not bridge the gap between the files
        assert!(matches!(
            rates.rate("USD", date("2020-01-01")),
            Err(RateError::NoRate { .. })
        ));
    }

    #[test]
    fn extending_with_an_empty_file_is_an_error() {
        let mut rates = RbaRates::read_csv(RBA_CSV.as_bytes(), "USD").unwrap();
        assert!(rates.extend_csv("Title,AUD/USD\n".as_bytes(), "USD").is_err());
        assert_eq!(rates.rate("USD", date("2024-01-05")).unwrap(), dec!(1.5625));
    }

    #[test]
    fn fixed_rate_leaves_aud_alone() {
        let rate = FixedRate(dec!(1.5));
        assert_eq!(rate.rate("USD", date("2024-01-05")).unwrap(), dec!(1.5));
        assert_eq!(rate.rate("aud", date("2024-01-05")).unwrap(), Decimal::ONE);
    }
}
