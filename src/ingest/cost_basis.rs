//! Cost-basis JSON: parcels carried in from earlier years, and the pool left after a run

use crate::core::{Parcel, ParcelPool, PoolError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// A purchase parcel as stored in a cost-basis file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParcelRecord {
    /// Date the parcel was bought (YYYY-MM-DD)
    pub purchase_date: NaiveDate,
    /// Units bought
    #[schemars(with = "f64")]
    pub original_units: Decimal,
    /// Units still held; defaults to `original_units`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<f64>")]
    pub remaining_units: Option<Decimal>,
    /// Price per unit in the purchase currency
    #[schemars(with = "f64")]
    pub unit_price: Decimal,
    /// Total brokerage paid on the purchase
    #[serde(default)]
    #[schemars(with = "f64")]
    pub commission: Decimal,
    /// Purchase currency; defaults to USD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ParcelRecord {
    fn into_parcel(self, symbol: &str) -> Parcel {
        let parcel = Parcel::new(symbol, self.purchase_date, self.original_units, self.unit_price, self.commission)
            .with_remaining(self.remaining_units.unwrap_or(self.original_units));
        match self.currency {
            Some(currency) => parcel.with_currency(currency.to_uppercase()),
            None => parcel,
        }
    }
}

impl From<&Parcel> for ParcelRecord {
    fn from(parcel: &Parcel) -> Self {
        ParcelRecord {
            purchase_date: parcel.purchase_date,
            original_units: parcel.original_units,
            remaining_units: Some(parcel.remaining_units),
            unit_price: parcel.unit_price,
            commission: parcel.commission,
            currency: Some(parcel.currency.clone()),
        }
    }
}

/// Parcels keyed by symbol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CostBasisFile(pub BTreeMap<String, Vec<ParcelRecord>>);

impl CostBasisFile {
    pub fn read_json<R: Read>(reader: R) -> anyhow::Result<Self> {
        let file: CostBasisFile = serde_json::from_reader(reader)?;
        Ok(file)
    }

    pub fn write_json<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Snapshot of a pool. Exhausted parcels are left out when `held_only` is set.
    pub fn from_pool(pool: &ParcelPool, held_only: bool) -> Self {
        let parcels = pool
            .iter()
            .map(|(symbol, parcels)| {
                let records = parcels
                    .iter()
                    .filter(|p| !held_only || !p.is_exhausted())
                    .map(ParcelRecord::from)
                    .collect::<Vec<_>>();
                (symbol.to_string(), records)
            })
            .filter(|(_, records)| !records.is_empty())
            .collect();
        CostBasisFile(parcels)
    }

    /// Build a pool; within each symbol parcels keep chronological order.
    pub fn into_pool(self) -> Result<ParcelPool, PoolError> {
        let mut pool = ParcelPool::new();
        for (symbol, mut records) in self.0 {
            let symbol = symbol.trim().to_uppercase();
            records.sort_by_key(|r| r.purchase_date);
            for record in records {
                pool.add(record.into_parcel(&symbol))?;
            }
        }
        log::info!("Loaded cost basis for {} symbols", pool.symbols().count());
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const COST_BASIS: &str = r#"{
        "aapl": [
            { "purchase_date": "2023-03-01", "original_units": "100", "unit_price": "150.00", "commission": "10" },
            { "purchase_date": "2022-01-10", "original_units": 50, "remaining_units": 20, "unit_price": 120.5 }
        ],
        "CBA": [
            { "purchase_date": "2021-07-01", "original_units": "10", "unit_price": "95", "currency": "aud" }
        ]
    }"#;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn reads_parcels_in_date_order() {
        let pool = CostBasisFile::read_json(COST_BASIS.as_bytes())
            .unwrap()
            .into_pool()
            .unwrap();

        let aapl = pool.get("AAPL").unwrap();
        assert_eq!(aapl.len(), 2);
        assert_eq!(aapl[0].purchase_date, date("2022-01-10"));
        assert_eq!(aapl[0].remaining_units, dec!(20));
        assert_eq!(aapl[0].commission, Decimal::ZERO);
        assert_eq!(aapl[1].remaining_units, dec!(100));
        assert_eq!(aapl[1].currency, "USD");

        assert_eq!(pool.get("CBA").unwrap()[0].currency, "AUD");
    }

    #[test]
    fn rejects_remaining_above_original() {
        let json = r#"{ "X": [ { "purchase_date": "2023-01-01", "original_units": "1", "remaining_units": "2", "unit_price": "1" } ] }"#;
        let result = CostBasisFile::read_json(json.as_bytes()).unwrap().into_pool();
        assert!(matches!(result, Err(PoolError::InvalidParcel { .. })));
    }

    #[test]
    fn export_skips_exhausted_parcels() {
        let mut pool = ParcelPool::new();
        let gone = pool
            .add(Parcel::new("AAPL", date("2023-01-01"), dec!(5), dec!(100), dec!(0)))
            .unwrap();
        pool.add(Parcel::new("AAPL", date("2023-02-01"), dec!(5), dec!(110), dec!(1)))
            .unwrap();
        pool.consume("AAPL", gone, dec!(5)).unwrap();

        let held = CostBasisFile::from_pool(&pool, true);
        assert_eq!(held.0["AAPL"].len(), 1);
        assert_eq!(held.0["AAPL"][0].purchase_date, date("2023-02-01"));

        let all = CostBasisFile::from_pool(&pool, false);
        assert_eq!(all.0["AAPL"].len(), 2);

        let mut out = Vec::new();
        held.write_json(&mut out).unwrap();
        let reloaded = CostBasisFile::read_json(out.as_slice()).unwrap().into_pool().unwrap();
        assert_eq!(reloaded.available_units("AAPL"), dec!(5));
    }
}
