use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Position of a parcel within its symbol's pool, in insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ParcelId(pub usize);

impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("no parcels held for {0}")]
    UnknownSymbol(String),
    #[error("parcel {parcel} not found for {symbol}")]
    UnknownParcel { symbol: String, parcel: ParcelId },
    #[error("parcel {parcel} of {symbol} has {remaining} units remaining, {requested} requested")]
    InsufficientUnits {
        symbol: String,
        parcel: ParcelId,
        requested: Decimal,
        remaining: Decimal,
    },
    #[error("invalid parcel for {symbol} purchased {purchase_date}: {reason}")]
    InvalidParcel {
        symbol: String,
        purchase_date: NaiveDate,
        reason: String,
    },
}

/// One historical purchase lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: ParcelId,
    pub symbol: String,
    pub purchase_date: NaiveDate,
    pub original_units: Decimal,
    pub remaining_units: Decimal,
    /// Price per unit in the purchase currency
    pub unit_price: Decimal,
    /// Total brokerage paid on the purchase, in the purchase currency
    pub commission: Decimal,
    pub currency: String,
}

impl Parcel {
    pub fn new(
        symbol: impl Into<String>,
        purchase_date: NaiveDate,
        units: Decimal,
        unit_price: Decimal,
        commission: Decimal,
    ) -> Self {
        Parcel {
            id: ParcelId(0),
            symbol: symbol.into(),
            purchase_date,
            original_units: units,
            remaining_units: units,
            unit_price,
            commission,
            currency: "USD".to_string(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Restore a partially consumed parcel, e.g. from an exported cost basis
    pub fn with_remaining(mut self, remaining_units: Decimal) -> Self {
        self.remaining_units = remaining_units;
        self
    }

    /// Unit price plus the commission spread evenly over the original units
    pub fn cost_per_unit(&self) -> Decimal {
        if self.original_units.is_zero() {
            self.unit_price
        } else {
            self.unit_price + self.commission / self.original_units
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_units.is_zero()
    }

    fn validate(&self) -> Result<(), PoolError> {
        let invalid = |reason: &str| PoolError::InvalidParcel {
            symbol: self.symbol.clone(),
            purchase_date: self.purchase_date,
            reason: reason.to_string(),
        };
        if self.original_units <= Decimal::ZERO {
            return Err(invalid("original units must be positive"));
        }
        if self.remaining_units < Decimal::ZERO || self.remaining_units > self.original_units {
            return Err(invalid("remaining units must be between zero and original units"));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(invalid("unit price must not be negative"));
        }
        if self.commission < Decimal::ZERO {
            return Err(invalid("commission must not be negative"));
        }
        Ok(())
    }
}

/// Units to take from one parcel, as decided by a selector
pub trait Consumption {
    fn parcel_id(&self) -> ParcelId;
    fn units(&self) -> Decimal;
}

/// Per-symbol collection of purchase parcels.
///
/// Parcels are never removed: an exhausted parcel stays in place with zero remaining
/// units so the pool keeps the full purchase history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParcelPool {
    parcels: BTreeMap<String, Vec<Parcel>>,
}

impl ParcelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parcel to the end of its symbol's pool, assigning its id
    pub fn add(&mut self, mut parcel: Parcel) -> Result<ParcelId, PoolError> {
        parcel.validate()?;
        let parcels = self.parcels.entry(parcel.symbol.clone()).or_default();
        let id = ParcelId(parcels.len());
        parcel.id = id;
        log::debug!(
            "Pool {} ADD {}: {} units @ {} + {} commission ({})",
            parcel.symbol,
            id,
            parcel.remaining_units,
            parcel.unit_price,
            parcel.commission,
            parcel.purchase_date
        );
        parcels.push(parcel);
        Ok(id)
    }

    pub fn get(&self, symbol: &str) -> Option<&[Parcel]> {
        self.parcels.get(symbol).map(Vec::as_slice)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.parcels.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Parcel])> {
        self.parcels.iter().map(|(s, p)| (s.as_str(), p.as_slice()))
    }

    #[allow(dead_code)]
    pub fn available_units(&self, symbol: &str) -> Decimal {
        self.get(symbol)
            .map(|parcels| parcels.iter().map(|p| p.remaining_units).sum())
            .unwrap_or(Decimal::ZERO)
    }

    /// Remove units from a single parcel
    pub fn consume(&mut self, symbol: &str, parcel_id: ParcelId, units: Decimal) -> Result<(), PoolError> {
        let parcel = self.parcel_mut(symbol, parcel_id)?;
        if units > parcel.remaining_units {
            return Err(PoolError::InsufficientUnits {
                symbol: symbol.to_string(),
                parcel: parcel_id,
                requested: units,
                remaining: parcel.remaining_units,
            });
        }
        parcel.remaining_units -= units;
        log::debug!(
            "Pool {} REMOVE {}: {} units. Remaining: {}",
            symbol,
            parcel_id,
            units,
            parcel.remaining_units
        );
        Ok(())
    }

    /// Apply every consumption for one sale, or none of them.
    ///
    /// All slices are checked against the current remaining units (summing slices that
    /// hit the same parcel) before the first mutation.
    pub fn consume_all<C: Consumption>(&mut self, symbol: &str, slices: &[C]) -> Result<(), PoolError> {
        let parcels = self
            .get(symbol)
            .ok_or_else(|| PoolError::UnknownSymbol(symbol.to_string()))?;

        let mut requested: BTreeMap<ParcelId, Decimal> = BTreeMap::new();
        for slice in slices {
            *requested.entry(slice.parcel_id()).or_insert(Decimal::ZERO) += slice.units();
        }
        for (&parcel_id, &units) in &requested {
            let parcel = parcels.get(parcel_id.0).ok_or_else(|| PoolError::UnknownParcel {
                symbol: symbol.to_string(),
                parcel: parcel_id,
            })?;
            if units > parcel.remaining_units {
                return Err(PoolError::InsufficientUnits {
                    symbol: symbol.to_string(),
                    parcel: parcel_id,
                    requested: units,
                    remaining: parcel.remaining_units,
                });
            }
        }

        for (parcel_id, units) in requested {
            self.consume(symbol, parcel_id, units)?;
        }
        Ok(())
    }

    fn parcel_mut(&mut self, symbol: &str, parcel_id: ParcelId) -> Result<&mut Parcel, PoolError> {
        self.parcels
            .get_mut(symbol)
            .ok_or_else(|| PoolError::UnknownSymbol(symbol.to_string()))?
            .get_mut(parcel_id.0)
            .ok_or_else(|| PoolError::UnknownParcel {
                symbol: symbol.to_string(),
                parcel: parcel_id,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn pool() -> ParcelPool {
        let mut pool = ParcelPool::new();
        pool.add(Parcel::new("AAPL", date("2023-01-10"), dec!(100), dec!(150), dec!(10)))
            .unwrap();
        pool.add(Parcel::new("AAPL", date("2023-06-10"), dec!(50), dec!(200), dec!(0)))
            .unwrap();
        pool
    }

    struct Slice(ParcelId, Decimal);

    impl Consumption for Slice {
        fn parcel_id(&self) -> ParcelId {
            self.0
        }
        fn units(&self) -> Decimal {
            self.1
        }
    }

    #[test]
    fn cost_per_unit_spreads_commission() {
        let parcel = Parcel::new("AAPL", date("2023-01-10"), dec!(100), dec!(150), dec!(10));
        assert_eq!(parcel.cost_per_unit(), dec!(150.1));
    }

    #[test]
    fn ids_follow_insertion_order() {
        let pool = pool();
        let ids: Vec<_> = pool.get("AAPL").unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ParcelId(0), ParcelId(1)]);
        assert_eq!(pool.available_units("AAPL"), dec!(150));
        assert_eq!(pool.available_units("MSFT"), Decimal::ZERO);
    }

    #[test]
    fn consume_reduces_remaining_and_keeps_exhausted_parcels() {
        let mut pool = pool();
        pool.consume("AAPL", ParcelId(1), dec!(50)).unwrap();
        let parcels = pool.get("AAPL").unwrap();
        assert_eq!(parcels.len(), 2);
        assert!(parcels[1].is_exhausted());
        assert_eq!(parcels[1].original_units, dec!(50));
    }

    #[test]
    fn consume_more_than_remaining_fails() {
        let mut pool = pool();
        let err = pool.consume("AAPL", ParcelId(1), dec!(51)).unwrap_err();
        assert!(matches!(err, PoolError::InsufficientUnits { .. }));
        assert_eq!(pool.available_units("AAPL"), dec!(150));
    }

    #[test]
    fn consume_all_is_all_or_nothing() {
        let mut pool = pool();
        let slices = vec![Slice(ParcelId(0), dec!(100)), Slice(ParcelId(1), dec!(60))];
        assert!(pool.consume_all("AAPL", &slices).is_err());
        assert_eq!(pool.available_units("AAPL"), dec!(150));

        let slices = vec![Slice(ParcelId(0), dec!(100)), Slice(ParcelId(1), dec!(20))];
        pool.consume_all("AAPL", &slices).unwrap();
        assert_eq!(pool.available_units("AAPL"), dec!(30));
    }

    #[test]
    fn consume_all_sums_slices_of_the_same_parcel() {
        let mut pool = pool();
        let slices = vec![Slice(ParcelId(1), dec!(30)), Slice(ParcelId(1), dec!(30))];
        assert!(matches!(
            pool.consume_all("AAPL", &slices),
            Err(PoolError::InsufficientUnits { .. })
        ));
    }

    #[test]
    fn rejects_invalid_parcels() {
        let mut pool = ParcelPool::new();
        let zero = Parcel::new("AAPL", date("2023-01-10"), dec!(0), dec!(150), dec!(0));
        assert!(matches!(pool.add(zero), Err(PoolError::InvalidParcel { .. })));

        let over = Parcel::new("AAPL", date("2023-01-10"), dec!(10), dec!(150), dec!(0))
            .with_remaining(dec!(11));
        assert!(matches!(pool.add(over), Err(PoolError::InvalidParcel { .. })));
        assert!(pool.get("AAPL").is_none());
    }
}
