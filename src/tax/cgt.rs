use crate::core::{Diagnostic, LogEntry, ParcelPool, PoolError, Sale, Severity, Warning};
use crate::fx::RateSource;
use crate::tax::au::FinancialYear;
use crate::tax::gain::{self, CgtRecord, ParcelSlice};
use crate::tax::selector::{Allocation, ParcelSelector, SelectionError, SelectionPhase, Strategy};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Conditions that abort a run: they mean the input was never properly validated
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid sale of {symbol} on {date}: {reason}")]
    InvalidSale {
        symbol: String,
        date: NaiveDate,
        reason: String,
    },
    #[error("cost basis pool rejected an allocation: {0}")]
    Pool(#[from] PoolError),
}

/// Progress of one sale through the engine
#[derive(Debug)]
enum SaleState {
    Pending,
    Validated,
    Allocated(Vec<Allocation>),
    Computed(Vec<Allocation>, Vec<CgtRecord>),
    Committed,
    Skipped(Warning),
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct CgtReport {
    pub strategy: Strategy,
    pub records: Vec<CgtRecord>,
    /// Pool after every committed sale; exhausted parcels are kept
    pub pool: ParcelPool,
    pub warnings: Vec<Diagnostic>,
    pub logs: Vec<LogEntry>,
}

/// Calculate CGT for `sales`, in order, consuming parcels from `pool`.
///
/// Data problems skip the affected sale and are reported in `warnings`; only contract
/// violations (non-positive units, negative prices) fail the run.
pub fn calculate_cgt(
    sales: &[Sale],
    pool: ParcelPool,
    strategy: Strategy,
    rates: &dyn RateSource,
) -> Result<CgtReport, EngineError> {
    log::info!("Calculating CGT for {} sales using {} selection", sales.len(), strategy);

    let mut engine = Engine {
        strategy,
        rates,
        pool,
        records: Vec::new(),
        warnings: Vec::new(),
        logs: Vec::new(),
    };
    for sale in sales {
        engine.process(sale)?;
    }

    log::info!(
        "Processed {} sales: {} records, {} warnings",
        sales.len(),
        engine.records.len(),
        engine.warnings.len()
    );

    Ok(CgtReport {
        strategy,
        records: engine.records,
        pool: engine.pool,
        warnings: engine.warnings,
        logs: engine.logs,
    })
}

struct Engine<'a> {
    strategy: Strategy,
    rates: &'a dyn RateSource,
    pool: ParcelPool,
    records: Vec<CgtRecord>,
    warnings: Vec<Diagnostic>,
    logs: Vec<LogEntry>,
}

impl Engine<'_> {
    fn process(&mut self, sale: &Sale) -> Result<(), EngineError> {
        log::debug!(
            "Sale {} {}: {} units @ {} {}",
            sale.symbol,
            sale.sale_date,
            sale.units_sold,
            sale.sale_price,
            sale.currency
        );
        let mut state = SaleState::Pending;
        loop {
            state = match state {
                SaleState::Committed => return Ok(()),
                SaleState::Skipped(warning) => {
                    self.skip(sale, warning);
                    return Ok(());
                }
                state => self.step(sale, state)?,
            };
        }
    }

    fn step(&mut self, sale: &Sale, state: SaleState) -> Result<SaleState, EngineError> {
        let next = match state {
            SaleState::Pending => self.validate(sale)?,
            SaleState::Validated => self.allocate(sale),
            SaleState::Allocated(allocations) => self.compute(sale, allocations)?,
            SaleState::Computed(allocations, records) => self.commit(sale, &allocations, records)?,
            terminal => terminal,
        };
        Ok(next)
    }

    fn validate(&self, sale: &Sale) -> Result<SaleState, EngineError> {
        if let Some(reason) = sale.contract_violation() {
            return Err(EngineError::InvalidSale {
                symbol: sale.symbol.clone(),
                date: sale.sale_date,
                reason: reason.to_string(),
            });
        }
        match self.pool.get(&sale.symbol) {
            Some(parcels) if !parcels.is_empty() => Ok(SaleState::Validated),
            _ => Ok(SaleState::Skipped(Warning::MissingCostBasis)),
        }
    }

    fn allocate(&self, sale: &Sale) -> SaleState {
        let parcels = self.pool.get(&sale.symbol).unwrap_or_default();
        match self.strategy.allocate(parcels, sale.units_sold, sale.sale_date) {
            Ok(allocations) => SaleState::Allocated(allocations),
            Err(SelectionError::InsufficientCostBasis { available, required }) => {
                SaleState::Skipped(Warning::InsufficientCostBasis { available, required })
            }
        }
    }

    fn compute(&self, sale: &Sale, allocations: Vec<Allocation>) -> Result<SaleState, EngineError> {
        let sale_rate = match self.rates.rate(&sale.currency, sale.sale_date) {
            Ok(rate) => rate,
            Err(err) => {
                log::warn!("{}", err);
                return Ok(SaleState::Skipped(Warning::MissingExchangeRate {
                    currency: sale.currency.clone(),
                    date: sale.sale_date,
                }));
            }
        };
        let parcels = self.pool.get(&sale.symbol).unwrap_or_default();

        let mut records = Vec::with_capacity(allocations.len());
        for allocation in &allocations {
            let parcel = parcels.get(allocation.parcel_id.0).ok_or_else(|| PoolError::UnknownParcel {
                symbol: sale.symbol.clone(),
                parcel: allocation.parcel_id,
            })?;
            let purchase_rate = match self.rates.rate(&parcel.currency, parcel.purchase_date) {
                Ok(rate) => rate,
                Err(err) => {
                    log::warn!("{}", err);
                    return Ok(SaleState::Skipped(Warning::MissingExchangeRate {
                        currency: parcel.currency.clone(),
                        date: parcel.purchase_date,
                    }));
                }
            };
            let slice = ParcelSlice {
                parcel,
                units: allocation.units,
                phase: allocation.phase,
            };
            records.push(gain::compute(&slice, sale, purchase_rate, sale_rate));
        }
        Ok(SaleState::Computed(allocations, records))
    }

    fn commit(
        &mut self,
        sale: &Sale,
        allocations: &[Allocation],
        records: Vec<CgtRecord>,
    ) -> Result<SaleState, EngineError> {
        self.pool.consume_all(&sale.symbol, allocations)?;

        let message = describe(sale, &records);
        log::debug!("{}", message);
        self.logs.push(LogEntry {
            severity: Severity::Info,
            symbol: sale.symbol.clone(),
            sale_date: sale.sale_date,
            message,
        });
        self.records.extend(records);
        Ok(SaleState::Committed)
    }

    fn skip(&mut self, sale: &Sale, warning: Warning) {
        let diagnostic = Diagnostic::new(sale.symbol.clone(), Some(sale.sale_date), warning);
        log::warn!("{}", diagnostic.message);
        self.warnings.push(diagnostic);
    }
}

/// Audit line for a committed sale: phases used, units per parcel, discount applied
fn describe(sale: &Sale, records: &[CgtRecord]) -> String {
    let mut phases: Vec<SelectionPhase> = Vec::new();
    for record in records {
        if !phases.contains(&record.selection_phase) {
            phases.push(record.selection_phase);
        }
    }
    let phases = phases.iter().map(|p| p.display()).collect::<Vec<_>>().join("+");

    let slices = records
        .iter()
        .map(|r| {
            format!(
                "{} from {} bought {} ({} days, {}{})",
                r.units.normalize(),
                r.parcel_source_id,
                r.purchase_date,
                r.days_held,
                if r.is_long_term { "long-term" } else { "short-term" },
                if r.is_discounted() { ", discounted" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    let discounted: Decimal = records.iter().filter(|r| r.is_discounted()).map(|r| r.units).sum();
    format!(
        "Sold {} {} on {} via {}: {}. Discount applied to {} units",
        sale.units_sold.normalize(),
        sale.symbol,
        sale.sale_date,
        phases,
        slices,
        discounted.normalize()
    )
}

/// Totals over a set of records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub records: usize,
    pub units: Decimal,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub capital_gain: Decimal,
    pub taxable_gain: Decimal,
    pub long_term_units: Decimal,
}

impl Totals {
    pub fn of<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a CgtRecord>,
    {
        records.into_iter().fold(Totals::default(), |mut t, r| {
            t.records += 1;
            t.units += r.units;
            t.proceeds += r.net_proceeds_domestic;
            t.cost_basis += r.cost_basis_domestic;
            t.capital_gain += r.capital_gain_domestic;
            t.taxable_gain += r.taxable_gain_domestic;
            if r.is_long_term {
                t.long_term_units += r.units;
            }
            t
        })
    }
}

/// CSV record for CGT output
#[derive(Debug, Serialize)]
pub struct CgtCsvRecord {
    pub financial_year: String,
    pub symbol: String,
    pub sale_date: String,
    pub purchase_date: String,
    pub parcel: String,
    pub phase: String,
    pub units: String,
    pub days_held: i64,
    pub long_term: bool,
    pub cost_basis_aud: String,
    pub net_proceeds_aud: String,
    pub capital_gain_aud: String,
    pub discount_rate: String,
    pub taxable_gain_aud: String,
}

impl From<&CgtRecord> for CgtCsvRecord {
    fn from(r: &CgtRecord) -> Self {
        CgtCsvRecord {
            financial_year: r.financial_year.display(),
            symbol: r.symbol.clone(),
            sale_date: r.sale_date.format("%Y-%m-%d").to_string(),
            purchase_date: r.purchase_date.format("%Y-%m-%d").to_string(),
            parcel: r.parcel_source_id.to_string(),
            phase: r.selection_phase.display().to_string(),
            units: r.units.normalize().to_string(),
            days_held: r.days_held,
            long_term: r.is_long_term,
            cost_basis_aud: r.cost_basis_domestic.round_dp(2).to_string(),
            net_proceeds_aud: r.net_proceeds_domestic.round_dp(2).to_string(),
            capital_gain_aud: r.capital_gain_domestic.round_dp(2).to_string(),
            discount_rate: r.discount_rate_applied.normalize().to_string(),
            taxable_gain_aud: r.taxable_gain_domestic.round_dp(2).to_string(),
        }
    }
}

impl CgtReport {
    pub fn filter_records<'a>(
        &'a self,
        year: Option<FinancialYear>,
        symbol: Option<&'a str>,
    ) -> impl Iterator<Item = &'a CgtRecord> {
        self.records
            .iter()
            .filter(move |r| year.is_none_or(|y| r.financial_year == y))
            .filter(move |r| symbol.is_none_or(|s| r.symbol.eq_ignore_ascii_case(s)))
    }

    #[allow(dead_code)]
    pub fn totals(&self, year: Option<FinancialYear>) -> Totals {
        Totals::of(self.filter_records(year, None))
    }

    /// Financial years that have at least one record, ascending
    pub fn financial_years(&self) -> Vec<FinancialYear> {
        let mut years: Vec<_> = self.records.iter().map(|r| r.financial_year).collect();
        years.sort();
        years.dedup();
        years
    }

    /// Write records to CSV
    pub fn write_csv<W: Write>(
        &self,
        writer: W,
        year: Option<FinancialYear>,
        symbol: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for record in self.filter_records(year, symbol) {
            let row: CgtCsvRecord = record.into();
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Parcel, ParcelId};
    use crate::fx::{FixedRate, RbaRates};
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn parcel(symbol: &str, purchased: &str, units: Decimal, price: Decimal) -> Parcel {
        Parcel::new(symbol, date(purchased), units, price, Decimal::ZERO)
    }

    fn sale(symbol: &str, sold: &str, units: Decimal, price: Decimal) -> Sale {
        Sale::new(symbol, date(sold), units, price, Decimal::ZERO)
    }

    fn pool(parcels: Vec<Parcel>) -> ParcelPool {
        let mut pool = ParcelPool::new();
        for parcel in parcels {
            pool.add(parcel).unwrap();
        }
        pool
    }

    // P1: 100 @ 150 fifteen months before the sale, P2: 100 @ 200 six months before
    fn aapl_pool() -> ParcelPool {
        pool(vec![
            parcel("AAPL", "2023-03-01", dec!(100), dec!(150)),
            parcel("AAPL", "2023-12-01", dec!(100), dec!(200)),
        ])
    }

    fn run(sales: &[Sale], pool: ParcelPool, strategy: Strategy) -> CgtReport {
        calculate_cgt(sales, pool, strategy, &FixedRate(Decimal::ONE)).unwrap()
    }

    #[test]
    fn tax_optimal_consumes_long_term_parcel_first() {
        let sales = vec![sale("AAPL", "2024-06-01", dec!(120), dec!(220))];
        let report = run(&sales, aapl_pool(), Strategy::TaxOptimal);

        assert_eq!(report.records.len(), 2);
        let (lt, st) = (&report.records[0], &report.records[1]);
        assert_eq!((lt.parcel_source_id, lt.units), (ParcelId(0), dec!(100)));
        assert_eq!(lt.selection_phase, SelectionPhase::LongTerm);
        assert_eq!(lt.discount_rate_applied, dec!(0.5));
        assert_eq!(lt.taxable_gain_domestic, dec!(3500));
        assert_eq!((st.parcel_source_id, st.units), (ParcelId(1), dec!(20)));
        assert_eq!(st.selection_phase, SelectionPhase::ShortTerm);
        assert_eq!(st.discount_rate_applied, Decimal::ZERO);
        assert_eq!(st.taxable_gain_domestic, dec!(400));

        let parcels = report.pool.get("AAPL").unwrap();
        assert_eq!(parcels[0].remaining_units, Decimal::ZERO);
        assert_eq!(parcels[1].remaining_units, dec!(80));
        assert!(report.warnings.is_empty());
        assert_eq!(report.logs.len(), 1);
    }

    #[test]
    fn fifo_matches_tax_optimal_when_oldest_is_long_term() {
        let sales = vec![sale("AAPL", "2024-06-01", dec!(120), dec!(220))];
        let fifo = run(&sales, aapl_pool(), Strategy::Fifo);
        let optimal = run(&sales, aapl_pool(), Strategy::TaxOptimal);

        let plan = |r: &CgtReport| -> Vec<(ParcelId, Decimal)> {
            r.records.iter().map(|r| (r.parcel_source_id, r.units)).collect()
        };
        assert_eq!(plan(&fifo), plan(&optimal));
        assert!(fifo.records.iter().all(|r| r.selection_phase == SelectionPhase::Fifo));
        assert_eq!(fifo.totals(None).taxable_gain, optimal.totals(None).taxable_gain);
    }

    #[test]
    fn insufficient_cost_basis_skips_sale_without_mutation() {
        let sales = vec![sale("MSFT", "2024-06-01", dec!(80), dec!(400))];
        let report = run(
            &sales,
            pool(vec![parcel("MSFT", "2022-01-01", dec!(50), dec!(300))]),
            Strategy::TaxOptimal,
        );

        assert!(report.records.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].warning,
            Warning::InsufficientCostBasis {
                available: dec!(50),
                required: dec!(80)
            }
        );
        assert_eq!(report.pool.available_units("MSFT"), dec!(50));
        assert!(report.logs.is_empty());
    }

    #[test]
    fn unknown_symbol_is_skipped_with_one_warning() {
        let sales = vec![sale("TSLA", "2024-06-01", dec!(10), dec!(250))];
        let before = aapl_pool();
        let report = run(&sales, before.clone(), Strategy::Fifo);

        assert!(report.records.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].warning, Warning::MissingCostBasis);
        assert_eq!(report.warnings[0].severity, Severity::Warning);
        assert_eq!(report.warnings[0].symbol, "TSLA");
        assert_eq!(report.pool, before);
    }

    #[test]
    fn later_sales_see_earlier_consumption() {
        let sales = vec![
            sale("AAPL", "2024-06-01", dec!(150), dec!(220)),
            sale("AAPL", "2024-07-01", dec!(60), dec!(230)),
            sale("AAPL", "2024-08-01", dec!(50), dec!(240)),
        ];
        let report = run(&sales, aapl_pool(), Strategy::Fifo);

        // the second sale is refused, leaving exactly enough for the third
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].sale_date, Some(date("2024-07-01")));
        assert_eq!(report.totals(None).units, dec!(200));
        assert_eq!(report.pool.available_units("AAPL"), Decimal::ZERO);
        assert_eq!(report.logs.len(), 2);
    }

    #[test]
    fn units_are_conserved_and_pool_never_grows() {
        let parcels = vec![
            parcel("AAPL", "2020-01-15", dec!(12.5), dec!(80)),
            parcel("AAPL", "2023-11-20", dec!(40), dec!(190)),
            parcel("AAPL", "2022-05-05", dec!(7.25), dec!(140)),
            parcel("MSFT", "2021-02-01", dec!(30), dec!(230)),
            parcel("MSFT", "2024-02-01", dec!(30), dec!(400)),
        ];
        let sales = vec![
            sale("AAPL", "2024-03-01", dec!(10.75), dec!(180)),
            sale("MSFT", "2024-03-02", dec!(35), dec!(410)),
            sale("AAPL", "2024-09-01", dec!(30), dec!(220)),
            sale("MSFT", "2024-10-02", dec!(25), dec!(420)),
            sale("AAPL", "2025-01-01", dec!(18.999), dec!(240)),
        ];

        for strategy in [Strategy::Fifo, Strategy::TaxOptimal] {
            let mut pool = pool(parcels.clone());
            for s in &sales {
                let before = pool.clone();
                let report = run(std::slice::from_ref(s), pool, strategy);
                let sold: Decimal = report.records.iter().map(|r| r.units).sum();
                if report.warnings.is_empty() {
                    assert_eq!(sold, s.units_sold);
                } else {
                    assert_eq!(sold, Decimal::ZERO);
                }
                for ((_, old), (_, new)) in before.iter().zip(report.pool.iter()) {
                    for (o, n) in old.iter().zip(new) {
                        assert!(n.remaining_units <= o.remaining_units);
                        assert!(n.remaining_units >= Decimal::ZERO);
                    }
                }
                pool = report.pool;
            }
        }
    }

    #[test]
    fn short_term_units_only_after_long_term_exhausted() {
        let parcels = vec![
            parcel("AAPL", "2024-05-01", dec!(10), dec!(500)),
            parcel("AAPL", "2021-01-01", dec!(10), dec!(100)),
            parcel("AAPL", "2022-01-01", dec!(10), dec!(120)),
        ];
        let sales = vec![sale("AAPL", "2024-06-01", dec!(25), dec!(200))];
        let report = run(&sales, pool(parcels), Strategy::TaxOptimal);

        let short_term: Decimal = report
            .records
            .iter()
            .filter(|r| !r.is_long_term)
            .map(|r| r.units)
            .sum();
        assert_eq!(short_term, dec!(5));
        let parcels = report.pool.get("AAPL").unwrap();
        assert!(parcels
            .iter()
            .filter(|p| p.purchase_date <= date("2023-06-01"))
            .all(|p| p.is_exhausted()));
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let sales = vec![
            sale("AAPL", "2024-06-01", dec!(120), dec!(220)),
            sale("TSLA", "2024-06-02", dec!(1), dec!(250)),
            sale("AAPL", "2024-06-03", dec!(500), dec!(220)),
        ];
        let a = run(&sales, aapl_pool(), Strategy::TaxOptimal);
        let b = run(&sales, aapl_pool(), Strategy::TaxOptimal);
        assert_eq!(a.records, b.records);
        assert_eq!(a.warnings, b.warnings);
        assert_eq!(a.logs, b.logs);
        assert_eq!(
            serde_json::to_string(&a.records).unwrap(),
            serde_json::to_string(&b.records).unwrap()
        );
    }

    #[test]
    fn sale_commission_is_shared_across_slices() {
        let sales = vec![Sale::new("AAPL", date("2024-06-01"), dec!(120), dec!(220), dec!(30))];
        let report = run(&sales, aapl_pool(), Strategy::TaxOptimal);
        let commission: Decimal = report.records.iter().map(|r| r.sale_commission_domestic).sum();
        assert_eq!(commission, dec!(30));
        assert_eq!(report.records[0].sale_commission_domestic, dec!(25));
    }

    #[test]
    fn missing_exchange_rate_skips_sale() {
        let mut rates = RbaRates::default();
        rates.insert("USD", date("2024-06-01"), dec!(0.66));
        let sales = vec![sale("AAPL", "2024-06-01", dec!(10), dec!(220))];
        let report = calculate_cgt(&sales, aapl_pool(), Strategy::Fifo, &rates).unwrap();

        assert!(report.records.is_empty());
        assert_eq!(
            report.warnings[0].warning,
            Warning::MissingExchangeRate {
                currency: "USD".to_string(),
                date: date("2023-03-01")
            }
        );
        assert_eq!(report.pool, aapl_pool());
    }

    #[test]
    fn log_describes_the_decision() {
        let sales = vec![sale("AAPL", "2024-06-01", dec!(120), dec!(220))];
        let report = run(&sales, aapl_pool(), Strategy::TaxOptimal);
        assert_eq!(
            report.logs[0].message,
            "Sold 120 AAPL on 2024-06-01 via LONG-TERM+SHORT-TERM: \
             100 from P0 bought 2023-03-01 (458 days, long-term, discounted); \
             20 from P1 bought 2023-12-01 (183 days, short-term). \
             Discount applied to 100 units"
        );
    }

    #[test]
    fn contract_violation_fails_the_run() {
        let sales = vec![sale("AAPL", "2024-06-01", dec!(0), dec!(220))];
        let err = calculate_cgt(&sales, aapl_pool(), Strategy::Fifo, &FixedRate(Decimal::ONE))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSale { .. }));
    }

    #[test]
    fn totals_filter_by_financial_year() {
        let sales = vec![
            sale("AAPL", "2024-06-01", dec!(10), dec!(220)),
            sale("AAPL", "2024-07-01", dec!(10), dec!(220)),
        ];
        let report = run(&sales, aapl_pool(), Strategy::Fifo);
        assert_eq!(report.financial_years(), vec![FinancialYear(2024), FinancialYear(2025)]);
        assert_eq!(report.totals(Some(FinancialYear(2025))).records, 1);
        assert_eq!(report.totals(None).records, 2);
    }
}
