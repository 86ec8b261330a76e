pub mod compare;
pub mod pools;
pub mod report;
pub mod schema;
pub mod summary;
pub mod validate;

use crate::core::{Diagnostic, ParcelPool, Sale};
use crate::fx::{FixedRate, RateSource, RbaRates};
use crate::ingest::{CostBasisFile, StatementReader};
use crate::tax::{calculate_cgt, CgtReport, FinancialYear, Strategy};
use anyhow::Context;
use clap::{ArgAction, Args};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Inputs shared by every command that runs the engine
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Broker statement CSV (repeat for several files, "-" for stdin)
    #[arg(short, long = "statement", required = true)]
    statements: Vec<PathBuf>,

    /// Cost-basis JSON with parcels held before the statements begin
    #[arg(short, long)]
    cost_basis: Option<PathBuf>,

    /// RBA historical exchange rates CSV (AUD/USD); repeat to merge several files
    #[arg(short, long, action = ArgAction::Append, conflicts_with = "fixed_rate")]
    rates: Vec<PathBuf>,

    /// Currency of the rates files
    #[arg(long, default_value = "USD")]
    rates_currency: String,

    /// Convert every foreign amount with this AUD multiplier instead of a rates file
    #[arg(long)]
    fixed_rate: Option<Decimal>,

    /// Parcel selection strategy
    #[arg(long, value_enum, default_value_t = Strategy::TaxOptimal)]
    pub strategy: Strategy,

    /// Commission applied to rows with no usable commission (brokers often charge a flat
    /// fee such as 30; pass it here, the default is 0)
    #[arg(long, default_value_t = Decimal::ZERO)]
    default_commission: Decimal,

    /// Financial year to report, by its end year (e.g. 2025 for 2024-25)
    #[arg(short, long)]
    pub year: Option<i32>,

    /// Filter by symbol (e.g. AAPL)
    #[arg(long)]
    pub symbol: Option<String>,
}

/// Everything needed for a run, read from disk once
pub struct Inputs {
    pub pool: ParcelPool,
    pub sales: Vec<Sale>,
    pub warnings: Vec<Diagnostic>,
    pub rates: Box<dyn RateSource>,
}

impl Inputs {
    /// Run the engine, with ingestion warnings ahead of the engine's own
    pub fn run(&self, strategy: Strategy) -> anyhow::Result<CgtReport> {
        let mut report = calculate_cgt(&self.sales, self.pool.clone(), strategy, self.rates.as_ref())?;
        let mut warnings = self.warnings.clone();
        warnings.append(&mut report.warnings);
        report.warnings = warnings;
        Ok(report)
    }
}

impl InputArgs {
    pub fn financial_year(&self) -> Option<FinancialYear> {
        self.year.map(FinancialYear)
    }

    pub fn symbol_filter(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn load(&self) -> anyhow::Result<Inputs> {
        let opening = match &self.cost_basis {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("opening cost basis {}", path.display()))?;
                CostBasisFile::read_json(BufReader::new(file))
                    .with_context(|| format!("reading cost basis {}", path.display()))?
                    .into_pool()?
            }
            None => ParcelPool::new(),
        };

        let mut reader = StatementReader::new(self.default_commission);
        for path in &self.statements {
            let name = path.display().to_string();
            reader.read(open_input(path)?, &name)?;
        }
        let statement = reader.finish(opening)?;

        let rates: Box<dyn RateSource> = if !self.rates.is_empty() {
            Box::new(self.load_rates()?)
        } else if let Some(rate) = self.fixed_rate {
            if rate <= Decimal::ZERO {
                anyhow::bail!("--fixed-rate must be positive, got {}", rate);
            }
            Box::new(FixedRate(rate))
        } else {
            log::warn!("No exchange rates given; foreign amounts are treated as AUD (rate 1)");
            Box::new(FixedRate(Decimal::ONE))
        };

        Ok(Inputs {
            pool: statement.pool,
            sales: statement.sales,
            warnings: statement.warnings,
            rates,
        })
    }

    /// Merge every rates file into one table
    fn load_rates(&self) -> anyhow::Result<RbaRates> {
        let mut rates = RbaRates::default();
        for path in &self.rates {
            let file = File::open(path).with_context(|| format!("opening rates {}", path.display()))?;
            rates
                .extend_csv(BufReader::new(file), &self.rates_currency)
                .with_context(|| format!("reading rates {}", path.display()))?;
        }
        Ok(rates)
    }
}

/// Open a file, or stdin with "-"
fn open_input(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        let mut buffer = Vec::new();
        io::stdin().lock().read_to_end(&mut buffer)?;
        if buffer.is_empty() {
            anyhow::bail!("No input received. Provide a statement file or pipe data to stdin.");
        }
        Ok(Box::new(io::Cursor::new(buffer)))
    } else {
        let file = File::open(path).with_context(|| format!("opening statement {}", path.display()))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn year_label(year: Option<FinancialYear>) -> String {
    year.map_or("All Years".to_string(), |y| format!("FY{}", y.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        input: InputArgs,
    }

    #[test]
    fn rates_can_be_repeated() {
        let cli = Cli::try_parse_from([
            "aucgt",
            "-s",
            "a.csv",
            "--rates",
            "FX_2018-2022.csv",
            "--rates",
            "FX_2023-2025.csv",
        ])
        .unwrap();
        assert_eq!(
            cli.input.rates,
            vec![PathBuf::from("FX_2018-2022.csv"), PathBuf::from("FX_2023-2025.csv")]
        );
    }

    #[test]
    fn rates_conflict_with_fixed_rate() {
        let result = Cli::try_parse_from(["aucgt", "-s", "a.csv", "-r", "fx.csv", "--fixed-rate", "1.5"]);
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
