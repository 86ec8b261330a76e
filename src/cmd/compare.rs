//! Compare command - tax-optimal selection against FIFO on the same inputs

use crate::cmd::{year_label, InputArgs};
use crate::tax::{CgtReport, FinancialYear, Strategy, Totals};
use crate::utils::{format_aud, format_quantity};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct CompareCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Comparison {
    financial_year: String,
    tax_optimal: Totals,
    fifo: Totals,
    /// FIFO taxable gain minus tax-optimal taxable gain
    taxable_gain_saving: Decimal,
}

impl Comparison {
    fn new(optimal: &CgtReport, fifo: &CgtReport, year: Option<FinancialYear>, symbol: Option<&str>) -> Self {
        let tax_optimal = Totals::of(optimal.filter_records(year, symbol));
        let fifo = Totals::of(fifo.filter_records(year, symbol));
        Comparison {
            financial_year: year_label(year),
            taxable_gain_saving: fifo.taxable_gain - tax_optimal.taxable_gain,
            tax_optimal,
            fifo,
        }
    }
}

#[derive(Debug, Clone, Tabled)]
struct ComparisonRow {
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Records")]
    records: String,
    #[tabled(rename = "Long-term Units")]
    long_term_units: String,
    #[tabled(rename = "Cost Base")]
    cost_basis: String,
    #[tabled(rename = "Gain")]
    gain: String,
    #[tabled(rename = "Taxable")]
    taxable: String,
}

impl ComparisonRow {
    fn new(strategy: Strategy, t: &Totals) -> Self {
        ComparisonRow {
            strategy: strategy.to_string(),
            records: t.records.to_string(),
            long_term_units: format_quantity(t.long_term_units),
            cost_basis: format_aud(t.cost_basis),
            gain: format_aud(t.capital_gain),
            taxable: format_aud(t.taxable_gain),
        }
    }
}

impl CompareCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let inputs = self.input.load()?;
        let optimal = inputs.run(Strategy::TaxOptimal)?;
        let fifo = inputs.run(Strategy::Fifo)?;
        let comparison = Comparison::new(
            &optimal,
            &fifo,
            self.input.financial_year(),
            self.input.symbol_filter(),
        );

        if self.json {
            println!("{}", serde_json::to_string_pretty(&comparison)?);
            return Ok(());
        }

        println!();
        println!("STRATEGY COMPARISON ({})", comparison.financial_year);
        println!();
        let rows = vec![
            ComparisonRow::new(Strategy::TaxOptimal, &comparison.tax_optimal),
            ComparisonRow::new(Strategy::Fifo, &comparison.fifo),
        ];
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        println!();
        println!(
            "Taxable gain saving with tax_optimal: {}",
            format_aud(comparison.taxable_gain_saving)
        );
        if optimal.warnings.len() != fifo.warnings.len() {
            println!(
                "Note: strategies skipped different sales ({} vs {} warnings)",
                optimal.warnings.len(),
                fifo.warnings.len()
            );
        }
        println!();
        Ok(())
    }
}
