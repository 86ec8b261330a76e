//! Pools command - parcels left after the run

use crate::cmd::InputArgs;
use crate::core::{Parcel, ParcelPool};
use crate::ingest::CostBasisFile;
use crate::utils::format_quantity;
use clap::Args;
use rust_decimal::Decimal;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct PoolsCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Include fully sold parcels
    #[arg(long)]
    all: bool,

    /// Output as JSON (cost-basis file format) instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Tabled)]
struct ParcelRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Parcel")]
    parcel: String,
    #[tabled(rename = "Bought")]
    purchase_date: String,
    #[tabled(rename = "Original")]
    original_units: String,
    #[tabled(rename = "Remaining")]
    remaining_units: String,
    #[tabled(rename = "Cost/Unit")]
    cost_per_unit: String,
    #[tabled(rename = "Ccy")]
    currency: String,
}

impl From<&Parcel> for ParcelRow {
    fn from(p: &Parcel) -> Self {
        ParcelRow {
            symbol: p.symbol.clone(),
            parcel: p.id.to_string(),
            purchase_date: p.purchase_date.format("%Y-%m-%d").to_string(),
            original_units: format_quantity(p.original_units),
            remaining_units: format_quantity(p.remaining_units),
            cost_per_unit: format!("{:.4}", p.cost_per_unit()),
            currency: p.currency.clone(),
        }
    }
}

impl PoolsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let inputs = self.input.load()?;
        let report = inputs.run(self.input.strategy)?;
        let pool = self.filter_pool(&report.pool);

        if self.json {
            let file = CostBasisFile::from_pool(&pool, !self.all);
            println!("{}", serde_json::to_string_pretty(&file)?);
        } else {
            self.print_pool(&pool);
        }
        Ok(())
    }

    fn filter_pool(&self, pool: &ParcelPool) -> ParcelPool {
        match self.input.symbol_filter() {
            None => pool.clone(),
            Some(symbol) => {
                let mut filtered = ParcelPool::new();
                for (s, parcels) in pool.iter().filter(|(s, _)| s.eq_ignore_ascii_case(symbol)) {
                    log::debug!("Showing {} parcels of {}", parcels.len(), s);
                    for parcel in parcels {
                        // ids are positional, so every parcel is kept to preserve them
                        if filtered.add(parcel.clone()).is_err() {
                            log::warn!("Skipping invalid parcel {} of {}", parcel.id, s);
                        }
                    }
                }
                filtered
            }
        }
    }

    fn print_pool(&self, pool: &ParcelPool) {
        println!();
        println!("REMAINING COST BASIS");
        println!();

        let rows: Vec<ParcelRow> = pool
            .iter()
            .flat_map(|(_, parcels)| parcels.iter())
            .filter(|p| self.all || !p.is_exhausted())
            .map(ParcelRow::from)
            .collect();

        if rows.is_empty() {
            println!("No parcels held");
            println!();
            return;
        }

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        println!();

        for (symbol, parcels) in pool.iter() {
            let held: Decimal = parcels.iter().map(|p| p.remaining_units).sum();
            if held.is_zero() {
                continue;
            }
            let cost: Decimal = parcels.iter().map(|p| p.remaining_units * p.cost_per_unit()).sum();
            println!(
                "  {}: {} units, cost base {:.2} {}",
                symbol,
                format_quantity(held),
                cost,
                parcels[0].currency
            );
        }
        println!();
    }
}
