//! Report command - per-parcel CGT records for a run

use crate::cmd::{year_label, InputArgs};
use crate::core::{Diagnostic, LogEntry};
use crate::ingest::CostBasisFile;
use crate::tax::{CgtRecord, CgtReport, FinancialYear, Totals};
use crate::utils::{format_aud, format_pct, format_quantity};
use anyhow::Context;
use clap::Args;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct ReportCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Output as CSV instead of formatted table
    #[arg(long, conflicts_with = "json")]
    csv: bool,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,

    /// Print the audit log of every processed sale
    #[arg(long)]
    logs: bool,

    /// Print a SHA-256 digest of the CSV records (for comparing runs)
    #[arg(long)]
    digest: bool,

    /// Write the remaining cost basis to this JSON file
    #[arg(long)]
    export_pool: Option<PathBuf>,
}

#[derive(Debug, Clone, Tabled)]
struct RecordRow {
    #[tabled(rename = "Sale Date")]
    sale_date: String,
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Parcel")]
    parcel: String,
    #[tabled(rename = "Bought")]
    purchase_date: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Units")]
    units: String,
    #[tabled(rename = "Days")]
    days_held: String,
    #[tabled(rename = "Cost Base")]
    cost_basis: String,
    #[tabled(rename = "Proceeds")]
    proceeds: String,
    #[tabled(rename = "Gain")]
    gain: String,
    #[tabled(rename = "Discount")]
    discount: String,
    #[tabled(rename = "Taxable")]
    taxable: String,
}

impl From<&CgtRecord> for RecordRow {
    fn from(r: &CgtRecord) -> Self {
        RecordRow {
            sale_date: r.sale_date.format("%Y-%m-%d").to_string(),
            symbol: r.symbol.clone(),
            parcel: r.parcel_source_id.to_string(),
            purchase_date: r.purchase_date.format("%Y-%m-%d").to_string(),
            phase: r.selection_phase.display().to_string(),
            units: format_quantity(r.units),
            days_held: r.days_held.to_string(),
            cost_basis: format_aud(r.cost_basis_domestic),
            proceeds: format_aud(r.net_proceeds_domestic),
            gain: format_aud(r.capital_gain_domestic),
            discount: format_pct(r.discount_rate_applied),
            taxable: format_aud(r.taxable_gain_domestic),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportOutput<'a> {
    strategy: String,
    financial_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
    totals: Totals,
    records: Vec<&'a CgtRecord>,
    warnings: &'a [Diagnostic],
    #[serde(skip_serializing_if = "Option::is_none")]
    logs: Option<&'a [LogEntry]>,
}

impl ReportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let inputs = self.input.load()?;
        let report = inputs.run(self.input.strategy)?;
        let year = self.input.financial_year();

        if self.json {
            self.print_json(&report, year)?;
        } else if self.csv {
            report.write_csv(io::stdout(), year, self.input.symbol_filter())?;
        } else {
            self.print_table(&report, year);
        }

        if self.digest {
            let mut buffer = Vec::new();
            report.write_csv(&mut buffer, year, self.input.symbol_filter())?;
            eprintln!("SHA-256: {}", csv_digest(&buffer));
        }

        if let Some(path) = &self.export_pool {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            CostBasisFile::from_pool(&report.pool, true).write_json(file)?;
            log::info!("Remaining cost basis written to {}", path.display());
        }
        Ok(())
    }

    fn print_table(&self, report: &CgtReport, year: Option<FinancialYear>) {
        let records: Vec<_> = report.filter_records(year, self.input.symbol_filter()).collect();
        let totals = Totals::of(records.iter().copied());

        println!();
        println!(
            "CAPITAL GAINS REPORT ({}) - {} selection",
            year_label(year),
            report.strategy
        );
        println!();

        if records.is_empty() {
            println!("No disposals found matching filters");
        } else {
            let rows: Vec<RecordRow> = records.iter().copied().map(RecordRow::from).collect();
            let table = Table::new(rows)
                .with(Style::rounded())
                .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
                .to_string();
            println!("{}", table);
        }

        println!();
        println!(
            "Records: {} | Units: {} (long-term {})",
            totals.records,
            format_quantity(totals.units),
            format_quantity(totals.long_term_units)
        );
        println!(
            "Proceeds: {} | Cost base: {} | Gain: {} | Taxable: {}",
            format_aud(totals.proceeds),
            format_aud(totals.cost_basis),
            format_aud(totals.capital_gain),
            format_aud(totals.taxable_gain)
        );

        if !report.warnings.is_empty() {
            println!();
            println!("WARNINGS");
            for warning in &report.warnings {
                println!("  [{}] {}", warning.warning.kind(), warning.message);
            }
        }

        if self.logs {
            println!();
            println!("AUDIT LOG");
            for entry in &report.logs {
                println!("  {}", entry.message);
            }
        }
        println!();
    }

    fn print_json(&self, report: &CgtReport, year: Option<FinancialYear>) -> anyhow::Result<()> {
        let records: Vec<_> = report.filter_records(year, self.input.symbol_filter()).collect();
        let output = ReportOutput {
            strategy: report.strategy.to_string(),
            financial_year: year_label(year),
            symbol: self.input.symbol.as_ref().map(|s| s.to_uppercase()),
            totals: Totals::of(records.iter().copied()),
            records,
            warnings: &report.warnings,
            logs: self.logs.then_some(report.logs.as_slice()),
        };
        let stdout = io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &output)?;
        writeln!(out)?;
        Ok(())
    }
}

fn csv_digest(csv: &[u8]) -> String {
    hex::encode(Sha256::digest(csv))
}
