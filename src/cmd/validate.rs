//! Validate command - surface data quality issues without generating full reports

use crate::cmd::{year_label, InputArgs};
use crate::core::{Diagnostic, Severity, Warning};
use crate::tax::FinancialYear;
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// JSON output structure
#[derive(Debug, Serialize)]
struct ValidationOutput<'a> {
    financial_year: String,
    issue_count: usize,
    skipped_sales: usize,
    issues: Vec<&'a Diagnostic>,
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let inputs = self.input.load()?;
        let report = inputs.run(self.input.strategy)?;
        let year = self.input.financial_year();
        let symbol = self.input.symbol_filter();

        // Row-level issues carry no sale date and are always shown
        let issues: Vec<&Diagnostic> = report
            .warnings
            .iter()
            .filter(|d| in_year(d, year))
            .filter(|d| d.symbol.is_empty() || symbol.is_none_or(|s| d.symbol.eq_ignore_ascii_case(s)))
            .collect();

        if self.json {
            let output = ValidationOutput {
                financial_year: year_label(year),
                issue_count: issues.len(),
                skipped_sales: issues.iter().filter(|d| d.warning.skips_sale()).count(),
                issues,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            if output.issue_count > 0 {
                std::process::exit(1);
            }
        } else {
            print_text(&issues, year);
            if !issues.is_empty() {
                std::process::exit(1);
            }
        }
        Ok(())
    }
}

fn in_year(diagnostic: &Diagnostic, year: Option<FinancialYear>) -> bool {
    match (diagnostic.sale_date, year) {
        (Some(date), Some(year)) => year.contains(date),
        _ => true,
    }
}

fn print_text(issues: &[&Diagnostic], year: Option<FinancialYear>) {
    println!();
    println!("VALIDATION RESULTS ({})", year_label(year));
    println!();

    if issues.is_empty() {
        println!("\u{2713} No issues found.");
        println!();
        return;
    }

    println!("\u{26A0} {} issue(s) found:", issues.len());
    println!();
    for (i, issue) in issues.iter().enumerate() {
        let marker = match (issue.severity, &issue.warning) {
            (Severity::Warning, _) => "SKIPPED",
            (Severity::Info, Warning::InvalidCommission { .. }) => "DEFAULTED",
            (Severity::Info, _) => "DROPPED",
        };
        println!("  {}. [{}] {} {}", i + 1, issue.warning.kind(), marker, issue.message);
    }
    println!();
}
