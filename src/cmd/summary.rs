//! Summary command - totals and net capital gain per financial year

use crate::cmd::{year_label, InputArgs};
use crate::tax::{CgtReport, NetCapitalGain, Totals};
use crate::utils::{format_aud, format_quantity};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct SummaryCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Net capital losses carried into the first financial year reported
    #[arg(long, default_value_t = Decimal::ZERO)]
    prior_losses: Decimal,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// One financial year of the summary
#[derive(Debug, Serialize)]
struct YearSummary {
    financial_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
    totals: Totals,
    net_capital_gain: NetCapitalGain,
}

impl SummaryCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let inputs = self.input.load()?;
        let report = inputs.run(self.input.strategy)?;
        let summaries = self.summarize(&report);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        } else {
            self.print_summary(&report, &summaries);
        }
        Ok(())
    }

    /// Years in order, each starting from the losses the previous one carried forward
    fn summarize(&self, report: &CgtReport) -> Vec<YearSummary> {
        let years = match self.input.financial_year() {
            Some(year) => vec![year],
            None => report.financial_years(),
        };
        let symbol = self.input.symbol_filter();

        let mut carried = self.prior_losses;
        years
            .into_iter()
            .map(|year| {
                let records: Vec<_> = report.filter_records(Some(year), symbol).collect();
                let net = NetCapitalGain::calculate(records.iter().copied(), carried);
                carried = net.losses_carried_forward;
                YearSummary {
                    financial_year: year.display(),
                    symbol: symbol.map(str::to_uppercase),
                    totals: Totals::of(records.iter().copied()),
                    net_capital_gain: net,
                }
            })
            .collect()
    }

    fn print_summary(&self, report: &CgtReport, summaries: &[YearSummary]) {
        let label = year_label(self.input.financial_year());
        println!();
        match &self.input.symbol {
            Some(symbol) => println!(
                "CGT SUMMARY ({}, {}) - {} selection",
                label,
                symbol.to_uppercase(),
                report.strategy
            ),
            None => println!("CGT SUMMARY ({}) - {} selection", label, report.strategy),
        }
        println!();

        if summaries.is_empty() {
            println!("No disposals found matching filters");
            println!();
            return;
        }

        for summary in summaries {
            let t = &summary.totals;
            let n = &summary.net_capital_gain;
            println!("FY{}", summary.financial_year);
            println!(
                "  Disposals: {} | Units: {} (long-term {})",
                t.records,
                format_quantity(t.units),
                format_quantity(t.long_term_units)
            );
            println!(
                "  Proceeds: {} | Cost base: {} | Gain: {}",
                format_aud(t.proceeds),
                format_aud(t.cost_basis),
                format_aud(t.capital_gain)
            );
            println!("  Taxable gain (per parcel): {}", format_aud(t.taxable_gain));
            println!(
                "  Gains: short-term {} | long-term {} | losses {} (+{} prior)",
                format_aud(n.short_term_gains),
                format_aud(n.long_term_gains),
                format_aud(n.current_year_losses),
                format_aud(n.prior_year_losses)
            );
            println!(
                "  Losses applied: {} | Discount: {} | Net capital gain: {}",
                format_aud(n.losses_applied),
                format_aud(n.discount),
                format_aud(n.net_capital_gain)
            );
            if n.losses_carried_forward > Decimal::ZERO {
                println!("  Losses carried forward: {}", format_aud(n.losses_carried_forward));
            }
            println!();
        }

        let skipped = report.warnings.iter().filter(|w| w.warning.skips_sale()).count();
        if skipped > 0 {
            println!("{} sale(s) skipped; run `validate` for details", skipped);
            println!();
        }
    }
}
