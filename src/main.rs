use clap::{Parser, Subcommand};

mod cmd;
mod core;
mod fx;
mod ingest;
mod tax;
mod utils;

/// Australian Capital Gains Tax calculator for share disposals
#[derive(Parser, Debug)]
#[command(name = "aucgt", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calculate CGT and show a record per parcel sold
    Report(cmd::report::ReportCommand),
    /// Totals and net capital gain per financial year
    Summary(cmd::summary::SummaryCommand),
    /// Parcels remaining after all sales
    Pools(cmd::pools::PoolsCommand),
    /// Report skipped sales and dropped rows; exits 1 if any
    Validate(cmd::validate::ValidateCommand),
    /// Compare tax-optimal selection against FIFO
    Compare(cmd::compare::CompareCommand),
    /// Print accepted input formats
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Report(report) => report.exec(),
        Command::Summary(summary) => summary.exec(),
        Command::Pools(pools) => pools.exec(),
        Command::Validate(validate) => validate.exec(),
        Command::Compare(compare) => compare.exec(),
        Command::Schema(schema) => schema.exec(),
    }
}
