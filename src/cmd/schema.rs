//! Schema command - print expected input formats

use crate::ingest::{CostBasisFile, StatementRow};
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format: csv-fields, csv-header or json-schema
    #[arg(value_enum, default_value = "csv-fields")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// Statement columns with their accepted header aliases
    CsvFields,
    /// Canonical statement CSV header row
    CsvHeader,
    /// JSON Schema for the cost-basis file
    JsonSchema,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::JsonSchema => self.print_json_schema(),
            SchemaFormat::CsvHeader => self.print_csv_header(),
            SchemaFormat::CsvFields => self.print_csv_fields(),
        }
    }

    fn print_json_schema(&self) -> anyhow::Result<()> {
        let schema = schema_for!(CostBasisFile);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        Ok(())
    }

    fn print_csv_header(&self) -> anyhow::Result<()> {
        let columns: Vec<_> = StatementRow::csv_schema().iter().map(|f| f.name).collect();
        println!("{}", columns.join(","));
        Ok(())
    }

    fn print_csv_fields(&self) -> anyhow::Result<()> {
        println!("Statement CSV Format");
        println!("====================");
        println!();
        for field in StatementRow::csv_schema() {
            let req = if field.required { "required" } else { "optional" };
            println!("{:12} ({:8})  {}", field.name, req, field.description);
            println!("{:24}accepts: {}", "", field.aliases.join(", "));
        }
        println!();
        println!("Headers match case-insensitively. Sell quantities and fees may be negative.");
        println!("Rates file: RBA F11 CSV, foreign currency per AUD (e.g. 0.6500 USD)");
        Ok(())
    }
}
