pub mod au;
pub mod cgt;
pub mod gain;
pub mod selector;

pub use au::{FinancialYear, NetCapitalGain};
pub use cgt::{calculate_cgt, CgtReport, EngineError, Totals};
pub use gain::CgtRecord;
pub use selector::{SelectionPhase, Strategy};
