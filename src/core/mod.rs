pub mod parcel;
pub mod sale;
pub mod warnings;

// Flat public surface for domain types.
pub use parcel::{Consumption, Parcel, ParcelId, ParcelPool, PoolError};
pub use sale::Sale;
pub use warnings::{Diagnostic, LogEntry, Severity, Warning};
