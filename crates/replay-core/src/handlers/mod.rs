//! Handlers for the work done per matching transaction.

pub mod transaction;

pub use transaction::{TransactionHandler, TxOutcome};
