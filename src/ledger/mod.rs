//! The financial core: bank statement import, payment reconciliation, and the
//! roster export. Everything here operates on a [`crate::store::Store`] handle
//! passed in by the caller.

pub mod export;
pub mod import;
pub mod reconcile;
