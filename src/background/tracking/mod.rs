//! Decides which foreground tab is a blackhole and turns the time spent on it into ledger
//! entries.

pub mod indicator;
pub mod matcher;
pub mod session;
