//! Browser companion that turns time spent on distracting websites into a monthly debt.
//! The native messaging host tracks the foreground tab and keeps the ledger, the command line
//! shows reports and manages archives and configuration from a terminal.

pub mod background;
pub mod cli;
pub mod fs;
pub mod utils;
