use anyhow::Result;

use crate::background::bridge::messages::Inbound;

/// Represents an event processor. Each call handles one event to completion before the next one
/// is taken, which is what keeps ledger mutations single-flight.
pub trait EventProcessor {
    fn process_next(&mut self, message: Inbound) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
