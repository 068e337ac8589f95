use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::utils::clock::Clock;

use super::bridge::messages::{Inbound, MONTH_CHANGE_ALARM};

/// Periodic month rollover tick. Ticks go through the same queue as browser events, so they
/// never interleave with a ledger write.
pub struct AlarmSource {
    next: mpsc::Sender<Inbound>,
    shutdown: CancellationToken,
    period: Duration,
    clock: Arc<dyn Clock>,
}

impl AlarmSource {
    pub fn new(
        next: mpsc::Sender<Inbound>,
        shutdown: CancellationToken,
        period: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            next,
            shutdown,
            period,
            clock,
        }
    }

    /// The first tick fires one period after start, the startup check covers the time before.
    pub async fn run(self) -> Result<()> {
        let mut tick_point = self.clock.instant();
        loop {
            tick_point += self.period;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(tick_point) => ()
            }

            debug!("Alarm {MONTH_CHANGE_ALARM} fired");
            let alarm = Inbound::Alarm {
                name: MONTH_CHANGE_ALARM.into(),
            };
            if let Err(e) = self.next.send(alarm).await {
                // Processing has already stopped, nobody is left to tick for.
                error!("Failed to deliver alarm {e:?}");
                return Ok(());
            }
        }
    }
}
