use tokio::sync::mpsc;
use tracing::debug;

use crate::background::bridge::messages::Outbound;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum IconState {
    /// Red icon, a blackhole is in the foreground.
    Tracking,
    Default,
}

/// Visual projection of the tracker state.
#[cfg_attr(test, mockall::automock)]
pub trait Indicator {
    fn show(&mut self, state: IconState);
}

/// Asks the browser side to swap the toolbar icon.
pub struct HostIndicator {
    outbound: mpsc::Sender<Outbound>,
}

impl HostIndicator {
    pub fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self { outbound }
    }
}

impl Indicator for HostIndicator {
    fn show(&mut self, state: IconState) {
        let message = Outbound::SetIcon {
            tracking: state == IconState::Tracking,
        };
        if let Err(e) = self.outbound.try_send(message) {
            debug!("Dropped icon update {e}");
        }
    }
}
