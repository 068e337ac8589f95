use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::{
    bridge::messages::{ActiveState, Outbound},
    storage::entities::TrackingData,
};

/// Talks to the popup. Pushes are fire-and-forget: they go out only while a popup is registered
/// and are dropped, never queued, otherwise.
pub struct NotificationChannel {
    popup_registered: bool,
    outbound: mpsc::Sender<Outbound>,
}

impl NotificationChannel {
    pub fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            popup_registered: false,
            outbound,
        }
    }

    pub fn is_popup_registered(&self) -> bool {
        self.popup_registered
    }

    pub fn register_popup(&mut self) {
        debug!("Popup registered");
        self.popup_registered = true;
    }

    pub fn unregister_popup(&mut self) {
        debug!("Popup unregistered");
        self.popup_registered = false;
    }

    /// Answers a `getActiveState` request.
    pub async fn respond(&self, request_id: Option<u64>, payload: ActiveState) {
        let response = Outbound::Response {
            request_id,
            payload,
        };
        if self.outbound.send(response).await.is_err() {
            warn!("Can't answer request {request_id:?}, the browser connection is gone");
        }
    }

    /// Pushes the ledger to the popup. Returns whether the push was handed over for delivery.
    pub fn publish(&self, tracking_data: TrackingData) -> bool {
        if !self.popup_registered {
            debug!("No popup listening, dropping tracking update");
            return false;
        }
        match self.outbound.try_send(Outbound::TrackingUpdate { tracking_data }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Outbound queue is full, dropping tracking update");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Browser connection is gone, dropping tracking update");
                false
            }
        }
    }
}
