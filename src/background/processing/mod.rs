use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use super::bridge::messages::Inbound;

pub mod background;
pub mod module;

/// Serial dispatch loop over every event the host receives: browser events, popup requests and
/// alarm ticks all go through the same queue.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<Inbound>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<Inbound>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.receiver.recv().await {
            debug!("Processing event {:?}", event);
            match self.processor.process_next(event.clone()).await {
                Ok(_) => {
                    info!("Processed event {:?}", event)
                }
                Err(e) => {
                    error!("Error processing event {:?}: {e:?}", event)
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
