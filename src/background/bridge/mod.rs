//! Connection to the browser. [HostReader] turns incoming native messaging frames into
//! [messages::Inbound] events, [HostWriter] sends [messages::Outbound] messages back.

pub mod messages;
pub mod native;

use anyhow::Result;
use messages::{Inbound, Outbound};
use native::{read_frame, write_frame, MAX_FRAME_SIZE};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct HostReader<R> {
    input: R,
    next: mpsc::Sender<Inbound>,
    shutdown: CancellationToken,
}

impl<R: AsyncRead + Unpin> HostReader<R> {
    pub fn new(input: R, next: mpsc::Sender<Inbound>, shutdown: CancellationToken) -> Self {
        Self {
            input,
            next,
            shutdown,
        }
    }

    /// Executes the reader loop. The browser closing the pipe is the normal way for the host to
    /// stop, so end of input cancels the whole host.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                frame = read_frame(&mut self.input) => frame,
            };

            let bytes = match frame {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    info!("Browser closed the connection");
                    self.shutdown.cancel();
                    return Ok(());
                }
                Err(e) => {
                    error!("Failed to read from the browser {e:?}");
                    self.shutdown.cancel();
                    return Err(e);
                }
            };

            match serde_json::from_slice::<Inbound>(&bytes) {
                Ok(message) => {
                    debug!("Received {message:?}");
                    if self.next.send(message).await.is_err() {
                        // Processing stopped, nobody is left to handle events.
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!(
                        "Ignoring malformed message {}: {e}",
                        String::from_utf8_lossy(&bytes)
                    )
                }
            }
        }
    }
}

pub struct HostWriter<W> {
    output: W,
    receiver: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
}

impl<W: AsyncWrite + Unpin> HostWriter<W> {
    pub fn new(output: W, receiver: mpsc::Receiver<Outbound>, shutdown: CancellationToken) -> Self {
        Self {
            output,
            receiver,
            shutdown,
        }
    }

    /// Runs until every sender is dropped. A message too large for one frame is dropped, a
    /// broken pipe stops the whole host.
    pub async fn run(mut self) -> Result<()> {
        while let Some(message) = self.receiver.recv().await {
            let payload = match serde_json::to_vec(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Dropping message that failed to serialize {e}");
                    continue;
                }
            };
            if payload.len() > MAX_FRAME_SIZE {
                warn!(
                    "Dropping {} message of {} bytes, the limit is {MAX_FRAME_SIZE}",
                    message.kind(),
                    payload.len()
                );
                continue;
            }
            if let Err(e) = write_frame(&mut self.output, &payload).await {
                error!("Failed to deliver {message:?} {e:?}");
                self.shutdown.cancel();
                self.receiver.close();
                return Err(e);
            }
            debug!("Delivered {message:?}");
        }
        Ok(())
    }
}
