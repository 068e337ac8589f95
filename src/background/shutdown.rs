use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Waits until the host has to stop: either a signal arrives or some other part of the host
/// (usually the browser closing the pipe) cancelled the token already.
///
/// Browsers stop native hosts by closing stdin, signals only show up when the host is run by hand.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
