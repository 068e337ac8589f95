use std::{path::PathBuf, sync::Arc, time::Duration};

use alarm::AlarmSource;
use anyhow::Result;
use bridge::{
    messages::{Inbound, Outbound},
    HostReader, HostWriter,
};
use processing::{background::Background, ProcessingModule};
use storage::store::{FileStore, KeyValueStore};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracking::indicator::HostIndicator;

use crate::utils::clock::{Clock, DefaultClock};

pub mod alarm;
pub mod args;
pub mod bridge;
pub mod messaging;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod tracking;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

const QUEUE_SIZE: usize = 32;

/// Represents the starting point for the native messaging host. Talks to the browser over
/// stdin and stdout until the browser closes the pipe.
pub async fn start_host(dir: PathBuf, check_interval: Duration) -> Result<()> {
    let store = Arc::new(FileStore::new(dir)?);
    run_host(
        tokio::io::stdin(),
        tokio::io::stdout(),
        store,
        Arc::new(DefaultClock),
        check_interval,
        CancellationToken::new(),
    )
    .await
}

pub async fn run_host<S: KeyValueStore + Clone>(
    input: impl AsyncRead + Unpin,
    output: impl AsyncWrite + Unpin,
    store: S,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let (event_sender, event_receiver) = mpsc::channel::<Inbound>(QUEUE_SIZE);
    let (outbound_sender, outbound_receiver) = mpsc::channel::<Outbound>(QUEUE_SIZE);

    let background = Background::initialize(
        store,
        clock.clone(),
        Box::new(HostIndicator::new(outbound_sender.clone())),
        outbound_sender,
    )
    .await;
    info!("Host initialized, waiting for browser events");

    let reader = HostReader::new(input, event_sender.clone(), shutdown_token.clone());
    let alarm = AlarmSource::new(event_sender, shutdown_token.clone(), check_interval, clock);
    let processor = ProcessingModule::new(event_receiver, background);
    let writer = HostWriter::new(output, outbound_receiver, shutdown_token.clone());

    let (_, reader_result, alarm_result, processing_result, writer_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        reader.run(),
        alarm.run(),
        processor.run(),
        writer.run(),
    );

    if let Err(reader_result) = reader_result {
        error!("Browser reader got an error {:?}", reader_result);
    }

    if let Err(alarm_result) = alarm_result {
        error!("Alarm got an error {:?}", alarm_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    if let Err(writer_result) = writer_result {
        error!("Browser writer got an error {:?}", writer_result);
    }

    info!("Host stopped");
    Ok(())
}
