use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;

use crate::{
    background::storage::{
        archive::ArchiveService, config::load_config, ledger::Ledger, store::KeyValueStore,
    },
    utils::clock::Clock,
};

/// Deletes a month wherever it lives: its sealed snapshot and any partition that wasn't sealed
/// yet. The current month is refused, the host is still writing into it.
pub async fn delete_month<S: KeyValueStore + Clone>(
    store: &S,
    clock: Arc<dyn Clock>,
    month: &str,
) -> Result<String> {
    let ledger = Ledger::new(store.clone(), clock.clone());
    if month == ledger.current_month_key() {
        bail!("{month} is the current month and can't be deleted, archive it first");
    }

    ArchiveService::new(store.clone(), clock)
        .delete_archive(month)
        .await?;
    ledger.delete_month(month).await?;
    info!("Deleted {month} on user request");
    Ok(format!("Deleted {month}\n"))
}

/// Seals the current month right away instead of waiting for the month to end.
pub async fn archive_now<S: KeyValueStore + Clone>(store: &S, clock: Arc<dyn Clock>) -> Result<String> {
    let config = load_config(store).await;
    let archive = ArchiveService::new(store.clone(), clock.clone());
    let month = Ledger::new(store.clone(), clock).current_month_key();

    if archive.archive_current_period(config.rate).await? {
        Ok(format!("Archived {month}\n"))
    } else {
        Ok(format!("Nothing to archive for {month}\n"))
    }
}
