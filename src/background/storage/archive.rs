use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::utils::{clock::Clock, time::month_key};

use super::{
    entities::{ArchiveEntry, Archives, TrackingData, ARCHIVES_KEY, TRACKING_DATA_KEY},
    store::{read_key, write_key, KeyValueStore},
};

/// Seals month partitions of the ledger into immutable [ArchiveEntry] snapshots.
///
/// Sealing moves a partition: the snapshot is written under [ARCHIVES_KEY] and the partition is
/// removed from [TRACKING_DATA_KEY] in the same store modification, so a crash can never leave
/// a month both archived and live, or neither.
pub struct ArchiveService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    /// `None` until the first check. The host may have been down over a month boundary, so the
    /// first check can't assume the ledger is up to date.
    last_checked_month: Option<String>,
}

impl<S: KeyValueStore> ArchiveService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            last_checked_month: None,
        }
    }

    fn current_month_key(&self) -> String {
        month_key(&self.clock.local_time())
    }

    /// Seals the current month. Returns false without touching storage when there is nothing
    /// recorded for it.
    pub async fn archive_current_period(&self, rate: f64) -> Result<bool> {
        let month = self.current_month_key();
        let sealed = self.seal(|key| key == month, rate).await?;
        Ok(!sealed.is_empty())
    }

    /// Compares the month seen by the previous check with the current one. When the month
    /// changed, every partition that is not the current month is sealed. The first check
    /// seals partitions left over from earlier months, and counts as a rollover only if it
    /// found any. Returns whether a rollover happened.
    pub async fn check_for_month_rollover(&mut self, rate: f64) -> Result<bool> {
        let current = self.current_month_key();
        match &self.last_checked_month {
            Some(last) if *last == current => {
                debug!("Still in month {current}");
                return Ok(false);
            }
            Some(last) => info!("Month changed from {last} to {current}"),
            None => debug!("First rollover check in {current}"),
        }

        // The remembered month only moves forward once sealing succeeded, so a failed attempt
        // is retried on the next check.
        let sealed = self.seal(|key| key != current, rate).await?;
        if !sealed.is_empty() {
            info!("Auto-archived {sealed:?}");
        }
        let first_check = self.last_checked_month.is_none();
        self.last_checked_month = Some(current);
        Ok(!first_check || !sealed.is_empty())
    }

    async fn seal(&self, should_seal: impl Fn(&str) -> bool, rate: f64) -> Result<Vec<String>> {
        let archived_at = self.clock.time();
        let sealed = self
            .store
            .modify(|document| {
                let mut tracking: TrackingData =
                    read_key(document, TRACKING_DATA_KEY)?.unwrap_or_default();
                let mut archives: Archives = read_key(document, ARCHIVES_KEY)?.unwrap_or_default();

                let months = tracking
                    .iter()
                    .filter(|(month, sites)| should_seal(month) && !sites.is_empty())
                    .map(|(month, _)| month.clone())
                    .collect::<Vec<_>>();

                for month in &months {
                    let Some(sites) = tracking.remove(month) else {
                        continue;
                    };
                    let previous = archives.remove(month);
                    let entry = ArchiveEntry::seal(month.clone(), archived_at, rate, sites, previous);
                    archives.insert(month.clone(), entry);
                }

                if !months.is_empty() {
                    write_key(document, TRACKING_DATA_KEY, &tracking)?;
                    write_key(document, ARCHIVES_KEY, &archives)?;
                }
                Ok(months)
            })
            .await?;

        for month in &sealed {
            info!("Archived month {month}");
        }
        Ok(sealed)
    }

    pub async fn get_archives(&self) -> Result<Archives> {
        let document = self.store.get(&[ARCHIVES_KEY]).await?;
        Ok(read_key(&document, ARCHIVES_KEY)?.unwrap_or_default())
    }

    pub async fn get_archive(&self, key: &str) -> Result<Option<ArchiveEntry>> {
        Ok(self.get_archives().await?.remove(key))
    }

    /// Removes a sealed month. Removing a month that was never sealed succeeds.
    pub async fn delete_archive(&self, key: &str) -> Result<()> {
        let removed = self
            .store
            .modify(|document| {
                let mut archives: Archives = read_key(document, ARCHIVES_KEY)?.unwrap_or_default();
                let removed = archives.remove(key).is_some();
                if removed {
                    write_key(document, ARCHIVES_KEY, &archives)?;
                }
                Ok(removed)
            })
            .await?;
        if removed {
            info!("Deleted archive {key}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;

    use crate::{
        background::storage::{
            entities::{ARCHIVES_KEY, TRACKING_DATA_KEY},
            ledger::Ledger,
            store::MemoryStore,
        },
        utils::clock::{Clock, ManualClock},
    };

    use super::ArchiveService;

    struct Fixture {
        clock: ManualClock,
        store: Arc<MemoryStore>,
        ledger: Ledger<Arc<MemoryStore>>,
        archive: ArchiveService<Arc<MemoryStore>>,
    }

    fn fixture(year: i32, month: u32, day: u32) -> Fixture {
        let clock = ManualClock::local(year, month, day);
        let store = Arc::new(MemoryStore::new());
        Fixture {
            ledger: Ledger::new(store.clone(), Arc::new(clock.clone())),
            archive: ArchiveService::new(store.clone(), Arc::new(clock.clone())),
            store,
            clock,
        }
    }

    #[tokio::test]
    async fn test_archiving_empty_period_does_nothing() -> Result<()> {
        let f = fixture(2025, 3, 15);

        assert!(!f.archive.archive_current_period(0.01).await?);
        assert!(f.store.snapshot().get(ARCHIVES_KEY).is_none());
        assert!(f.archive.get_archives().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_archiving_moves_current_month() -> Result<()> {
        let f = fixture(2025, 3, 15);
        f.ledger.accrue("youtube.com", 10., 0.01).await?;
        f.ledger.accrue("reddit.com", 5., 0.02).await?;

        assert!(f.archive.archive_current_period(0.03).await?);

        let entry = f.archive.get_archive("2025-03").await?.unwrap();
        assert_eq!(entry.month, "2025-03");
        assert_eq!(entry.rate, 0.03);
        assert_eq!(entry.archived_at, f.clock.time());
        assert_eq!(entry.totals.site_count, 2);
        assert!((entry.totals.total_time - 15.).abs() < 1e-9);
        assert!((entry.totals.total_debt - 0.2).abs() < 1e-9);

        // The live partition is gone in the very same write.
        assert!(f.ledger.get_all().await.is_empty());
        assert!(f.store.snapshot().contains_key(TRACKING_DATA_KEY));
        Ok(())
    }

    #[tokio::test]
    async fn test_archiving_twice_in_a_month_keeps_both_parts() -> Result<()> {
        let f = fixture(2025, 3, 15);
        f.ledger.accrue("youtube.com", 10., 0.01).await?;
        f.archive.archive_current_period(0.01).await?;
        f.ledger.accrue("youtube.com", 5., 0.02).await?;
        f.archive.archive_current_period(0.02).await?;

        let entry = f.archive.get_archive("2025-03").await?.unwrap();
        assert!((entry.sites["youtube.com"].total_time - 15.).abs() < 1e-9);
        assert!((entry.sites["youtube.com"].debt - 0.2).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_rollover_seals_previous_months() -> Result<()> {
        let mut f = fixture(2025, 1, 31);
        f.ledger.accrue("youtube.com", 10., 0.01).await?;

        assert!(!f.archive.check_for_month_rollover(0.01).await?);

        f.clock.set(ManualClock::local(2025, 2, 1).time());
        f.ledger.accrue("youtube.com", 1., 0.01).await?;
        assert!(f.archive.check_for_month_rollover(0.01).await?);
        // Second check in the same month is a no-op.
        assert!(!f.archive.check_for_month_rollover(0.01).await?);

        let data = f.ledger.get_all().await;
        assert_eq!(data.keys().collect::<Vec<_>>(), vec!["2025-02"]);
        let january = f.archive.get_archive("2025-01").await?.unwrap();
        assert!((january.totals.total_time - 10.).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_rollover_without_data_still_reports_month_change() -> Result<()> {
        let mut f = fixture(2025, 1, 31);
        assert!(!f.archive.check_for_month_rollover(0.01).await?);
        f.clock.set(ManualClock::local(2025, 2, 1).time());

        assert!(f.archive.check_for_month_rollover(0.01).await?);
        assert!(f.archive.get_archives().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_first_check_seals_months_missed_while_stopped() -> Result<()> {
        let f = fixture(2025, 1, 20);
        f.ledger.accrue("youtube.com", 10., 0.01).await?;

        f.clock.set(ManualClock::local(2025, 2, 3).time());
        let mut archive = ArchiveService::new(f.store.clone(), Arc::new(f.clock.clone()));
        assert!(archive.check_for_month_rollover(0.01).await?);

        let january = archive.get_archive("2025-01").await?.unwrap();
        assert!((january.totals.total_time - 10.).abs() < 1e-9);
        assert!(f.ledger.get_all().await.is_empty());
        // Nothing left over, later checks in the same month are no-ops.
        assert!(!archive.check_for_month_rollover(0.01).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_rollover_is_retried() -> Result<()> {
        let mut f = fixture(2025, 1, 31);
        f.ledger.accrue("youtube.com", 10., 0.01).await?;
        f.clock.set(ManualClock::local(2025, 2, 1).time());

        f.store.set_failing(true);
        assert!(f.archive.check_for_month_rollover(0.01).await.is_err());
        f.store.set_failing(false);
        assert!(f.archive.check_for_month_rollover(0.01).await?);
        assert!(f.archive.get_archive("2025-01").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_archive_is_idempotent() -> Result<()> {
        let f = fixture(2025, 3, 15);
        f.ledger.accrue("youtube.com", 10., 0.01).await?;
        f.archive.archive_current_period(0.01).await?;

        f.archive.delete_archive("2025-03").await?;
        let after_delete = f.store.snapshot();
        f.archive.delete_archive("2025-03").await?;
        f.archive.delete_archive("2020-01").await?;

        assert_eq!(f.store.snapshot(), after_delete);
        assert_eq!(f.archive.get_archive("2025-03").await?, None);
        Ok(())
    }
}
