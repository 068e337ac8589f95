use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::utils::{clock::Clock, time::month_key};

use super::{
    entities::{MonthData, MonthTotals, SiteEntry, TrackingData, TRACKING_DATA_KEY},
    store::{read_key, write_key, KeyValueStore},
};

/// Month partitioned record of time and debt. Live accrual always lands in the partition of the
/// current local month, every other partition is history.
#[derive(Clone)]
pub struct Ledger<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> Ledger<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn current_month_key(&self) -> String {
        month_key(&self.clock.local_time())
    }

    async fn try_get_all(&self) -> Result<TrackingData> {
        let document = self.store.get(&[TRACKING_DATA_KEY]).await?;
        Ok(read_key(&document, TRACKING_DATA_KEY)?.unwrap_or_default())
    }

    /// Returns every month. Read failures are logged and produce an empty ledger.
    pub async fn get_all(&self) -> TrackingData {
        match self.try_get_all().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read tracking data, treating it as empty {e:?}");
                TrackingData::new()
            }
        }
    }

    pub async fn current_month(&self) -> MonthData {
        let month = self.current_month_key();
        self.get_all().await.remove(&month).unwrap_or_default()
    }

    /// Adds a finished session to the current month and returns the updated entry. The whole
    /// read-modify-write happens inside one store modification, so concurrent accruals can't
    /// overwrite each other.
    pub async fn accrue(&self, domain: &str, minutes: f64, rate: f64) -> Result<SiteEntry> {
        let month = self.current_month_key();
        // Negative values would break monotonicity of the month.
        let minutes = minutes.max(0.);
        let rate = rate.max(0.);

        let entry = self
            .store
            .modify(|document| {
                let mut data: TrackingData =
                    read_key(document, TRACKING_DATA_KEY)?.unwrap_or_default();
                let entry = data
                    .entry(month.clone())
                    .or_default()
                    .entry(domain.to_owned())
                    .or_default();
                entry.accrue(minutes, rate);
                let updated = entry.clone();
                write_key(document, TRACKING_DATA_KEY, &data)?;
                Ok(updated)
            })
            .await?;

        debug!("Accrued {minutes:.4} minutes on {domain} in {month}: {entry:?}");
        Ok(entry)
    }

    /// Removes one month entirely. Removing a month that doesn't exist succeeds.
    pub async fn delete_month(&self, key: &str) -> Result<()> {
        let removed = self
            .store
            .modify(|document| {
                let mut data: TrackingData =
                    read_key(document, TRACKING_DATA_KEY)?.unwrap_or_default();
                let removed = data.remove(key).is_some();
                if removed {
                    write_key(document, TRACKING_DATA_KEY, &data)?;
                }
                Ok(removed)
            })
            .await?;
        if removed {
            info!("Deleted month {key}");
        }
        Ok(())
    }

    /// Every month key except the current one, in no particular order.
    pub fn archived_months(&self, data: &TrackingData) -> Vec<String> {
        let current = self.current_month_key();
        data.keys().filter(|month| **month != current).cloned().collect()
    }
}

pub fn month_totals(month: &MonthData) -> MonthTotals {
    MonthTotals::of(month)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use serde_json::json;

    use crate::{
        background::storage::{
            entities::{MonthData, SiteEntry, TRACKING_DATA_KEY},
            store::{write_key, KeyValueStore, MemoryStore},
        },
        utils::{
            clock::{Clock, ManualClock},
            logging::TEST_LOGGING,
        },
    };

    use super::{month_totals, Ledger};

    fn ledger(clock: &ManualClock) -> (Arc<MemoryStore>, Ledger<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Ledger::new(store, Arc::new(clock.clone())))
    }

    fn assert_entry(entry: &SiteEntry, total_time: f64, debt: f64) {
        assert!((entry.total_time - total_time).abs() < 1e-9, "{entry:?}");
        assert!((entry.debt - debt).abs() < 1e-9, "{entry:?}");
    }

    #[tokio::test]
    async fn test_current_month_key_follows_local_calendar() {
        let clock = ManualClock::local(2025, 3, 15);
        let (_, ledger) = ledger(&clock);
        assert_eq!(ledger.current_month_key(), "2025-03");
    }

    #[tokio::test]
    async fn test_accrue_creates_month_and_domain() -> Result<()> {
        *TEST_LOGGING;
        let clock = ManualClock::local(2025, 3, 15);
        let (store, ledger) = ledger(&clock);

        let entry = ledger.accrue("youtube.com", 10., 0.01).await?;
        assert_entry(&entry, 10., 0.1);

        assert_eq!(
            store.snapshot()[TRACKING_DATA_KEY],
            json!({ "2025-03": { "youtube.com": { "totalTime": 10.0, "debt": 0.1 } } })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_debt_is_charged_at_the_rate_of_each_segment() -> Result<()> {
        let clock = ManualClock::local(2025, 3, 15);
        let (_, ledger) = ledger(&clock);

        ledger.accrue("youtube.com", 5., 0.01).await?;
        let entry = ledger.accrue("youtube.com", 5., 0.02).await?;

        // Not 10 * 0.02.
        assert_entry(&entry, 10., 0.15);
        Ok(())
    }

    #[tokio::test]
    async fn test_accrual_lands_in_the_month_it_happens() -> Result<()> {
        let clock = ManualClock::local(2025, 1, 31);
        let (_, ledger) = ledger(&clock);

        ledger.accrue("reddit.com", 3., 0.01).await?;
        clock.set(ManualClock::local(2025, 2, 1).time());
        ledger.accrue("reddit.com", 4., 0.01).await?;

        let data = ledger.get_all().await;
        assert_entry(&data["2025-01"]["reddit.com"], 3., 0.03);
        assert_entry(&data["2025-02"]["reddit.com"], 4., 0.04);
        assert_eq!(ledger.archived_months(&data), vec!["2025-01".to_string()]);
        assert_entry(&ledger.current_month().await["reddit.com"], 4., 0.04);
        Ok(())
    }

    #[tokio::test]
    async fn test_values_never_decrease() -> Result<()> {
        let clock = ManualClock::local(2025, 3, 15);
        let (_, ledger) = ledger(&clock);

        let first = ledger.accrue("x.com", 2., 0.01).await?;
        let second = ledger.accrue("x.com", -1., 0.01).await?;
        let third = ledger.accrue("x.com", 1., -3.).await?;

        assert!(second.total_time >= first.total_time && second.debt >= first.debt);
        assert!(third.total_time >= second.total_time && third.debt >= second.debt);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_accruals_are_not_lost() -> Result<()> {
        let clock = ManualClock::local(2025, 3, 15);
        let (_, ledger) = ledger(&clock);

        let (a, b) = tokio::join!(
            ledger.accrue("youtube.com", 1., 0.01),
            ledger.accrue("youtube.com", 2., 0.01)
        );
        a?;
        b?;

        assert_entry(&ledger.current_month().await["youtube.com"], 3., 0.03);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_all_swallows_read_failures() -> Result<()> {
        let clock = ManualClock::local(2025, 3, 15);
        let (store, ledger) = ledger(&clock);
        ledger.accrue("youtube.com", 1., 0.01).await?;

        store.set_failing(true);
        assert!(ledger.get_all().await.is_empty());
        assert!(ledger.accrue("youtube.com", 1., 0.01).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_all_treats_malformed_data_as_empty() -> Result<()> {
        let clock = ManualClock::local(2025, 3, 15);
        let (store, ledger) = ledger(&clock);
        store
            .modify(|document| write_key(document, TRACKING_DATA_KEY, &json!("garbage")))
            .await?;
        assert!(ledger.get_all().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_month_is_idempotent() -> Result<()> {
        let clock = ManualClock::local(2025, 3, 15);
        let (store, ledger) = ledger(&clock);
        ledger.accrue("youtube.com", 1., 0.01).await?;
        clock.set(ManualClock::local(2025, 4, 2).time());
        ledger.accrue("youtube.com", 1., 0.01).await?;

        ledger.delete_month("2025-03").await?;
        let after_delete = store.snapshot();
        ledger.delete_month("2025-03").await?;
        ledger.delete_month("1999-01").await?;

        assert_eq!(store.snapshot(), after_delete);
        let data = ledger.get_all().await;
        assert_eq!(data.keys().collect::<Vec<_>>(), vec!["2025-04"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_month_totals() {
        let month = MonthData::from([
            ("youtube.com".to_string(), SiteEntry { total_time: 10., debt: 0.1 }),
            ("reddit.com".to_string(), SiteEntry { total_time: 20., debt: 0.3 }),
        ]);
        let totals = month_totals(&month);
        assert_eq!(totals.site_count, 2);
        assert!((totals.total_time - 30.).abs() < 1e-9);
        assert!((totals.total_debt - 0.4).abs() < 1e-9);
    }
}
