use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage key of the user configuration.
pub const CONFIG_KEY: &str = "config";
/// Storage key of the month partitioned ledger.
pub const TRACKING_DATA_KEY: &str = "trackingData";
/// Storage key of sealed month snapshots.
pub const ARCHIVES_KEY: &str = "archives";

pub const DEFAULT_RATE: f64 = 0.01;

const DEFAULT_BLACKHOLES: [&str; 9] = [
    r"facebook\.com",
    r"twitter\.com",
    r"x\.com",
    r"reddit\.com",
    r"youtube\.com",
    r"instagram\.com",
    r"netflix\.com",
    r"tiktok\.com",
    r"twitch\.tv",
];

/// A single tracked site. `url` is a regular expression matched against the full page URL.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Blackhole {
    pub url: String,
}

impl Blackhole {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// User configuration as it is persisted under [CONFIG_KEY].
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub blackholes: Vec<Blackhole>,
    /// Currency per minute.
    #[serde(default = "default_rate")]
    pub rate: f64,
}

fn default_rate() -> f64 {
    DEFAULT_RATE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blackholes: DEFAULT_BLACKHOLES.into_iter().map(Blackhole::new).collect(),
            rate: DEFAULT_RATE,
        }
    }
}

/// Time and debt accumulated for one domain within one month.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    /// Minutes.
    pub total_time: f64,
    pub debt: f64,
}

impl SiteEntry {
    /// Adds a session. Debt is charged at the rate in effect for this session only, previously
    /// accrued debt is never repriced.
    pub fn accrue(&mut self, minutes: f64, rate: f64) {
        self.total_time += minutes;
        self.debt += minutes * rate;
    }

    pub fn combine(&mut self, other: &SiteEntry) {
        self.total_time += other.total_time;
        self.debt += other.debt;
    }
}

/// Domain -> entry for a single month.
pub type MonthData = BTreeMap<String, SiteEntry>;

/// Month key (`YYYY-MM`) -> month data.
pub type TrackingData = BTreeMap<String, MonthData>;

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MonthTotals {
    pub total_time: f64,
    pub total_debt: f64,
    pub site_count: usize,
}

impl MonthTotals {
    pub fn of(month: &MonthData) -> Self {
        month.values().fold(MonthTotals::default(), |mut totals, entry| {
            totals.total_time += entry.total_time;
            totals.total_debt += entry.debt;
            if entry.total_time > 0. {
                totals.site_count += 1;
            }
            totals
        })
    }
}

/// Immutable snapshot of a finished month.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub month: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub archived_at: DateTime<Utc>,
    /// Rate configured when the snapshot was taken. Debt in `sites` was accrued at whatever rate
    /// was in effect for each session.
    pub rate: f64,
    pub sites: MonthData,
    pub totals: MonthTotals,
}

impl ArchiveEntry {
    /// Builds a snapshot of `sites`. When the month was already sealed before, the previous
    /// snapshot is folded into the new one.
    pub fn seal(
        month: String,
        archived_at: DateTime<Utc>,
        rate: f64,
        mut sites: MonthData,
        previous: Option<ArchiveEntry>,
    ) -> Self {
        if let Some(previous) = previous {
            for (domain, entry) in previous.sites {
                sites.entry(domain).or_default().combine(&entry);
            }
        }
        let totals = MonthTotals::of(&sites);
        Self {
            month,
            archived_at,
            rate,
            sites,
            totals,
        }
    }
}

/// Month key -> sealed snapshot.
pub type Archives = BTreeMap<String, ArchiveEntry>;
