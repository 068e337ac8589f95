use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    background::{
        bridge::messages::{ActiveState, Tab},
        storage::{entities::SiteEntry, ledger::Ledger, store::KeyValueStore},
    },
    utils::clock::Clock,
};

use super::{
    indicator::{IconState, Indicator},
    matcher::PatternSet,
};

/// The tracked tab and its start time only ever exist together.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Session {
    Idle,
    Tracking { tab: Tab, started_at: DateTime<Utc> },
}

impl Session {
    pub fn is_tracking(&self) -> bool {
        matches!(self, Session::Tracking { .. })
    }

    pub fn active_state(&self) -> ActiveState {
        match self {
            Session::Idle => ActiveState::idle(),
            Session::Tracking { tab, started_at } => ActiveState {
                is_active: true,
                domain: domain_of(tab.url.as_deref()).ok(),
                start_time: Some(*started_at),
            },
        }
    }
}

/// Result of flushing a finished session into the ledger.
#[derive(PartialEq, Debug, Clone)]
pub struct Accrual {
    pub domain: String,
    pub minutes: f64,
    pub entry: SiteEntry,
}

/// Host component of a URL, e.g. `www.youtube.com`.
pub fn domain_of(url: Option<&str>) -> Result<String> {
    let url = url.ok_or_else(|| anyhow!("Tab has no url"))?;
    let parsed = Url::parse(url)?;
    parsed
        .host_str()
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("Url {url} has no host"))
}

/// Sub-second precision, never negative even if the wall clock jumped backwards.
pub fn elapsed_minutes(started_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed = now - started_at;
    let micros = elapsed
        .num_microseconds()
        .unwrap_or_else(|| elapsed.num_milliseconds().saturating_mul(1000));
    micros.max(0) as f64 / 60_000_000.
}

/// State machine deciding when a blackhole session starts and ends. Every foreground change
/// first closes the open session, so at most one session exists and no time is dropped.
pub struct SessionTracker<S> {
    session: Session,
    ledger: Ledger<S>,
    clock: Arc<dyn Clock>,
    indicator: Box<dyn Indicator>,
}

impl<S: KeyValueStore> SessionTracker<S> {
    pub fn new(ledger: Ledger<S>, clock: Arc<dyn Clock>, indicator: Box<dyn Indicator>) -> Self {
        Self {
            session: Session::Idle,
            ledger,
            clock,
            indicator,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handles a new foreground target. `None` means nothing of the browser is in the foreground
    /// anymore. Returns what the previous session accrued, if anything.
    pub async fn handle_tab_change(
        &mut self,
        tab: Option<Tab>,
        patterns: &PatternSet,
        rate: f64,
    ) -> Option<Accrual> {
        let accrual = self.stop(rate).await;

        match tab {
            Some(tab) if patterns.is_tracked(tab.url.as_deref()) => {
                match domain_of(tab.url.as_deref()) {
                    Ok(_) => self.start(tab),
                    Err(e) => debug!("Tab {} matches a blackhole but has no domain: {e}", tab.id),
                }
            }
            Some(tab) => debug!("Tab {} is not a blackhole, not tracking", tab.id),
            None => debug!("No foreground tab, not tracking"),
        }

        accrual
    }

    fn start(&mut self, tab: Tab) {
        let started_at = self.clock.time();
        info!("Started tracking {:?}", tab.url);
        self.session = Session::Tracking { tab, started_at };
        self.indicator.show(IconState::Tracking);
    }

    /// Closes the open session and adds its time to the ledger. Whatever happens while saving,
    /// the tracker ends up idle.
    pub async fn stop(&mut self, rate: f64) -> Option<Accrual> {
        let Session::Tracking { tab, started_at } =
            std::mem::replace(&mut self.session, Session::Idle)
        else {
            debug!("No active tracking session to stop");
            return None;
        };
        self.indicator.show(IconState::Default);

        let domain = match domain_of(tab.url.as_deref()) {
            Ok(domain) => domain,
            Err(e) => {
                warn!("Dropping session of tab {}, can't extract domain: {e}", tab.id);
                return None;
            }
        };

        let minutes = elapsed_minutes(started_at, self.clock.time());
        match self.ledger.accrue(&domain, minutes, rate).await {
            Ok(entry) => {
                info!("Stopped tracking {domain}: {minutes:.2} minutes");
                Some(Accrual {
                    domain,
                    minutes,
                    entry,
                })
            }
            Err(e) => {
                error!("Failed to save {minutes:.4} minutes on {domain} {e:?}");
                None
            }
        }
    }
}
