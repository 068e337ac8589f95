use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{
    background::{
        bridge::messages::{Inbound, Outbound, Tab, MONTH_CHANGE_ALARM, WINDOW_ID_NONE},
        messaging::NotificationChannel,
        storage::{
            archive::ArchiveService,
            config::{load_config, CONFIG_KEYS},
            entities::Config,
            ledger::Ledger,
            store::KeyValueStore,
        },
        tracking::{
            indicator::Indicator,
            matcher::PatternSet,
            session::{Session, SessionTracker},
        },
    },
    utils::clock::Clock,
};

use super::module::EventProcessor;

/// Storage namespaces whose changes the browser forwards.
const WATCHED_NAMESPACES: [&str; 2] = ["local", "sync"];

/// Everything the host process knows while it runs. Owned by the processing loop and handed
/// every event in turn.
pub struct Background<S> {
    store: S,
    config: Config,
    patterns: PatternSet,
    ledger: Ledger<S>,
    tracker: SessionTracker<S>,
    archive: ArchiveService<S>,
    channel: NotificationChannel,
}

impl<S: KeyValueStore + Clone> Background<S> {
    /// Loads the configuration and runs the startup rollover check. No event is handled before
    /// this completes.
    pub async fn initialize(
        store: S,
        clock: Arc<dyn Clock>,
        indicator: Box<dyn Indicator>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        let config = load_config(&store).await;
        let patterns = PatternSet::compile(&config.blackholes);
        info!(
            "Tracking {} patterns at {} per minute",
            patterns.len(),
            config.rate
        );

        let ledger = Ledger::new(store.clone(), clock.clone());
        let mut background = Self {
            tracker: SessionTracker::new(ledger.clone(), clock.clone(), indicator),
            archive: ArchiveService::new(store.clone(), clock),
            channel: NotificationChannel::new(outbound),
            ledger,
            store,
            config,
            patterns,
        };
        background.check_rollover().await;
        background
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Session {
        self.tracker.session()
    }

    async fn reload_configuration(&mut self) {
        self.config = load_config(&self.store).await;
        self.patterns = PatternSet::compile(&self.config.blackholes);
        info!(
            "Reloaded configuration, {} patterns at {} per minute",
            self.patterns.len(),
            self.config.rate
        );
    }

    async fn handle_tab_change(&mut self, tab: Option<Tab>) {
        let accrual = self
            .tracker
            .handle_tab_change(tab, &self.patterns, self.config.rate)
            .await;
        if accrual.is_some() {
            self.publish_tracking_update().await;
        }
    }

    async fn publish_tracking_update(&self) {
        if self.channel.is_popup_registered() {
            self.channel.publish(self.ledger.get_all().await);
        }
    }

    async fn check_rollover(&mut self) {
        match self.archive.check_for_month_rollover(self.config.rate).await {
            Ok(true) => self.publish_tracking_update().await,
            Ok(false) => {}
            Err(e) => error!("Month rollover check failed, retrying on the next alarm {e:?}"),
        }
    }
}

impl<S: KeyValueStore + Clone> EventProcessor for Background<S> {
    async fn process_next(&mut self, message: Inbound) -> Result<()> {
        match message {
            Inbound::TabActivated { tab } => self.handle_tab_change(Some(tab)).await,
            Inbound::TabUpdated {
                tab_id,
                change_info,
                tab,
            } => {
                let Some(url) = change_info.url else {
                    debug!("Tab {tab_id} updated without a url change");
                    return Ok(());
                };
                if tab.active == Some(false) {
                    debug!("Ignoring navigation in background tab {tab_id}");
                    return Ok(());
                }
                let tab = Tab {
                    url: Some(url),
                    ..tab
                };
                self.handle_tab_change(Some(tab)).await
            }
            Inbound::WindowFocusChanged {
                window_id,
                active_tab,
            } => {
                if window_id == WINDOW_ID_NONE {
                    debug!("Browser lost focus");
                    self.handle_tab_change(None).await
                } else if let Some(tab) = active_tab {
                    self.handle_tab_change(Some(tab)).await
                } else {
                    debug!("Window {window_id} gained focus without an active tab");
                }
            }
            Inbound::StorageChanged { namespace, keys } => {
                let config_changed = keys.iter().any(|key| CONFIG_KEYS.contains(&key.as_str()));
                if WATCHED_NAMESPACES.contains(&namespace.as_str()) && config_changed {
                    self.reload_configuration().await;
                }
            }
            Inbound::Alarm { name } if name == MONTH_CHANGE_ALARM => {
                self.reload_configuration().await;
                self.check_rollover().await;
            }
            Inbound::Alarm { name } => debug!("Ignoring unknown alarm {name}"),
            Inbound::GetActiveState { request_id } => {
                let state = self.tracker.session().active_state();
                self.channel.respond(request_id, state).await;
            }
            Inbound::RegisterPopup => {
                self.channel.register_popup();
                // A popup that just opened gets the current ledger right away.
                self.publish_tracking_update().await;
            }
            Inbound::UnregisterPopup => self.channel.unregister_popup(),
            Inbound::ReloadConfig => self.reload_configuration().await,
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(accrual) = self.tracker.stop(self.config.rate).await {
            info!(
                "Flushed open session on {} before shutting down",
                accrual.domain
            );
        }
        Ok(())
    }
}
