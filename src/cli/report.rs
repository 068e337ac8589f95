use std::{collections::BTreeMap, fmt::Write, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Local, Utc};

use crate::{
    background::storage::{
        archive::ArchiveService,
        config::load_config,
        entities::{MonthData, MonthTotals, SiteEntry},
        ledger::{month_totals, Ledger},
        store::KeyValueStore,
    },
    utils::{clock::Clock, time::format_minutes},
};

/// One month as the user sees it: its sealed snapshot and whatever was recorded after sealing,
/// merged together.
#[derive(PartialEq, Debug, Clone)]
pub struct MonthView {
    pub month: String,
    pub sites: MonthData,
    pub archived_at: Option<DateTime<Utc>>,
    /// Part of the month lives in the ledger and hasn't been sealed yet.
    pub pending: bool,
}

impl MonthView {
    fn new(month: String) -> Self {
        Self {
            month,
            sites: MonthData::new(),
            archived_at: None,
            pending: false,
        }
    }

    fn add(&mut self, sites: &MonthData) {
        for (domain, entry) in sites {
            self.sites.entry(domain.clone()).or_default().combine(entry);
        }
    }

    pub fn totals(&self) -> MonthTotals {
        month_totals(&self.sites)
    }
}

/// Collects sealed archives and past ledger partitions. The current month's partition is left
/// out unless `include_current` is set.
pub async fn load_months<S: KeyValueStore + Clone>(
    store: &S,
    clock: Arc<dyn Clock>,
    include_current: bool,
) -> Result<BTreeMap<String, MonthView>> {
    let ledger = Ledger::new(store.clone(), clock.clone());
    let archives = ArchiveService::new(store.clone(), clock).get_archives().await?;
    let mut tracking = ledger.get_all().await;

    let mut months = BTreeMap::new();
    for (month, archive) in archives {
        let view = months
            .entry(month.clone())
            .or_insert_with(|| MonthView::new(month));
        view.add(&archive.sites);
        view.archived_at = Some(archive.archived_at);
    }

    let mut partitions = ledger.archived_months(&tracking);
    if include_current {
        partitions.push(ledger.current_month_key());
    }
    for month in partitions {
        let Some(sites) = tracking.remove(&month) else {
            continue;
        };
        if sites.is_empty() {
            continue;
        }
        let view = months
            .entry(month.clone())
            .or_insert_with(|| MonthView::new(month));
        view.add(&sites);
        view.pending = true;
    }
    Ok(months)
}

fn sorted_by_debt(sites: &MonthData) -> Vec<(&String, &SiteEntry)> {
    let mut sites = sites.iter().collect::<Vec<_>>();
    sites.sort_by(|(a_domain, a), (b_domain, b)| {
        b.debt
            .total_cmp(&a.debt)
            .then_with(|| a_domain.cmp(b_domain))
    });
    sites
}

fn write_sites(output: &mut String, sites: &MonthData) -> std::fmt::Result {
    for (domain, entry) in sorted_by_debt(sites) {
        writeln!(
            output,
            "{domain}\t{}\t${:.2}",
            format_minutes(entry.total_time),
            entry.debt
        )?;
    }
    Ok(())
}

/// Current month summary: every domain with its time and debt, most expensive first.
pub fn render_report(month: &str, sites: &MonthData, rate: f64) -> Result<String> {
    let mut output = String::new();
    if sites.is_empty() {
        writeln!(output, "No blackhole time recorded in {month} yet")?;
        return Ok(output);
    }

    writeln!(output, "Blackhole debt for {month} at {rate}/min")?;
    write_sites(&mut output, sites)?;
    writeln!(output, "Total\t${:.5}", month_totals(sites).total_debt)?;
    Ok(output)
}

pub fn render_history(months: &BTreeMap<String, MonthView>) -> Result<String> {
    let mut output = String::new();
    if months.is_empty() {
        writeln!(output, "No archived months")?;
        return Ok(output);
    }

    for view in months.values().rev() {
        let totals = view.totals();
        let state = match (view.archived_at, view.pending) {
            (Some(at), false) => format!("archived {}", at.with_timezone(&Local).format("%x")),
            (Some(at), true) => format!(
                "archived {}, partly unsealed",
                at.with_timezone(&Local).format("%x")
            ),
            (None, _) => "not archived".to_string(),
        };
        writeln!(
            output,
            "{}\t{}\t${:.2}\t{} sites\t{state}",
            view.month,
            format_minutes(totals.total_time),
            totals.total_debt,
            totals.site_count,
        )?;
    }
    Ok(output)
}

pub fn render_month(view: &MonthView) -> Result<String> {
    let mut output = String::new();
    let totals = view.totals();
    writeln!(
        output,
        "{}\t{}\t${:.2}\t{} sites",
        view.month,
        format_minutes(totals.total_time),
        totals.total_debt,
        totals.site_count
    )?;
    write_sites(&mut output, &view.sites)?;
    Ok(output)
}

pub async fn report<S: KeyValueStore + Clone>(store: &S, clock: Arc<dyn Clock>) -> Result<String> {
    let config = load_config(store).await;
    let ledger = Ledger::new(store.clone(), clock);
    let month = ledger.current_month_key();
    let sites = ledger.current_month().await;
    render_report(&month, &sites, config.rate)
}

pub async fn history<S: KeyValueStore + Clone>(store: &S, clock: Arc<dyn Clock>) -> Result<String> {
    render_history(&load_months(store, clock, false).await?)
}

pub async fn show<S: KeyValueStore + Clone>(
    store: &S,
    clock: Arc<dyn Clock>,
    month: &str,
) -> Result<String> {
    match load_months(store, clock, true).await?.get(month) {
        Some(view) => render_month(view),
        None => Ok(format!("Nothing recorded for {month}\n")),
    }
}
