use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::DateTime;
use flashloan_shared::{
    domain::{Address, BatchId},
    protocol::BatchRecord,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::info;
use url::Url;

use crate::store::BatchStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Succeeded,
    Failed(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationLine {
    pub recipient: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub asset: String,
    pub total_amount: String,
    pub premium: String,
    pub recipient_count: usize,
    pub executed_at: String,
    pub tx_hash: Option<String>,
    pub tx_link: Option<String>,
    /// Present only for expanded rows.
    pub allocations: Option<Vec<AllocationLine>>,
}

/// Per-user view over the store's batch history.
pub struct HistoryViewer {
    store: Arc<BatchStore>,
    user: Address,
    expanded: HashSet<BatchId>,
    explorer_tx_url: Option<String>,
}

impl HistoryViewer {
    pub fn new(store: Arc<BatchStore>, user: Address) -> Self {
        Self {
            store,
            user,
            expanded: HashSet::new(),
            explorer_tx_url: None,
        }
    }

    pub fn with_explorer(mut self, explorer_tx_url: Option<String>) -> Self {
        self.explorer_tx_url = explorer_tx_url;
        self
    }

    pub fn user(&self) -> Address {
        self.user
    }

    /// Manual refresh; may overlap the poller.
    pub async fn refresh(&self) -> bool {
        self.store.fetch_user_batches(self.user).await
    }

    /// Flips the expansion state and returns whether the batch is now expanded.
    pub fn toggle(&mut self, batch_id: &BatchId) -> bool {
        if self.expanded.remove(batch_id) {
            false
        } else {
            self.expanded.insert(batch_id.clone());
            true
        }
    }

    pub fn expand_all(&mut self, batch_ids: impl IntoIterator<Item = BatchId>) {
        self.expanded.extend(batch_ids);
    }

    pub fn is_expanded(&self, batch_id: &BatchId) -> bool {
        self.expanded.contains(batch_id)
    }

    pub async fn rows(&self) -> Vec<HistoryRow> {
        let records = self.store.user_batches().await;
        render_rows(&records, &self.expanded, self.explorer_tx_url.as_deref())
    }

    pub fn spawn_poller(&self, every: Duration) -> JoinHandle<()> {
        spawn_history_poller(Arc::clone(&self.store), self.user, every)
    }
}

/// Fetches immediately, then on every tick until the handle is aborted.
pub fn spawn_history_poller(
    store: Arc<BatchStore>,
    user: Address,
    every: Duration,
) -> JoinHandle<()> {
    info!(user = %user, interval_secs = every.as_secs(), "flashloan: history polling started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            store.fetch_user_batches(user).await;
        }
    })
}

pub fn render_rows(
    records: &[BatchRecord],
    expanded: &HashSet<BatchId>,
    explorer_tx_url: Option<&str>,
) -> Vec<HistoryRow> {
    records
        .iter()
        .map(|record| HistoryRow {
            batch_id: record.batch_id.clone(),
            status: if record.success {
                BatchStatus::Succeeded
            } else {
                BatchStatus::Failed(record.failure_reason.clone())
            },
            asset: record.asset.short(),
            total_amount: record.total_amount.to_decimal_string(),
            premium: record.premium.to_decimal_string(),
            recipient_count: record.recipients.len(),
            executed_at: format_timestamp(record.timestamp),
            tx_hash: record.tx_hash.clone(),
            tx_link: record
                .tx_hash
                .as_deref()
                .and_then(|hash| explorer_tx_url.and_then(|base| tx_link(base, hash))),
            allocations: expanded
                .contains(&record.batch_id)
                .then(|| allocation_lines(record)),
        })
        .collect()
}

fn allocation_lines(record: &BatchRecord) -> Vec<AllocationLine> {
    record
        .recipients
        .iter()
        .enumerate()
        .map(|(index, recipient)| AllocationLine {
            recipient: recipient.to_string(),
            amount: record
                .allocations
                .get(index)
                .map(|amount| amount.to_decimal_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn tx_link(explorer_tx_url: &str, tx_hash: &str) -> Option<String> {
    if explorer_tx_url.contains("{tx}") {
        return Some(explorer_tx_url.replace("{tx}", tx_hash));
    }
    let mut base = explorer_tx_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|base| base.join(tx_hash))
        .map(|url| url.to_string())
        .ok()
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
