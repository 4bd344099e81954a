//! Workflow controller for one in-flight multi-recipient batch.
//!
//! The store owns the form, the wallet initiator, the latest quote and risk
//! result, and the cached batch history. Every remote call re-validates the
//! form first. Failures never escape: they land in `last_error` and are
//! broadcast as [`StoreEvent::Error`].
//!
//! Each call captures a request generation for its kind. A response whose
//! generation is no longer the newest for that kind is discarded, and risk or
//! quote responses are also discarded when the form or the wallet changed
//! while they were in flight. Batches executed after a history fetch started
//! are merged back into that fetch's result.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use flashloan_shared::{
    domain::{Address, BatchId, Recommendation},
    protocol::{BatchRecord, Quote, RiskAssessment},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    backend::FlashLoanBackend,
    error::{ErrorCategory, WorkflowError},
    form::BatchForm,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    RiskAssessment,
    Quote,
    Execute,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AssessingRisk,
    Quoting,
    Executing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskSummary {
    pub risk_score: f64,
    pub recommendation: Recommendation,
    /// Non-blocking warnings for `WARN` and `BLOCK` recommendations.
    pub warnings: Vec<String>,
}

impl From<RiskAssessment> for RiskSummary {
    fn from(assessment: RiskAssessment) -> Self {
        let warnings = match assessment.recommendation {
            Recommendation::Approve => Vec::new(),
            Recommendation::Warn if assessment.reasons.is_empty() => {
                vec!["Risk check flagged this batch; review before executing".to_string()]
            }
            Recommendation::Block if assessment.reasons.is_empty() => {
                vec!["Risk check recommends blocking this batch".to_string()]
            }
            Recommendation::Warn | Recommendation::Block => assessment.reasons,
        };
        Self {
            risk_score: assessment.risk_score,
            recommendation: assessment.recommendation,
            warnings,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StoreEvent {
    FormChanged {
        revision: u64,
    },
    RiskAssessed(RiskSummary),
    QuoteUpdated(Quote),
    QuoteCleared,
    BatchExecuted {
        batch_id: BatchId,
        tx_hash: Option<String>,
    },
    HistoryUpdated {
        count: usize,
    },
    Error {
        category: ErrorCategory,
        message: String,
    },
}

/// Read-only copy of the store for rendering.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub form: BatchForm,
    pub initiator: Option<Address>,
    pub phase: Phase,
    pub loading_history: bool,
    pub risk: Option<RiskSummary>,
    pub quote: Option<Quote>,
    pub current_batch_id: Option<BatchId>,
    pub user_batches: Vec<BatchRecord>,
    pub last_error: Option<WorkflowError>,
}

impl StoreSnapshot {
    pub fn last_error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(ToString::to_string)
    }
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    kind: RequestKind,
    generation: u64,
    form_revision: u64,
    initiator: Option<Address>,
}

struct StoreState {
    form: BatchForm,
    initiator: Option<Address>,
    risk: Option<RiskSummary>,
    quote: Option<Quote>,
    current_batch_id: Option<BatchId>,
    user_batches: Vec<BatchRecord>,
    last_error: Option<WorkflowError>,
    last_error_source: Option<RequestKind>,
    /// Executed batches stamped with the generation at which they were recorded.
    executed: Vec<(u64, BatchRecord)>,
    next_generation: u64,
    latest_generation: HashMap<RequestKind, u64>,
    in_flight: HashMap<RequestKind, usize>,
}

impl StoreState {
    fn new() -> Self {
        Self {
            form: BatchForm::new(),
            initiator: None,
            risk: None,
            quote: None,
            current_batch_id: None,
            user_batches: Vec::new(),
            last_error: None,
            last_error_source: None,
            executed: Vec::new(),
            next_generation: 0,
            latest_generation: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    fn begin(&mut self, kind: RequestKind) -> Ticket {
        self.next_generation += 1;
        self.latest_generation.insert(kind, self.next_generation);
        *self.in_flight.entry(kind).or_default() += 1;
        Ticket {
            kind,
            generation: self.next_generation,
            form_revision: self.form.revision(),
            initiator: self.initiator,
        }
    }

    fn finish(&mut self, ticket: &Ticket) {
        if let Some(count) = self.in_flight.get_mut(&ticket.kind) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.in_flight.remove(&ticket.kind);
            }
        }
    }

    fn is_latest(&self, ticket: &Ticket) -> bool {
        self.latest_generation.get(&ticket.kind) == Some(&ticket.generation)
    }

    /// Latest for its kind and computed from the form as it still is.
    fn matches_form(&self, ticket: &Ticket) -> bool {
        self.is_latest(ticket) && self.form.revision() == ticket.form_revision
    }

    /// Like [`Self::matches_form`], and issued for the wallet still connected.
    fn matches_inputs(&self, ticket: &Ticket) -> bool {
        self.matches_form(ticket) && self.initiator == ticket.initiator
    }

    fn record_executed(&mut self, record: BatchRecord) {
        self.next_generation += 1;
        self.user_batches
            .retain(|existing| existing.batch_id != record.batch_id);
        self.user_batches.insert(0, record.clone());
        self.executed.push((self.next_generation, record));
    }

    /// Re-adds batches for `user` executed after `ticket` was issued that the
    /// fetched page does not know about yet.
    fn merge_executed(
        &mut self,
        ticket: &Ticket,
        user: Address,
        mut batches: Vec<BatchRecord>,
    ) -> Vec<BatchRecord> {
        let newer = |recorded_at: u64, record: &BatchRecord| {
            recorded_at > ticket.generation && record.initiator == user
        };
        for (recorded_at, record) in &self.executed {
            if newer(*recorded_at, record)
                && !batches.iter().any(|b| b.batch_id == record.batch_id)
            {
                batches.insert(0, record.clone());
            }
        }
        // Older entries for this user are now covered by the backend's answer.
        self.executed.retain(|(recorded_at, record)| {
            newer(*recorded_at, record) || record.initiator != user
        });
        batches
    }

    fn is_busy(&self, kind: RequestKind) -> bool {
        self.in_flight.contains_key(&kind)
    }

    fn phase(&self) -> Phase {
        if self.is_busy(RequestKind::Execute) {
            Phase::Executing
        } else if self.is_busy(RequestKind::Quote) {
            Phase::Quoting
        } else if self.is_busy(RequestKind::RiskAssessment) {
            Phase::AssessingRisk
        } else {
            Phase::Idle
        }
    }
}

pub struct BatchStore {
    backend: Arc<dyn FlashLoanBackend>,
    inner: Mutex<StoreState>,
    events: broadcast::Sender<StoreEvent>,
}

impl BatchStore {
    pub fn new(backend: Arc<dyn FlashLoanBackend>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            backend,
            inner: Mutex::new(StoreState::new()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn fail(&self, state: &mut StoreState, err: WorkflowError) {
        if err.is_local() {
            info!(error = %err, "flashloan: request rejected locally");
        } else {
            warn!(error = %err, "flashloan: backend call failed");
        }
        let category = err.category();
        let message = err.to_string();
        state.last_error = Some(err);
        state.last_error_source = None;
        self.emit(StoreEvent::Error { category, message });
    }

    fn invalidate_derived(&self, state: &mut StoreState) {
        state.risk = None;
        if state.quote.take().is_some() {
            self.emit(StoreEvent::QuoteCleared);
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.inner.lock().await;
        StoreSnapshot {
            form: state.form.clone(),
            initiator: state.initiator,
            phase: state.phase(),
            loading_history: state.is_busy(RequestKind::History),
            risk: state.risk.clone(),
            quote: state.quote.clone(),
            current_batch_id: state.current_batch_id.clone(),
            user_batches: state.user_batches.clone(),
            last_error: state.last_error.clone(),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.inner.lock().await.phase()
    }

    pub async fn quote(&self) -> Option<Quote> {
        self.inner.lock().await.quote.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .last_error
            .as_ref()
            .map(ToString::to_string)
    }

    pub async fn user_batches(&self) -> Vec<BatchRecord> {
        self.inner.lock().await.user_batches.clone()
    }

    pub async fn clear_error(&self) {
        self.inner.lock().await.last_error = None;
    }

    /// Connected wallet address; wallet connection itself happens elsewhere.
    pub async fn set_initiator(&self, initiator: Option<Address>) {
        let mut state = self.inner.lock().await;
        if state.initiator != initiator {
            state.initiator = initiator;
            state.risk = None;
        }
    }

    /// Applies `edit` to the form; any change drops the quote and risk result.
    pub async fn edit_form<R>(&self, edit: impl FnOnce(&mut BatchForm) -> R) -> R {
        let mut state = self.inner.lock().await;
        let before = state.form.revision();
        let result = edit(&mut state.form);
        let revision = state.form.revision();
        if revision != before {
            self.invalidate_derived(&mut state);
            self.emit(StoreEvent::FormChanged { revision });
        }
        result
    }

    /// Swaps in a whole form (e.g. loaded from a file).
    pub async fn replace_form(&self, mut form: BatchForm) {
        self.edit_form(move |current| {
            form.set_revision_floor(current.revision() + 1);
            *current = form;
        })
        .await;
    }

    pub async fn reset_form(&self) {
        self.edit_form(BatchForm::reset).await;
    }

    /// Returns `true` when a fresh assessment was stored.
    pub async fn assess_risk(&self) -> bool {
        let (ticket, request) = {
            let mut state = self.inner.lock().await;
            let Some(initiator) = state.initiator else {
                self.fail(&mut state, WorkflowError::WalletNotConnected);
                return false;
            };
            let batch = match state.form.validate() {
                Ok(batch) => batch,
                Err(err) => {
                    self.fail(&mut state, err.into());
                    return false;
                }
            };
            state.last_error = None;
            let ticket = state.begin(RequestKind::RiskAssessment);
            (ticket, batch.risk_request(initiator))
        };

        let result = self.backend.assess_risk(&request).await;

        let mut state = self.inner.lock().await;
        state.finish(&ticket);
        if !state.matches_inputs(&ticket) {
            debug!(
                generation = ticket.generation,
                "flashloan: discarding stale risk assessment"
            );
            return false;
        }

        match result {
            Ok(assessment) => {
                let summary = RiskSummary::from(assessment);
                if summary.recommendation != Recommendation::Approve {
                    warn!(
                        risk_score = summary.risk_score,
                        recommendation = ?summary.recommendation,
                        "flashloan: risk check raised warnings"
                    );
                }
                state.risk = Some(summary.clone());
                self.emit(StoreEvent::RiskAssessed(summary));
                true
            }
            Err(err) => {
                self.fail(&mut state, err.into());
                false
            }
        }
    }

    /// Returns `true` when a fresh quote was stored.
    pub async fn request_quote(&self) -> bool {
        let (ticket, request) = {
            let mut state = self.inner.lock().await;
            let batch = match state.form.validate() {
                Ok(batch) => batch,
                Err(err) => {
                    self.fail(&mut state, err.into());
                    return false;
                }
            };
            state.last_error = None;
            let ticket = state.begin(RequestKind::Quote);
            (ticket, batch.quote_request())
        };

        let result = self.backend.quote(&request).await;

        let mut state = self.inner.lock().await;
        state.finish(&ticket);
        if !state.matches_form(&ticket) {
            debug!(
                generation = ticket.generation,
                "flashloan: discarding stale quote"
            );
            return false;
        }

        match result {
            Ok(quote) => {
                info!(
                    premium = %quote.premium,
                    fee_bps = quote.fee_bps,
                    "flashloan: quote received"
                );
                state.quote = Some(quote.clone());
                self.emit(StoreEvent::QuoteUpdated(quote));
                true
            }
            Err(err) => {
                self.fail(&mut state, err.into());
                false
            }
        }
    }

    /// Executes the batch described by the current form against the held quote.
    ///
    /// Fails locally without a network call when no quote is held.
    pub async fn execute(&self) -> Option<BatchId> {
        let (ticket, request, batch, initiator, premium) = {
            let mut state = self.inner.lock().await;
            let Some(quote) = state.quote.clone() else {
                self.fail(&mut state, WorkflowError::MissingQuote);
                return None;
            };
            let Some(initiator) = state.initiator else {
                self.fail(&mut state, WorkflowError::WalletNotConnected);
                return None;
            };
            let batch = match state.form.validate() {
                Ok(batch) => batch,
                Err(err) => {
                    self.fail(&mut state, err.into());
                    return None;
                }
            };
            state.last_error = None;
            let ticket = state.begin(RequestKind::Execute);
            let request = batch.execute_request(initiator);
            (ticket, request, batch, initiator, quote.premium)
        };

        let result = self.backend.execute(&request).await;

        let mut state = self.inner.lock().await;
        state.finish(&ticket);
        let current = state.is_latest(&ticket);

        match result {
            Ok(response) => {
                let record =
                    batch.executed_record(&response, initiator, premium, Utc::now().timestamp());
                state.record_executed(record);
                info!(
                    batch_id = %response.batch_id,
                    recipients = batch.allocations.len(),
                    "flashloan: batch executed"
                );

                if !current {
                    debug!(
                        generation = ticket.generation,
                        "flashloan: stale execute recorded in history only"
                    );
                    return Some(response.batch_id);
                }

                if state.quote.take().is_some() {
                    self.emit(StoreEvent::QuoteCleared);
                }
                state.current_batch_id = Some(response.batch_id.clone());
                if state.form.revision() == ticket.form_revision {
                    state.form.reset();
                    state.risk = None;
                    self.emit(StoreEvent::FormChanged {
                        revision: state.form.revision(),
                    });
                }
                self.emit(StoreEvent::BatchExecuted {
                    batch_id: response.batch_id.clone(),
                    tx_hash: response.tx_hash,
                });
                Some(response.batch_id)
            }
            Err(err) => {
                if current {
                    self.fail(&mut state, err.into());
                } else {
                    debug!(
                        generation = ticket.generation,
                        error = %err,
                        "flashloan: discarding stale execute failure"
                    );
                }
                None
            }
        }
    }

    /// Replaces the cached history; on failure the cache is left untouched.
    pub async fn fetch_user_batches(&self, user: Address) -> bool {
        let ticket = self.inner.lock().await.begin(RequestKind::History);

        let result = self.backend.user_batches(user).await;

        let mut state = self.inner.lock().await;
        state.finish(&ticket);
        if !state.is_latest(&ticket) {
            debug!(
                generation = ticket.generation,
                "flashloan: discarding stale history response"
            );
            return false;
        }

        match result {
            Ok(batches) => {
                let batches = state.merge_executed(&ticket, user, batches);
                let count = batches.len();
                state.user_batches = batches;
                if state.last_error_source == Some(RequestKind::History) {
                    state.last_error = None;
                    state.last_error_source = None;
                }
                debug!(user = %user, count, "flashloan: history refreshed");
                self.emit(StoreEvent::HistoryUpdated { count });
                true
            }
            Err(err) => {
                self.fail(&mut state, err.into());
                state.last_error_source = Some(RequestKind::History);
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
