use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::RuleError;
use crate::evaluator::{AudienceEstimate, AudienceEvaluator, CustomerProfile};
use crate::query::BackendQuery;

/// Source of audience estimates for a backend query.
#[async_trait]
pub trait AudienceEstimator: Send + Sync {
    async fn estimate(&self, query: &BackendQuery) -> Result<AudienceEstimate, RuleError>;
}

/// Estimator over a fixed in-memory customer list.
#[derive(Debug, Clone)]
pub struct InMemoryAudience {
    customers: Arc<Vec<CustomerProfile>>,
    evaluator: AudienceEvaluator,
}

impl InMemoryAudience {
    pub fn new(customers: Vec<CustomerProfile>, evaluator: AudienceEvaluator) -> Self {
        Self {
            customers: Arc::new(customers),
            evaluator,
        }
    }
}

#[async_trait]
impl AudienceEstimator for InMemoryAudience {
    async fn estimate(&self, query: &BackendQuery) -> Result<AudienceEstimate, RuleError> {
        Ok(self.evaluator.evaluate(query, &self.customers))
    }
}

/// Proof that an estimate was requested at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewTicket {
    generation: u64,
}

impl PreviewTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Latest accepted estimate with the generation it was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSnapshot {
    pub generation: u64,
    pub estimate: AudienceEstimate,
}

#[derive(Debug, Default)]
struct TrackerState {
    issued: AtomicU64,
    latest: Mutex<Option<PreviewSnapshot>>,
}

/// Orders concurrent estimates so that only the newest request wins.
///
/// Every scheduled estimate takes a ticket. A result is recorded only while
/// its ticket is still the most recently issued one; anything older is
/// dropped on arrival.
#[derive(Debug, Clone, Default)]
pub struct PreviewTracker {
    state: Arc<TrackerState>,
}

impl PreviewTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> PreviewTicket {
        let generation = self.state.issued.fetch_add(1, Ordering::SeqCst) + 1;
        PreviewTicket { generation }
    }

    pub fn current_generation(&self) -> u64 {
        self.state.issued.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: PreviewTicket) -> bool {
        ticket.generation == self.current_generation()
    }

    /// Records `estimate` if `ticket` is still current. Returns whether it was kept.
    pub fn record(&self, ticket: PreviewTicket, estimate: AudienceEstimate) -> bool {
        let mut latest = self.state.latest.lock();
        if !self.is_current(ticket) {
            debug!(
                generation = ticket.generation,
                current = self.current_generation(),
                "dropping stale audience estimate"
            );
            return false;
        }
        *latest = Some(PreviewSnapshot {
            generation: ticket.generation,
            estimate,
        });
        true
    }

    pub fn latest(&self) -> Option<PreviewSnapshot> {
        self.state.latest.lock().clone()
    }

    /// Advances the generation without scheduling an estimate and forgets the
    /// last one, for trees that cannot be estimated.
    pub fn invalidate(&self) -> u64 {
        let mut latest = self.state.latest.lock();
        let ticket = self.issue();
        *latest = None;
        ticket.generation
    }
}

/// An estimate running in the background.
#[derive(Debug)]
pub struct ScheduledPreview {
    pub ticket: PreviewTicket,
    handle: JoinHandle<bool>,
}

impl ScheduledPreview {
    /// Waits for the estimate; `true` when it was recorded as the latest.
    pub async fn wait(self) -> bool {
        match self.handle.await {
            Ok(recorded) => recorded,
            Err(err) => {
                warn!(error = %err, "audience preview task failed");
                false
            }
        }
    }
}

/// Recomputes audience estimates off the caller's path.
#[derive(Clone)]
pub struct LivePreview {
    estimator: Arc<dyn AudienceEstimator>,
    tracker: PreviewTracker,
}

impl std::fmt::Debug for LivePreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePreview")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl LivePreview {
    pub fn new(estimator: Arc<dyn AudienceEstimator>) -> Self {
        Self {
            estimator,
            tracker: PreviewTracker::new(),
        }
    }

    pub fn tracker(&self) -> &PreviewTracker {
        &self.tracker
    }

    /// Starts estimating `query` on the runtime. Must be called from within
    /// a Tokio runtime.
    pub fn schedule(&self, query: BackendQuery) -> ScheduledPreview {
        let ticket = self.tracker.issue();
        let estimator = Arc::clone(&self.estimator);
        let tracker = self.tracker.clone();
        let handle = tokio::spawn(async move {
            match estimator.estimate(&query).await {
                Ok(estimate) => tracker.record(ticket, estimate),
                Err(err) => {
                    warn!(generation = ticket.generation, error = %err, "audience estimate failed");
                    false
                }
            }
        });
        ScheduledPreview { ticket, handle }
    }

    pub fn latest(&self) -> Option<PreviewSnapshot> {
        self.tracker.latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryCondition, QueryField, QueryOperator};
    use std::time::Duration;

    /// Reports the condition count as the audience. Smaller queries are slower.
    struct SkewedEstimator;

    #[async_trait]
    impl AudienceEstimator for SkewedEstimator {
        async fn estimate(&self, query: &BackendQuery) -> Result<AudienceEstimate, RuleError> {
            let delay = if query.condition_count() <= 1 { 500 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(AudienceEstimate {
                audience_size: query.condition_count(),
                sample_user_ids: Vec::new(),
            })
        }
    }

    fn query_with(conditions: usize) -> BackendQuery {
        BackendQuery::single(
            (0..conditions)
                .map(|_| QueryCondition::new(QueryField::VisitCount, QueryOperator::GreaterThan, 1.0))
                .collect(),
        )
    }

    #[test]
    fn tracker_only_accepts_latest_ticket() {
        let tracker = PreviewTracker::new();
        let first = tracker.issue();
        let second = tracker.issue();
        assert!(!tracker.record(first, AudienceEstimate::default()));
        assert!(tracker.latest().is_none());
        assert!(tracker.record(second, AudienceEstimate::default()));
        assert_eq!(tracker.latest().unwrap().generation, 2);
    }

    #[test]
    fn invalidate_drops_the_snapshot_and_late_results() {
        let tracker = PreviewTracker::new();
        let ticket = tracker.issue();
        assert!(tracker.record(ticket, AudienceEstimate::default()));

        let late = tracker.issue();
        assert_eq!(tracker.invalidate(), 3);
        assert!(tracker.latest().is_none());
        assert!(!tracker.record(late, AudienceEstimate::default()));
        assert!(tracker.latest().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stale_estimate_never_overwrites_newer_one() {
        let preview = LivePreview::new(Arc::new(SkewedEstimator));

        let slow = preview.schedule(query_with(1));
        let fast = preview.schedule(query_with(2));

        assert!(fast.wait().await);
        assert!(!slow.wait().await);

        let latest = preview.latest().expect("estimate");
        assert_eq!(latest.generation, 2);
        assert_eq!(latest.estimate.audience_size, 2);
    }

    #[tokio::test]
    async fn in_memory_audience_uses_evaluator() {
        let audience = InMemoryAudience::new(Vec::new(), AudienceEvaluator::default());
        let estimate = audience.estimate(&query_with(1)).await.unwrap();
        assert_eq!(estimate.audience_size, 0);
    }
}
