//! Persistence for customers, segments, campaigns and delivery logs.
//!
//! Handlers only talk to [`CrmStore`]. [`MemoryStore`] backs local runs and
//! tests; [`PostgresStore`] is used whenever `DATABASE_URL` is configured.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use reach_core::errors::Result;
use reach_rules::{AudienceEstimate, AudienceEstimator, BackendQuery, RuleError};
use uuid::Uuid;

use crate::domain::{
    Campaign, DashboardStats, LogPage, NewCampaign, NewSegment, PageRequest, Segment, StatusCount,
};

pub use memory::{demo_customers, MemoryStore};
pub use postgres::{compile_audience_filter, PostgresStore};

#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Short name of the backing implementation, reported by `/health`.
    fn backend(&self) -> &'static str;

    async fn estimate_audience(
        &self,
        query: &BackendQuery,
        sample_limit: usize,
    ) -> Result<AudienceEstimate>;

    async fn create_segment(&self, segment: NewSegment) -> Result<Segment>;

    /// Newest first.
    async fn list_segments(&self) -> Result<Vec<Segment>>;

    async fn find_segment(&self, id: Uuid) -> Result<Option<Segment>>;

    async fn create_campaign(&self, campaign: NewCampaign) -> Result<Campaign>;

    /// Newest first.
    async fn list_campaigns(&self) -> Result<Vec<Campaign>>;

    async fn dashboard_stats(&self) -> Result<DashboardStats>;

    /// Campaign counts per status, only for statuses in use.
    async fn campaign_status_counts(&self) -> Result<Vec<StatusCount>>;

    /// Newest first.
    async fn list_logs(&self, page: PageRequest) -> Result<LogPage>;
}

/// Feeds builder previews from a store.
#[derive(Clone)]
pub struct StoreAudience {
    store: Arc<dyn CrmStore>,
    sample_limit: usize,
}

impl StoreAudience {
    pub fn new(store: Arc<dyn CrmStore>, sample_limit: usize) -> Self {
        Self {
            store,
            sample_limit,
        }
    }
}

#[async_trait]
impl AudienceEstimator for StoreAudience {
    async fn estimate(&self, query: &BackendQuery) -> std::result::Result<AudienceEstimate, RuleError> {
        self.store
            .estimate_audience(query, self.sample_limit)
            .await
            .map_err(|err| RuleError::Estimator(err.to_string()))
    }
}
