use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use reach_core::errors::{ReachError, Result};
use reach_rules::{
    AudienceEstimate, AudienceEvaluator, BackendQuery, CustomerProfile, QueryCondition, QueryField,
    QueryOperator,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::CrmStore;
use crate::domain::{
    Campaign, CampaignStatus, CommunicationLog, DashboardStats, LogPage, LogStatus, NewCampaign,
    NewSegment, PageRequest, Segment, StatusCount,
};

#[derive(Default)]
struct Tables {
    customers: Vec<CustomerProfile>,
    segments: Vec<Segment>,
    campaigns: Vec<Campaign>,
    logs: Vec<CommunicationLog>,
}

/// Process-local store. Rows are kept in insertion order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    clock: Option<DateTime<Utc>>,
    reject_campaigns: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customers(customers: Vec<CustomerProfile>) -> Self {
        let store = Self::new();
        store.tables.write().customers = customers;
        store
    }

    /// Demo customers plus one completed campaign with its delivery log.
    pub fn demo() -> Self {
        let now = Utc::now();
        let store = Self::with_customers(demo_customers(now));
        store.seed_demo_campaign(now);
        info!(
            customers = store.tables.read().customers.len(),
            "seeded in-memory store with demo data"
        );
        store
    }

    /// Pins "now" for day-based audience conditions.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    /// Makes every subsequent campaign insert fail with a storage error.
    pub fn reject_campaign_writes(&self, reject: bool) {
        self.reject_campaigns.store(reject, Ordering::SeqCst);
    }

    fn seed_demo_campaign(&self, now: DateTime<Utc>) {
        let rules = BackendQuery::single(vec![QueryCondition::new(
            QueryField::InactiveDays,
            QueryOperator::GreaterThan,
            90.0,
        )]);
        let estimate = AudienceEvaluator::default()
            .at(now)
            .evaluate(&rules, &self.tables.read().customers);

        let segment = Segment {
            id: Uuid::new_v4(),
            name: "Lapsed customers".to_string(),
            rules,
            audience_user_ids: estimate.sample_user_ids.clone(),
            created_at: now - Duration::days(3),
        };
        let mut campaign = Campaign {
            id: Uuid::new_v4(),
            name: "We miss you".to_string(),
            message_template: "Hi {name}, we miss you! Here is 15% off your next order.".to_string(),
            status: CampaignStatus::Completed,
            audience_size: estimate.audience_size as u64,
            sent_count: 0,
            failed_count: 0,
            segment_id: segment.id,
            created_at: now - Duration::days(3),
        };

        let mut tables = self.tables.write();
        let mut logs = Vec::new();
        for (index, customer_id) in estimate.sample_user_ids.iter().enumerate() {
            let Some(customer) = tables.customers.iter().find(|c| &c.id == customer_id) else {
                continue;
            };
            let status = if index % 4 == 3 {
                campaign.failed_count += 1;
                LogStatus::Failed
            } else {
                campaign.sent_count += 1;
                LogStatus::Sent
            };
            logs.push(CommunicationLog {
                id: Uuid::new_v4(),
                campaign_id: campaign.id,
                campaign_name: campaign.name.clone(),
                customer_id: customer.id.clone(),
                customer_email: customer.email.clone(),
                status,
                message: campaign.message_template.replace("{name}", &customer.name),
                created_at: now - Duration::days(2) + Duration::minutes(index as i64),
            });
        }
        tables.segments.push(segment);
        tables.campaigns.push(campaign);
        tables.logs.extend(logs);
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn estimate_audience(
        &self,
        query: &BackendQuery,
        sample_limit: usize,
    ) -> Result<AudienceEstimate> {
        let mut evaluator = AudienceEvaluator::new(sample_limit);
        if let Some(now) = self.clock {
            evaluator = evaluator.at(now);
        }
        let tables = self.tables.read();
        Ok(evaluator.evaluate(query, &tables.customers))
    }

    async fn create_segment(&self, segment: NewSegment) -> Result<Segment> {
        let segment = Segment {
            id: Uuid::new_v4(),
            name: segment.name,
            rules: segment.rules,
            audience_user_ids: segment.audience_user_ids,
            created_at: Utc::now(),
        };
        self.tables.write().segments.push(segment.clone());
        debug!(segment_id = %segment.id, "segment stored");
        Ok(segment)
    }

    async fn list_segments(&self) -> Result<Vec<Segment>> {
        Ok(self.tables.read().segments.iter().rev().cloned().collect())
    }

    async fn find_segment(&self, id: Uuid) -> Result<Option<Segment>> {
        Ok(self
            .tables
            .read()
            .segments
            .iter()
            .find(|segment| segment.id == id)
            .cloned())
    }

    async fn create_campaign(&self, campaign: NewCampaign) -> Result<Campaign> {
        if self.reject_campaigns.load(Ordering::SeqCst) {
            return Err(ReachError::storage("campaign writes are disabled"));
        }

        let mut tables = self.tables.write();
        if !tables.segments.iter().any(|s| s.id == campaign.segment_id) {
            return Err(ReachError::validation(format!(
                "segment {} does not exist",
                campaign.segment_id
            )));
        }

        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: campaign.name,
            message_template: campaign.message_template,
            status: CampaignStatus::Processing,
            audience_size: campaign.audience_size,
            sent_count: 0,
            failed_count: 0,
            segment_id: campaign.segment_id,
            created_at: Utc::now(),
        };
        tables.campaigns.push(campaign.clone());
        Ok(campaign)
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        Ok(self.tables.read().campaigns.iter().rev().cloned().collect())
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let tables = self.tables.read();
        Ok(DashboardStats {
            total_customers: tables.customers.len() as u64,
            total_campaigns: tables.campaigns.len() as u64,
            total_sales: tables
                .customers
                .iter()
                .map(|customer| customer.order_count.max(0) as u64)
                .sum(),
            total_segments: tables.segments.len() as u64,
        })
    }

    async fn campaign_status_counts(&self) -> Result<Vec<StatusCount>> {
        let tables = self.tables.read();
        Ok(CampaignStatus::ALL
            .into_iter()
            .filter_map(|status| {
                let value = tables
                    .campaigns
                    .iter()
                    .filter(|campaign| campaign.status == status)
                    .count() as u64;
                (value > 0).then_some(StatusCount {
                    name: status,
                    value,
                })
            })
            .collect())
    }

    async fn list_logs(&self, page: PageRequest) -> Result<LogPage> {
        let tables = self.tables.read();
        let mut logs: Vec<_> = tables.logs.iter().collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = logs.len() as u64;
        let logs = logs
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .cloned()
            .collect();
        Ok(LogPage { logs, total })
    }
}

/// A small, varied customer base for local runs.
pub fn demo_customers(now: DateTime<Utc>) -> Vec<CustomerProfile> {
    // (name, spend, visits, orders, days since last order, days since sign-up)
    let rows: [(&str, f64, i64, i64, Option<i64>, i64); 12] = [
        ("Ada Lovelace", 7200.0, 42, 18, Some(12), 900),
        ("Grace Hopper", 5400.0, 2, 9, Some(200), 720),
        ("Alan Turing", 150.0, 1, 1, Some(400), 410),
        ("Katherine Johnson", 980.0, 15, 7, Some(30), 365),
        ("Edsger Dijkstra", 0.0, 3, 0, None, 45),
        ("Barbara Liskov", 12500.0, 60, 31, Some(5), 1200),
        ("Donald Knuth", 6100.0, 8, 12, Some(190), 1500),
        ("Frances Allen", 320.0, 2, 2, Some(95), 300),
        ("John Backus", 2300.0, 11, 6, Some(61), 640),
        ("Radia Perlman", 4999.0, 25, 10, Some(181), 800),
        ("Ken Thompson", 75.0, 1, 1, Some(720), 730),
        ("Margaret Hamilton", 8800.0, 33, 20, Some(2), 1000),
    ];

    rows.iter()
        .enumerate()
        .map(|(index, (name, spend, visits, orders, last_order, joined))| {
            let email = format!("{}@example.com", name.to_ascii_lowercase().replace(' ', "."));
            CustomerProfile {
                id: format!("cust-{:03}", index + 1),
                name: (*name).to_string(),
                email,
                total_spend: *spend,
                visit_count: *visits,
                order_count: *orders,
                avg_order_value: if *orders > 0 { spend / *orders as f64 } else { 0.0 },
                last_order_at: last_order.map(|days| now - Duration::days(days)),
                created_at: now - Duration::days(*joined),
            }
        })
        .collect()
}
