use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use reach_core::errors::ReachError;
use reach_rules::BackendQuery;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_NAME_CHARS: usize = 3;
pub const MIN_MESSAGE_CHARS: usize = 10;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A named audience definition. Never edited after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    pub rules: BackendQuery,
    pub audience_user_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Processing,
    Sending,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub const ALL: [CampaignStatus; 5] = [
        CampaignStatus::Draft,
        CampaignStatus::Processing,
        CampaignStatus::Sending,
        CampaignStatus::Completed,
        CampaignStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "DRAFT",
            CampaignStatus::Processing => "PROCESSING",
            CampaignStatus::Sending => "SENDING",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = ReachError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| ReachError::Deserialization(format!("unknown campaign status `{value}`")))
    }
}

/// A message send bound to one segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub message_template: String,
    pub status: CampaignStatus,
    pub audience_size: u64,
    pub sent_count: u64,
    pub failed_count: u64,
    pub segment_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    Sent,
    Failed,
    Pending,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Sent => "SENT",
            LogStatus::Failed => "FAILED",
            LogStatus::Pending => "PENDING",
        }
    }
}

impl FromStr for LogStatus {
    type Err = ReachError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SENT" => Ok(LogStatus::Sent),
            "FAILED" => Ok(LogStatus::Failed),
            "PENDING" => Ok(LogStatus::Pending),
            other => Err(ReachError::Deserialization(format!("unknown log status `{other}`"))),
        }
    }
}

/// One delivery attempt, joined with its campaign name and customer email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationLog {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub customer_id: String,
    pub customer_email: String,
    pub status: LogStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_customers: u64,
    pub total_campaigns: u64,
    pub total_sales: u64,
    pub total_segments: u64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StatusCount {
    pub name: CampaignStatus,
    pub value: u64,
}

/// Page window for the communication log listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl PageRequest {
    /// Pages start at 1; the size is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.page_size))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogPage {
    pub logs: Vec<CommunicationLog>,
    pub total: u64,
}

/// Input for [`crate::store::CrmStore::create_segment`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewSegment {
    pub name: String,
    pub rules: BackendQuery,
    pub audience_user_ids: Vec<String>,
}

impl NewSegment {
    pub fn validated(name: &str, rules: BackendQuery) -> Result<Self, ReachError> {
        Ok(Self {
            name: Self::validate_name(name)?,
            rules,
            audience_user_ids: Vec::new(),
        })
    }

    pub fn validate_name(name: &str) -> Result<String, ReachError> {
        require_min_chars(
            name,
            MIN_NAME_CHARS,
            "Segment name is required and must be at least 3 characters long",
        )
    }
}

/// Input for [`crate::store::CrmStore::create_campaign`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaign {
    pub name: String,
    pub message_template: String,
    pub audience_size: u64,
    pub segment_id: Uuid,
}

/// A validated request to create a segment and a campaign targeting it.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignDraft {
    pub campaign_name: String,
    pub message: String,
    pub segment_name: String,
    pub rules: BackendQuery,
}

impl CampaignDraft {
    pub fn validated(
        campaign_name: &str,
        message: &str,
        segment_name: Option<&str>,
        rules: BackendQuery,
    ) -> Result<Self, ReachError> {
        let campaign_name = require_min_chars(
            campaign_name,
            MIN_NAME_CHARS,
            "Campaign name must be at least 3 characters long",
        )?;
        let message = require_min_chars(
            message,
            MIN_MESSAGE_CHARS,
            "Message must be at least 10 characters long",
        )?;
        if rules.groups.is_empty() || rules.condition_count() == 0 {
            return Err(ReachError::validation(
                "Segment rules must contain at least one condition",
            ));
        }

        let segment_name = match segment_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("{campaign_name} audience"),
        };

        Ok(Self {
            campaign_name,
            message,
            segment_name,
            rules,
        })
    }
}

fn require_min_chars(value: &str, min: usize, message: &str) -> Result<String, ReachError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < min {
        return Err(ReachError::validation(message));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reach_rules::{QueryCondition, QueryField, QueryOperator};

    fn rules() -> BackendQuery {
        BackendQuery::single(vec![QueryCondition::new(
            QueryField::TotalSpend,
            QueryOperator::GreaterThan,
            1000.0,
        )])
    }

    #[test]
    fn campaign_name_needs_three_characters() {
        let err = CampaignDraft::validated("ab", "Hello {name}, see you!", None, rules()).unwrap_err();
        assert!(err.to_string().contains("at least 3 characters"));

        let draft = CampaignDraft::validated("abc", "Hello {name}, see you!", None, rules()).unwrap();
        assert_eq!(draft.segment_name, "abc audience");
    }

    #[test]
    fn message_needs_ten_characters() {
        let err = CampaignDraft::validated("Spring", "Hi {name}", None, rules()).unwrap_err();
        assert!(err.to_string().contains("at least 10 characters"));
    }

    #[test]
    fn rules_need_a_condition() {
        let err = CampaignDraft::validated("Spring", "Hello {name}, see you!", None, BackendQuery::default())
            .unwrap_err();
        assert!(matches!(err, ReachError::Validation(_)));

        let empty_group = BackendQuery::single(Vec::new());
        assert!(CampaignDraft::validated("Spring", "Hello {name}, see you!", None, empty_group).is_err());
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(PageRequest::new(Some(0), Some(0)), PageRequest { page: 1, page_size: 1 });
        assert_eq!(PageRequest::new(None, Some(500)).page_size, MAX_PAGE_SIZE);
        let page = PageRequest::new(Some(3), Some(20));
        assert_eq!(page.offset(), 40);
        assert_eq!(page.total_pages(41), 3);
        assert_eq!(page.total_pages(0), 0);
    }

    #[test]
    fn statuses_use_upper_case_names() {
        assert_eq!(
            serde_json::to_value(CampaignStatus::Processing).unwrap(),
            serde_json::json!("PROCESSING")
        );
        assert_eq!("COMPLETED".parse::<CampaignStatus>().unwrap(), CampaignStatus::Completed);
        assert!("done".parse::<CampaignStatus>().is_err());
    }
}
