use std::io;

use chrono::{DateTime, Utc};
use reach_rules::{AudienceEstimate, BackendQuery, RuleError, RuleGroup};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use uuid::Uuid;

pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("gateway returned {status}: {message}")]
    Gateway { status: u16, message: String },
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error("output failed: {0}")]
    Output(String),
    #[error("{0}")]
    Validation(String),
}

impl From<reqwest::Error> for CliError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(value: io::Error) -> Self {
        Self::Output(value.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Output(value.to_string())
    }
}

/// Thin client for the gateway's JSON API.
pub struct GatewayClient {
    base_url: Url,
    http: reqwest::Client,
    session_id: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Result<Self, CliError> {
        let url = Url::parse(base_url)
            .map_err(|err| CliError::Validation(format!("invalid gateway url: {err}")))?;
        Ok(Self {
            base_url: url,
            http: reqwest::Client::new(),
            session_id: None,
        })
    }

    /// Sent as `x-session-id` with synthesis requests.
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, CliError> {
        self.base_url
            .join(path)
            .map_err(|err| CliError::Validation(format!("invalid path: {err}")))
    }

    pub async fn preview(&self, query: &BackendQuery) -> Result<AudienceEstimate, CliError> {
        let url = self.endpoint("/api/segments/preview")?;
        let response = self
            .http
            .post(url)
            .json(&PreviewRequest { rules: query })
            .send()
            .await?;
        parse_response(response).await
    }

    pub async fn synthesize(&self, description: &str) -> Result<RuleGroup, CliError> {
        let url = self.endpoint("/api/ai/rules")?;
        let mut request = self.http.post(url).json(&SynthesizeRequest { description });
        if let Some(session) = &self.session_id {
            request = request.header("x-session-id", session);
        }
        parse_response(request.send().await?).await
    }

    pub async fn create_campaign(
        &self,
        request: &CreateCampaignRequest,
    ) -> Result<CreatedCampaign, CliError> {
        let url = self.endpoint("/api/campaigns")?;
        let response = self.http.post(url).json(request).send().await?;
        parse_response(response).await
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, CliError> {
        let url = self.endpoint("/api/dashboard/stats")?;
        let envelope: Envelope<DashboardStats> =
            parse_response(self.http.get(url).send().await?).await?;
        Ok(envelope.data)
    }

    pub async fn campaign_status(&self) -> Result<Vec<StatusCount>, CliError> {
        let url = self.endpoint("/api/dashboard/campaign-status")?;
        let envelope: Envelope<Vec<StatusCount>> =
            parse_response(self.http.get(url).send().await?).await?;
        Ok(envelope.data)
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CliError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| CliError::Http(err.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    debug!(%status, %body, "gateway request failed");
    let message = serde_json::from_str::<GatewayError>(&body)
        .map(|err| err.error)
        .unwrap_or(body);
    Err(CliError::Gateway {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct PreviewRequest<'a> {
    rules: &'a BackendQuery,
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    description: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub campaign_name: String,
    pub message: String,
    pub segment_name: Option<String>,
    pub segment_rules: BackendQuery,
}

#[derive(Debug, Deserialize)]
pub struct CreatedCampaign {
    pub segment: SegmentSummary,
    pub campaign: CampaignSummary,
}

#[derive(Debug, Deserialize)]
pub struct SegmentSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub audience_size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_customers: u64,
    pub total_campaigns: u64,
    pub total_sales: u64,
    pub total_segments: u64,
}

#[derive(Debug, Deserialize)]
pub struct StatusCount {
    pub name: String,
    pub value: u64,
}
