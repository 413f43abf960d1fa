use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reach_core::db::{run_migrations, DatabaseMigrator, DatabasePool};
use reach_core::errors::{ReachError, Result};
use reach_rules::{
    AudienceEstimate, BackendQuery, QueryCondition, QueryField, QueryGroup, QueryOperator,
};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use super::CrmStore;
use crate::domain::{
    Campaign, CampaignStatus, CommunicationLog, DashboardStats, LogPage, LogStatus, NewCampaign,
    NewSegment, PageRequest, Segment, StatusCount,
};

const INACTIVE_DAYS_SQL: &str =
    "GREATEST(FLOOR(EXTRACT(EPOCH FROM (NOW() - COALESCE(last_order_at, created_at))) / 86400), 0)";

struct CrmMigrations;

#[async_trait]
impl DatabaseMigrator for CrmMigrations {
    async fn run_migrations(&self, pool: &DatabasePool) -> Result<()> {
        sqlx::migrate!("./migrations").run(pool.inner()).await?;
        Ok(())
    }
}

/// Store backed by the CRM tables in Postgres.
#[derive(Clone)]
pub struct PostgresStore {
    pool: DatabasePool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = DatabasePool::connect_with_url(database_url).await?;
        Self::from_pool(pool).await
    }

    /// Runs the embedded migrations before handing out the store.
    pub async fn from_pool(pool: DatabasePool) -> Result<Self> {
        let migrators: Vec<Box<dyn DatabaseMigrator + Send + Sync>> = vec![Box::new(CrmMigrations)];
        run_migrations(&pool, &migrators).await?;
        info!("crm migrations applied");
        Ok(Self { pool })
    }
}

/// Appends the SQL predicate equivalent to `query` over the `customers` table.
///
/// Mirrors the in-memory evaluator: groups are OR'd, conditions inside a
/// group are AND'd, no groups matches nobody, an empty group matches
/// everybody, and operands that cannot be read as the operator requires make
/// the condition false.
pub fn compile_audience_filter(builder: &mut QueryBuilder<'_, Postgres>, query: &BackendQuery) {
    if query.groups.is_empty() {
        builder.push("FALSE");
        return;
    }
    builder.push("(");
    for (index, group) in query.groups.iter().enumerate() {
        if index > 0 {
            builder.push(" OR ");
        }
        push_group(builder, group);
    }
    builder.push(")");
}

fn push_group(builder: &mut QueryBuilder<'_, Postgres>, group: &QueryGroup) {
    if group.conditions.is_empty() {
        builder.push("TRUE");
        return;
    }
    builder.push("(");
    for (index, condition) in group.conditions.iter().enumerate() {
        if index > 0 {
            builder.push(" AND ");
        }
        push_condition(builder, condition);
    }
    builder.push(")");
}

fn push_condition(builder: &mut QueryBuilder<'_, Postgres>, condition: &QueryCondition) {
    let field = condition.field;
    match condition.operator {
        QueryOperator::OlderThanDays | QueryOperator::NewerThanDays => {
            let (Some(column), Some(days)) = (date_column(field), condition.value.as_number())
            else {
                builder.push("FALSE");
                return;
            };
            let comparison = if condition.operator == QueryOperator::OlderThanDays {
                " > "
            } else {
                " < "
            };
            builder.push(format!(
                "(FLOOR(EXTRACT(EPOCH FROM (NOW() - {column})) / 86400){comparison}"
            ));
            builder.push_bind(days);
            builder.push(")");
        }
        QueryOperator::OnDate | QueryOperator::BeforeDate | QueryOperator::AfterDate => {
            let (Some(column), Some(day)) = (date_column(field), condition.value.as_date()) else {
                builder.push("FALSE");
                return;
            };
            let comparison = match condition.operator {
                QueryOperator::OnDate => " = ",
                QueryOperator::BeforeDate => " < ",
                _ => " > ",
            };
            builder.push(format!("(({column} AT TIME ZONE 'UTC')::date{comparison}"));
            builder.push_bind(day);
            builder.push(")");
        }
        comparison => {
            let symbol = comparison_symbol(comparison);
            if let Some(column) = date_column(field) {
                let Some(day) = condition.value.as_date() else {
                    builder.push("FALSE");
                    return;
                };
                builder.push(format!("(({column} AT TIME ZONE 'UTC')::date {symbol} "));
                builder.push_bind(day);
                builder.push(")");
            } else {
                let Some(number) = condition.value.as_number() else {
                    builder.push("FALSE");
                    return;
                };
                builder.push(format!("({} {symbol} ", numeric_expression(field)));
                builder.push_bind(number);
                builder.push(")");
            }
        }
    }
}

fn numeric_expression(field: QueryField) -> &'static str {
    match field {
        QueryField::TotalSpend => "total_spend",
        QueryField::VisitCount => "visit_count",
        QueryField::InactiveDays => INACTIVE_DAYS_SQL,
        QueryField::OrderCount => "order_count",
        QueryField::AvgOrderValue => "avg_order_value",
        QueryField::LastOrderDate => "last_order_at",
        QueryField::UserCreatedAt => "created_at",
    }
}

fn date_column(field: QueryField) -> Option<&'static str> {
    match field {
        QueryField::LastOrderDate => Some("last_order_at"),
        QueryField::UserCreatedAt => Some("created_at"),
        _ => None,
    }
}

fn comparison_symbol(operator: QueryOperator) -> &'static str {
    match operator {
        QueryOperator::GreaterThan => ">",
        QueryOperator::GreaterThanOrEqual => ">=",
        QueryOperator::LessThan => "<",
        QueryOperator::LessThanOrEqual => "<=",
        QueryOperator::Equals => "=",
        _ => "<>",
    }
}

#[async_trait]
impl CrmStore for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn estimate_audience(
        &self,
        query: &BackendQuery,
        sample_limit: usize,
    ) -> Result<AudienceEstimate> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM customers WHERE ");
        compile_audience_filter(&mut count, query);
        let (audience_size,): (i64,) = count.build_query_as().fetch_one(self.pool.inner()).await?;

        let mut sample = QueryBuilder::new("SELECT id FROM customers WHERE ");
        compile_audience_filter(&mut sample, query);
        sample.push(" ORDER BY id LIMIT ");
        sample.push_bind(sample_limit as i64);
        let ids: Vec<(String,)> = sample.build_query_as().fetch_all(self.pool.inner()).await?;

        debug!(audience = audience_size, "audience counted in postgres");
        Ok(AudienceEstimate {
            audience_size: audience_size.max(0) as usize,
            sample_user_ids: ids.into_iter().map(|(id,)| id).collect(),
        })
    }

    async fn create_segment(&self, segment: NewSegment) -> Result<Segment> {
        let row = sqlx::query_as::<_, SegmentRow>(
            r#"
            INSERT INTO segments (id, name, rules, audience_user_ids, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, name, rules, audience_user_ids, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&segment.name)
        .bind(Json(&segment.rules))
        .bind(&segment.audience_user_ids)
        .fetch_one(self.pool.inner())
        .await?;

        Ok(row.into())
    }

    async fn list_segments(&self) -> Result<Vec<Segment>> {
        let rows = sqlx::query_as::<_, SegmentRow>(
            "SELECT id, name, rules, audience_user_ids, created_at FROM segments \
             ORDER BY created_at DESC",
        )
        .fetch_all(self.pool.inner())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_segment(&self, id: Uuid) -> Result<Option<Segment>> {
        let row = sqlx::query_as::<_, SegmentRow>(
            "SELECT id, name, rules, audience_user_ids, created_at FROM segments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.inner())
        .await?;
        Ok(row.map(Into::into))
    }

    async fn create_campaign(&self, campaign: NewCampaign) -> Result<Campaign> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            INSERT INTO campaigns (
                id, name, message_template, status, audience_size,
                sent_count, failed_count, segment_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, 0, 0, $6, NOW())
            RETURNING
                id, name, message_template, status, audience_size,
                sent_count, failed_count, segment_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&campaign.name)
        .bind(&campaign.message_template)
        .bind(CampaignStatus::Processing.as_str())
        .bind(campaign.audience_size as i64)
        .bind(campaign.segment_id)
        .fetch_one(self.pool.inner())
        .await?;

        row.try_into()
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            "SELECT id, name, message_template, status, audience_size, sent_count, \
             failed_count, segment_id, created_at FROM campaigns ORDER BY created_at DESC",
        )
        .fetch_all(self.pool.inner())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let (customers, campaigns, sales, segments): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM customers),
                (SELECT COUNT(*) FROM campaigns),
                (SELECT COALESCE(SUM(order_count), 0)::BIGINT FROM customers),
                (SELECT COUNT(*) FROM segments)
            "#,
        )
        .fetch_one(self.pool.inner())
        .await?;

        Ok(DashboardStats {
            total_customers: non_negative(customers),
            total_campaigns: non_negative(campaigns),
            total_sales: non_negative(sales),
            total_segments: non_negative(segments),
        })
    }

    async fn campaign_status_counts(&self) -> Result<Vec<StatusCount>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM campaigns GROUP BY status")
                .fetch_all(self.pool.inner())
                .await?;

        let mut counts = rows
            .into_iter()
            .map(|(status, value)| -> Result<StatusCount> {
                Ok(StatusCount {
                    name: status.parse()?,
                    value: non_negative(value),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        counts.sort_by_key(|count| count.name);
        Ok(counts)
    }

    async fn list_logs(&self, page: PageRequest) -> Result<LogPage> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM communication_logs")
            .fetch_one(self.pool.inner())
            .await?;

        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT
                l.id, l.campaign_id, c.name AS campaign_name, l.customer_id,
                cu.email AS customer_email, l.status, l.message, l.created_at
            FROM communication_logs l
            JOIN campaigns c ON c.id = l.campaign_id
            JOIN customers cu ON cu.id = l.customer_id
            ORDER BY l.created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(page.page_size))
        .bind(page.offset() as i64)
        .fetch_all(self.pool.inner())
        .await?;

        Ok(LogPage {
            logs: rows.into_iter().map(TryInto::try_into).collect::<Result<_>>()?,
            total: non_negative(total),
        })
    }
}

fn non_negative(value: i64) -> u64 {
    value.max(0) as u64
}

#[derive(FromRow)]
struct SegmentRow {
    id: Uuid,
    name: String,
    rules: Json<BackendQuery>,
    audience_user_ids: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<SegmentRow> for Segment {
    fn from(row: SegmentRow) -> Self {
        Segment {
            id: row.id,
            name: row.name,
            rules: row.rules.0,
            audience_user_ids: row.audience_user_ids,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct CampaignRow {
    id: Uuid,
    name: String,
    message_template: String,
    status: String,
    audience_size: i64,
    sent_count: i64,
    failed_count: i64,
    segment_id: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = ReachError;

    fn try_from(row: CampaignRow) -> Result<Self> {
        Ok(Campaign {
            id: row.id,
            name: row.name,
            message_template: row.message_template,
            status: row.status.parse()?,
            audience_size: non_negative(row.audience_size),
            sent_count: non_negative(row.sent_count),
            failed_count: non_negative(row.failed_count),
            segment_id: row.segment_id,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct LogRow {
    id: Uuid,
    campaign_id: Uuid,
    campaign_name: String,
    customer_id: String,
    customer_email: String,
    status: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for CommunicationLog {
    type Error = ReachError;

    fn try_from(row: LogRow) -> Result<Self> {
        Ok(CommunicationLog {
            id: row.id,
            campaign_id: row.campaign_id,
            campaign_name: row.campaign_name,
            customer_id: row.customer_id,
            customer_email: row.customer_email,
            status: row.status.parse::<LogStatus>()?,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reach_rules::QueryValue;

    fn compiled(query: &BackendQuery) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("");
        compile_audience_filter(&mut builder, query);
        builder.sql().to_string()
    }

    fn condition(field: QueryField, operator: QueryOperator, value: QueryValue) -> QueryCondition {
        QueryCondition {
            field,
            operator,
            value,
        }
    }

    #[test]
    fn groups_are_ored_and_conditions_anded() {
        let query = BackendQuery {
            groups: vec![
                QueryGroup {
                    conditions: vec![
                        condition(QueryField::TotalSpend, QueryOperator::GreaterThan, QueryValue::Number(100.0)),
                        condition(QueryField::VisitCount, QueryOperator::LessThan, QueryValue::Number(3.0)),
                    ],
                },
                QueryGroup {
                    conditions: vec![condition(
                        QueryField::OrderCount,
                        QueryOperator::NotEquals,
                        QueryValue::Number(0.0),
                    )],
                },
            ],
        };
        assert_eq!(
            compiled(&query),
            "(((total_spend > $1) AND (visit_count < $2)) OR ((order_count <> $3)))"
        );
    }

    #[test]
    fn empty_query_and_empty_group() {
        assert_eq!(compiled(&BackendQuery::default()), "FALSE");
        assert_eq!(compiled(&BackendQuery::single(Vec::new())), "(TRUE)");
    }

    #[test]
    fn unreadable_operands_compile_to_false() {
        let query = BackendQuery::single(vec![
            condition(QueryField::LastOrderDate, QueryOperator::BeforeDate, "soon".into()),
            condition(QueryField::TotalSpend, QueryOperator::OlderThanDays, QueryValue::Number(30.0)),
            condition(QueryField::VisitCount, QueryOperator::Equals, "many".into()),
        ]);
        assert_eq!(compiled(&query), "((FALSE AND FALSE AND FALSE))");
    }

    #[test]
    fn date_fields_compare_calendar_days() {
        let query = BackendQuery::single(vec![
            condition(QueryField::UserCreatedAt, QueryOperator::AfterDate, "2024-01-01".into()),
            condition(QueryField::LastOrderDate, QueryOperator::OlderThanDays, QueryValue::Number(90.0)),
        ]);
        let sql = compiled(&query);
        assert!(sql.contains("((created_at AT TIME ZONE 'UTC')::date > $1)"));
        assert!(sql.contains("(FLOOR(EXTRACT(EPOCH FROM (NOW() - last_order_at)) / 86400) > $2)"));
    }

    #[test]
    fn inactive_days_falls_back_to_sign_up() {
        let query = BackendQuery::single(vec![condition(
            QueryField::InactiveDays,
            QueryOperator::GreaterThanOrEqual,
            QueryValue::Number(180.0),
        )]);
        assert!(compiled(&query).contains("COALESCE(last_order_at, created_at)"));
    }
}
