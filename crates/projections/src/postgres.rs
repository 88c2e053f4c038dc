//! PostgreSQL read model store.

use async_trait::async_trait;
use common::{AggregateId, EventEnvelope, Version};
use domain::{BrandId, CampaignEvent, Money};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::Result;
use crate::projection::{Projected, project};
use crate::store::ReadModelStore;
use crate::view::{CampaignFilter, CampaignView};

const VIEW_COLUMNS: &str = "id, brand_id, name, description, campaign_type, objective, status, \
     start_date, end_date, total_budget_cents, budget_spent_cents, sales_target, sales_actual, \
     engagement_target, engagement_actual, created_at, last_activity_at, last_applied_version";

/// PostgreSQL-backed campaign read model (`campaigns_read`).
///
/// The table is created by the shared migrations run through
/// `outbox::PostgresStore::run_migrations`.
#[derive(Clone)]
pub struct PostgresReadModel {
    pool: PgPool,
}

impl PostgresReadModel {
    /// Creates a new read model store on the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_view(row: PgRow) -> Result<CampaignView> {
        fn parse<T>(value: String) -> std::result::Result<T, sqlx::Error>
        where
            T: std::str::FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))
        }

        Ok(CampaignView {
            id: AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
            brand_id: BrandId::from_uuid(row.try_get::<Uuid, _>("brand_id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            campaign_type: parse(row.try_get("campaign_type")?)?,
            objective: parse(row.try_get("objective")?)?,
            status: parse(row.try_get("status")?)?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            total_budget: Money::from_cents(row.try_get("total_budget_cents")?),
            budget_spent: Money::from_cents(row.try_get("budget_spent_cents")?),
            sales_target: row.try_get("sales_target")?,
            sales_actual: row.try_get("sales_actual")?,
            engagement_target: row.try_get("engagement_target")?,
            engagement_actual: row.try_get("engagement_actual")?,
            created_at: row.try_get("created_at")?,
            last_activity_at: row.try_get("last_activity_at")?,
            last_applied_version: Version::new(row.try_get("last_applied_version")?),
        })
    }
}

#[async_trait]
impl ReadModelStore for PostgresReadModel {
    async fn apply(&self, envelope: &EventEnvelope, event: &CampaignEvent) -> Result<Projected> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query(&format!(
            "SELECT {VIEW_COLUMNS} FROM campaigns_read WHERE id = $1 FOR UPDATE"
        ))
        .bind(envelope.aggregate_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .map(Self::row_to_view)
        .transpose()?;

        let projected = project(current.as_ref(), envelope, event);
        let Projected::Upsert(view) = &projected else {
            tx.rollback().await?;
            return Ok(projected);
        };

        // The guard on the conflict branch keeps the version check atomic
        // when two instances race to insert the first row.
        let written = sqlx::query(&format!(
            r#"
            INSERT INTO campaigns_read ({VIEW_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                brand_id = EXCLUDED.brand_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                campaign_type = EXCLUDED.campaign_type,
                objective = EXCLUDED.objective,
                status = EXCLUDED.status,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                total_budget_cents = EXCLUDED.total_budget_cents,
                budget_spent_cents = EXCLUDED.budget_spent_cents,
                sales_target = EXCLUDED.sales_target,
                sales_actual = EXCLUDED.sales_actual,
                engagement_target = EXCLUDED.engagement_target,
                engagement_actual = EXCLUDED.engagement_actual,
                created_at = EXCLUDED.created_at,
                last_activity_at = EXCLUDED.last_activity_at,
                last_applied_version = EXCLUDED.last_applied_version
            WHERE campaigns_read.last_applied_version < EXCLUDED.last_applied_version
            "#
        ))
        .bind(view.id.as_uuid())
        .bind(view.brand_id.as_uuid())
        .bind(&view.name)
        .bind(&view.description)
        .bind(view.campaign_type.as_str())
        .bind(view.objective.as_str())
        .bind(view.status.as_str())
        .bind(view.start_date)
        .bind(view.end_date)
        .bind(view.total_budget.cents())
        .bind(view.budget_spent.cents())
        .bind(view.sales_target)
        .bind(view.sales_actual)
        .bind(view.engagement_target)
        .bind(view.engagement_actual)
        .bind(view.created_at)
        .bind(view.last_activity_at)
        .bind(view.last_applied_version.as_i64())
        .execute(&mut *tx)
        .await?;

        if written.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(Projected::Stale);
        }

        tx.commit().await?;
        Ok(projected)
    }

    async fn get(&self, id: AggregateId) -> Result<Option<CampaignView>> {
        sqlx::query(&format!(
            "SELECT {VIEW_COLUMNS} FROM campaigns_read WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_view)
        .transpose()
    }

    async fn list(&self, filter: &CampaignFilter) -> Result<Vec<CampaignView>> {
        let mut sql = format!("SELECT {VIEW_COLUMNS} FROM campaigns_read WHERE 1=1");
        let mut param_count = 0;
        let mut clause = |sql: &mut String, condition: &str| {
            param_count += 1;
            sql.push_str(&format!(" AND {condition} ${param_count}"));
        };

        if filter.brand_id.is_some() {
            clause(&mut sql, "brand_id =");
        }
        if filter.campaign_type.is_some() {
            clause(&mut sql, "campaign_type =");
        }
        if filter.status.is_some() {
            clause(&mut sql, "status =");
        }
        if filter.objective.is_some() {
            clause(&mut sql, "objective =");
        }
        if filter.starts_from.is_some() {
            clause(&mut sql, "start_date >=");
        }
        if filter.ends_until.is_some() {
            clause(&mut sql, "end_date <=");
        }
        if filter.min_budget.is_some() {
            clause(&mut sql, "total_budget_cents >=");
        }
        if filter.max_budget.is_some() {
            clause(&mut sql, "total_budget_cents <=");
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");

        let mut query = sqlx::query(&sql);
        if let Some(brand_id) = filter.brand_id {
            query = query.bind(brand_id.as_uuid());
        }
        if let Some(campaign_type) = filter.campaign_type {
            query = query.bind(campaign_type.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(objective) = filter.objective {
            query = query.bind(objective.as_str());
        }
        if let Some(starts_from) = filter.starts_from {
            query = query.bind(starts_from);
        }
        if let Some(ends_until) = filter.ends_until {
            query = query.bind(ends_until);
        }
        if let Some(min) = filter.min_budget {
            query = query.bind(min.cents());
        }
        if let Some(max) = filter.max_budget {
            query = query.bind(max.cents());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_view).collect()
    }
}
