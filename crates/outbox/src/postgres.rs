use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, AggregateRecord, CorrelationId, OutboxError, OutboxEvent, OutboxId, OutboxQuery,
    OutboxStats, OutboxStatus, RequeueFilter, Result, Version,
    store::{AggregateChange, OutboxBatch, OutboxStore, OutboxStream, WriteStore, validate_change},
};

const OUTBOX_COLUMNS: &str = "id, seq, aggregate_id, aggregate_type, event_type, payload, \
     occurred_at, status, published_at, attempts, last_error, correlation_id";

/// PostgreSQL-backed aggregate and outbox store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<AggregateRecord> {
        Ok(AggregateRecord {
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            state: row.try_get("state")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OutboxStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(OutboxEvent {
            id: OutboxId::from_uuid(row.try_get::<Uuid, _>("id")?),
            sequence: row.try_get("seq")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            occurred_at: row.try_get("occurred_at")?,
            status,
            published_at: row.try_get("published_at")?,
            attempts: row.try_get("attempts")?,
            last_error: row.try_get("last_error")?,
            correlation_id: row
                .try_get::<Option<Uuid>, _>("correlation_id")?
                .map(CorrelationId::from_uuid),
        })
    }
}

#[async_trait]
impl WriteStore for PostgresStore {
    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, updated_at, state
            FROM aggregates
            WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn commit(&self, change: AggregateChange) -> Result<Version> {
        validate_change(&change)?;

        let aggregate_id = change.aggregate_id();
        let record = &change.record;

        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await?;

        if change.is_create() {
            sqlx::query(
                r#"
                INSERT INTO aggregates (aggregate_id, aggregate_type, version, updated_at, state)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(aggregate_id.as_uuid())
            .bind(&record.aggregate_type)
            .bind(record.version.as_i64())
            .bind(record.updated_at)
            .bind(&record.state)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return OutboxError::AggregateAlreadyExists(aggregate_id);
                }
                OutboxError::Database(e)
            })?;
        } else {
            let updated = sqlx::query(
                r#"
                UPDATE aggregates
                SET version = $1, updated_at = $2, state = $3
                WHERE aggregate_id = $4 AND version = $5
                "#,
            )
            .bind(record.version.as_i64())
            .bind(record.updated_at)
            .bind(&record.state)
            .bind(aggregate_id.as_uuid())
            .bind(change.expected_version.as_i64())
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let actual: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM aggregates WHERE aggregate_id = $1")
                        .bind(aggregate_id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await?;

                return Err(OutboxError::ConcurrencyConflict {
                    aggregate_id,
                    expected: change.expected_version,
                    actual: Version::new(actual.unwrap_or(0)),
                });
            }
        }

        for event in &change.events {
            sqlx::query(
                r#"
                INSERT INTO outbox_events
                    (id, aggregate_id, aggregate_type, event_type, payload, occurred_at,
                     status, attempts, correlation_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.id.as_uuid())
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.occurred_at)
            .bind(event.status.as_str())
            .bind(event.attempts)
            .bind(event.correlation_id.map(|c| c.as_uuid()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(record.version)
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn claim_pending(&self, limit: usize) -> Result<Box<dyn OutboxBatch>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            SELECT {OUTBOX_COLUMNS}
            FROM outbox_events o
            WHERE o.status = 'PENDING'
              AND NOT EXISTS (
                  SELECT 1 FROM outbox_events f
                  WHERE f.aggregate_id = o.aggregate_id AND f.status = 'FAILED'
              )
            ORDER BY o.occurred_at ASC, o.seq ASC
            LIMIT $1
            FOR UPDATE OF o SKIP LOCKED
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&mut *tx)
            .await?;
        let events = rows
            .into_iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;

        Ok(Box::new(PostgresBatch { tx, events }))
    }

    async fn requeue_failed(&self, filter: RequeueFilter) -> Result<u64> {
        let ids: Option<Vec<Uuid>> = filter
            .ids
            .map(|ids| ids.into_iter().map(|id| id.as_uuid()).collect());

        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'PENDING'
            WHERE status = 'FAILED'
              AND ($1::uuid[] IS NULL OR id = ANY($1))
              AND ($2::uuid IS NULL OR aggregate_id = $2)
            "#,
        )
        .bind(ids)
        .bind(filter.aggregate_id.map(|id| id.as_uuid()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn query(&self, query: OutboxQuery) -> Result<Vec<OutboxEvent>> {
        let mut sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox_events WHERE 1=1");
        let mut param_count = 0;

        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if query.aggregate_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_id = ${param_count}"));
        }
        if query.event_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ${param_count}"));
        }

        sql.push_str(" ORDER BY seq ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(id) = query.aggregate_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(event_type) = query.event_type {
            sqlx_query = sqlx_query.bind(event_type);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stats(&self) -> Result<OutboxStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM outbox_events GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = OutboxStats::default();
        for (status, count) in rows {
            let count = count as u64;
            match status.parse::<OutboxStatus>() {
                Ok(OutboxStatus::Pending) => stats.pending = count,
                Ok(OutboxStatus::Published) => stats.published = count,
                Ok(OutboxStatus::Failed) => stats.failed = count,
                Err(e) => return Err(sqlx::Error::Decode(Box::new(e)).into()),
            }
        }
        Ok(stats)
    }

    async fn stream_all(&self) -> Result<OutboxStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(
            r#"
            SELECT id, seq, aggregate_id, aggregate_type, event_type, payload,
                   occurred_at, status, published_at, attempts, last_error, correlation_id
            FROM outbox_events
            ORDER BY seq ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|result| match result {
            Ok(row) => Self::row_to_event(row),
            Err(e) => Err(OutboxError::Database(e)),
        });

        Ok(Box::pin(stream))
    }
}

/// Rows locked by `SELECT ... FOR UPDATE SKIP LOCKED` inside an open
/// transaction. Dropping the batch rolls the transaction back.
struct PostgresBatch {
    tx: Transaction<'static, Postgres>,
    events: Vec<OutboxEvent>,
}

#[async_trait]
impl OutboxBatch for PostgresBatch {
    fn events(&self) -> &[OutboxEvent] {
        &self.events
    }

    async fn mark_published(&mut self, id: OutboxId, published_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE outbox_events SET status = 'PUBLISHED', published_at = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(published_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn mark_failed(&mut self, id: OutboxId, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'FAILED', attempts = attempts + 1, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
