//! PostgreSQL storage adapter
//!
//! Raw-query adapter over a shared pool. Multi-record mutations (merge
//! execution, rollback) run inside a single transaction so a failure leaves
//! every row untouched. Symbol updates carry an optimistic version guard.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{
    GovernanceBlock, MergeRecord, MergeStatus, SymbolRegistration, SymbolStatus, Topic,
};
use crate::error::{RegistryError, Result};
use crate::store::{MergeStore, SymbolStore, TopicStore};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool (zero-cost reuse)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn topic_from_row(row: &PgRow) -> Result<Topic> {
        let canonical: Option<serde_json::Value> = row.get("canonical_data");
        Ok(Topic {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
            category: row.get("category"),
            region: row.get("region"),
            canonical_data: canonical.map(serde_json::from_value).transpose()?,
            verified: row.get("verified"),
            active: row.get("active"),
            merged_into: row.get("merged_into"),
            deleted_at: row.get("deleted_at"),
            created_at: row.get("created_at"),
            ingest_count: row.get("ingest_count"),
            market_count: row.get("market_count"),
            snapshot_count: row.get("snapshot_count"),
        })
    }

    fn merge_from_row(row: &PgRow) -> Result<MergeRecord> {
        let status: String = row.get("status");
        let scores: serde_json::Value = row.get("scores");
        Ok(MergeRecord {
            id: row.get("id"),
            primary_id: row.get("primary_id"),
            duplicate_ids: row.get("duplicate_ids"),
            scores: serde_json::from_value(scores)?,
            confidence: row.get("confidence"),
            reason: row.get("reason"),
            executed_by: row.get("executed_by"),
            status: MergeStatus::try_from(status.as_str())
                .map_err(RegistryError::Internal)?,
            rollback_reason: row.get("rollback_reason"),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
            rolled_back_at: row.get("rolled_back_at"),
        })
    }

    fn symbol_from_row(row: &PgRow) -> Result<SymbolRegistration> {
        let status: String = row.get("status");
        let ownership: serde_json::Value = row.get("ownership");
        let governance: serde_json::Value = row.get("governance");
        let audit_log: serde_json::Value = row.get("audit_log");
        let mut lifecycle: crate::domain::LifecycleBlock =
            serde_json::from_value(row.get::<serde_json::Value, _>("lifecycle"))?;
        // the relational version column is authoritative
        lifecycle.version = row.get("version");
        Ok(SymbolRegistration {
            id: row.get("id"),
            topic_id: row.get("topic_id"),
            symbol: row.get("symbol"),
            alias: row.get("alias"),
            status: SymbolStatus::try_from(status.as_str())
                .map_err(RegistryError::Internal)?,
            ownership: serde_json::from_value(ownership)?,
            lifecycle,
            governance: serde_json::from_value::<GovernanceBlock>(governance)?,
            audit_log: serde_json::from_value(audit_log)?,
        })
    }

    async fn update_topic_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        topic: &Topic,
    ) -> Result<()> {
        let canonical = topic
            .canonical_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE topics SET
                name = $2, slug = $3, category = $4, region = $5,
                canonical_data = $6, verified = $7, active = $8,
                merged_into = $9, deleted_at = $10,
                ingest_count = $11, market_count = $12, snapshot_count = $13
            WHERE id = $1
            "#,
        )
        .bind(topic.id)
        .bind(&topic.name)
        .bind(&topic.slug)
        .bind(&topic.category)
        .bind(&topic.region)
        .bind(canonical)
        .bind(topic.verified)
        .bind(topic.active)
        .bind(topic.merged_into)
        .bind(topic.deleted_at)
        .bind(topic.ingest_count)
        .bind(topic.market_count)
        .bind(topic.snapshot_count)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!("topic {}", topic.id)));
        }
        Ok(())
    }

    async fn update_symbol_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        registration: &SymbolRegistration,
    ) -> Result<()> {
        let mut lifecycle = registration.lifecycle.clone();
        lifecycle.version += 1;
        let result = sqlx::query(
            r#"
            UPDATE symbol_registrations SET
                alias = $2, status = $3, ownership = $4, lifecycle = $5,
                governance = $6, audit_log = $7, expiration_date = $8,
                version = version + 1
            WHERE id = $1 AND version = $9
            "#,
        )
        .bind(registration.id)
        .bind(&registration.alias)
        .bind(registration.status.as_str())
        .bind(serde_json::to_value(&registration.ownership)?)
        .bind(serde_json::to_value(&lifecycle)?)
        .bind(serde_json::to_value(&registration.governance)?)
        .bind(serde_json::to_value(&registration.audit_log)?)
        .bind(registration.lifecycle.expiration_date)
        .bind(registration.lifecycle.version)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::TransientStore(format!(
                "version conflict or missing row for {}",
                registration.symbol
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TopicStore for PostgresStore {
    #[instrument(skip(self, topic), fields(topic_id = %topic.id))]
    async fn create_topic(&self, topic: &Topic) -> Result<()> {
        let canonical = topic
            .canonical_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO topics (
                id, name, slug, category, region, canonical_data, verified,
                active, merged_into, deleted_at, created_at,
                ingest_count, market_count, snapshot_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(topic.id)
        .bind(&topic.name)
        .bind(&topic.slug)
        .bind(&topic.category)
        .bind(&topic.region)
        .bind(canonical)
        .bind(topic.verified)
        .bind(topic.active)
        .bind(topic.merged_into)
        .bind(topic.deleted_at)
        .bind(topic.created_at)
        .bind(topic.ingest_count)
        .bind(topic.market_count)
        .bind(topic.snapshot_count)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RegistryError::ConflictDetected(format!("slug already in use: {}", topic.slug))
            }
            _ => RegistryError::Database(e),
        })?;
        Ok(())
    }

    async fn get_topic(&self, id: Uuid) -> Result<Option<Topic>> {
        let row = sqlx::query("SELECT * FROM topics WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::topic_from_row(&r)).transpose()
    }

    async fn get_topics(&self, ids: &[Uuid]) -> Result<Vec<Topic>> {
        let rows = sqlx::query("SELECT * FROM topics WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::topic_from_row).collect()
    }

    async fn list_scannable(&self, limit: usize) -> Result<Vec<Topic>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM topics
            WHERE active = TRUE AND merged_into IS NULL AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::topic_from_row).collect()
    }

    async fn update_topic(&self, topic: &Topic) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::update_topic_in_tx(&mut tx, topic).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, topics), fields(count = topics.len()))]
    async fn update_topics(&self, topics: &[Topic]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for topic in topics {
            Self::update_topic_in_tx(&mut tx, topic).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl MergeStore for PostgresStore {
    #[instrument(skip(self, record), fields(merge_id = %record.id))]
    async fn create_merge(&self, record: &MergeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO merge_records (
                id, primary_id, duplicate_ids, scores, confidence, reason,
                executed_by, status, rollback_reason,
                created_at, completed_at, rolled_back_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(record.primary_id)
        .bind(&record.duplicate_ids)
        .bind(serde_json::to_value(&record.scores)?)
        .bind(record.confidence)
        .bind(&record.reason)
        .bind(&record.executed_by)
        .bind(record.status.as_str())
        .bind(&record.rollback_reason)
        .bind(record.created_at)
        .bind(record.completed_at)
        .bind(record.rolled_back_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_merge(&self, id: Uuid) -> Result<Option<MergeRecord>> {
        let row = sqlx::query("SELECT * FROM merge_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::merge_from_row(&r)).transpose()
    }

    async fn update_merge(&self, record: &MergeRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE merge_records SET
                status = $2, rollback_reason = $3,
                completed_at = $4, rolled_back_at = $5
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(&record.rollback_reason)
        .bind(record.completed_at)
        .bind(record.rolled_back_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(format!("merge {}", record.id)));
        }
        Ok(())
    }

    async fn merge_history(&self, topic_id: Uuid, limit: usize) -> Result<Vec<MergeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM merge_records
            WHERE primary_id = $1 OR $1 = ANY(duplicate_ids)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(topic_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::merge_from_row).collect()
    }

    async fn find_open_merges(&self, topic_ids: &[Uuid]) -> Result<Vec<MergeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM merge_records
            WHERE status IN ('IN_PROGRESS', 'ROLLING_BACK')
              AND (primary_id = ANY($1) OR duplicate_ids && $1)
            "#,
        )
        .bind(topic_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::merge_from_row).collect()
    }
}

#[async_trait]
impl SymbolStore for PostgresStore {
    #[instrument(skip(self, registration), fields(symbol = %registration.symbol))]
    async fn insert_symbol(&self, registration: &SymbolRegistration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO symbol_registrations (
                id, topic_id, symbol, alias, status,
                ownership, lifecycle, governance, audit_log,
                expiration_date, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(registration.id)
        .bind(registration.topic_id)
        .bind(&registration.symbol)
        .bind(&registration.alias)
        .bind(registration.status.as_str())
        .bind(serde_json::to_value(&registration.ownership)?)
        .bind(serde_json::to_value(&registration.lifecycle)?)
        .bind(serde_json::to_value(&registration.governance)?)
        .bind(serde_json::to_value(&registration.audit_log)?)
        .bind(registration.lifecycle.expiration_date)
        .bind(registration.lifecycle.version)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RegistryError::ConflictDetected(format!(
                    "symbol already registered: {}",
                    registration.symbol
                ))
            }
            _ => RegistryError::Database(e),
        })?;
        Ok(())
    }

    async fn get_symbol(&self, symbol: &str) -> Result<Option<SymbolRegistration>> {
        let row = sqlx::query(
            "SELECT * FROM symbol_registrations WHERE symbol = $1 AND status <> 'ARCHIVED'",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::symbol_from_row(&r)).transpose()
    }

    async fn find_live_collision(
        &self,
        symbol: &str,
        alias: Option<&str>,
    ) -> Result<Option<SymbolRegistration>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM symbol_registrations
            WHERE status <> 'ARCHIVED'
              AND (symbol = $1 OR alias = $1 OR ($2::text IS NOT NULL AND alias = $2))
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(alias)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::symbol_from_row(&r)).transpose()
    }

    async fn find_by_topic(&self, topic_id: Uuid) -> Result<Option<SymbolRegistration>> {
        let row = sqlx::query(
            "SELECT * FROM symbol_registrations WHERE topic_id = $1 AND status <> 'ARCHIVED'",
        )
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::symbol_from_row(&r)).transpose()
    }

    #[instrument(skip(self, registration), fields(symbol = %registration.symbol))]
    async fn update_symbol(&self, registration: &SymbolRegistration) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::update_symbol_in_tx(&mut tx, registration).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, registrations), fields(count = registrations.len()))]
    async fn update_symbols(&self, registrations: &[SymbolRegistration]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for registration in registrations {
            Self::update_symbol_in_tx(&mut tx, registration).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<SymbolRegistration>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM symbol_registrations
            WHERE status <> 'ARCHIVED'
              AND expiration_date IS NOT NULL
              AND expiration_date < $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::symbol_from_row).collect()
    }
}
