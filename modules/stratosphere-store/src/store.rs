use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder};
use tracing::warn;

use stratosphere_common::{Bucket, Lead, LeadStatus, NewLead, StratoError};
use stratosphere_engine::{LeadStore, Result};

pub struct PgLeadStore {
    pool: PgPool,
}

/// A row from the leads table. Enum and list columns are stored as text and
/// jsonb; conversion to the domain type happens in `into_lead`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct LeadRow {
    id: i64,
    normalized_domain: Option<String>,
    normalized_handle: Option<String>,
    normalized_channel: Option<String>,
    project_name: String,
    description: Option<String>,
    domain: Option<String>,
    social_handle: Option<String>,
    profile_image_url: Option<String>,
    status: String,
    score: i32,
    bucket: Option<String>,
    reject_reason: Option<String>,
    run_id: Option<String>,
    source_counts: i32,
    email: Option<String>,
    discord_url: Option<String>,
    telegram_url: Option<String>,
    telegram_channel: Option<String>,
    funding_info: Option<String>,
    launch_date: Option<DateTime<Utc>>,
    chains: serde_json::Value,
    tags: serde_json::Value,
    ai_analysis: Option<String>,
    icebreaker: Option<String>,
    last_contacted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LeadRow {
    fn into_lead(self) -> Lead {
        Lead {
            id: self.id,
            normalized_domain: self.normalized_domain,
            normalized_handle: self.normalized_handle,
            normalized_channel: self.normalized_channel,
            project_name: self.project_name,
            description: self.description,
            domain: self.domain,
            social_handle: self.social_handle,
            profile_image_url: self.profile_image_url,
            status: LeadStatus::from_str_loose(&self.status),
            score: self.score,
            bucket: self.bucket.as_deref().and_then(Bucket::from_str_loose),
            reject_reason: self.reject_reason,
            run_id: self.run_id,
            source_counts: self.source_counts,
            email: self.email,
            discord_url: self.discord_url,
            telegram_url: self.telegram_url,
            telegram_channel: self.telegram_channel,
            funding_info: self.funding_info,
            launch_date: self.launch_date,
            chains: json_strings(self.chains),
            tags: json_strings(self.tags),
            ai_analysis: self.ai_analysis,
            icebreaker: self.icebreaker,
            last_contacted_at: self.last_contacted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn json_strings(value: serde_json::Value) -> Vec<String> {
    serde_json::from_value(value).unwrap_or_default()
}

/// Filters for the lead listing endpoint. All optional.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub bucket: Option<Bucket>,
    pub run_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LeadStats {
    pub total: i64,
    pub by_bucket: Vec<(String, i64)>,
    pub by_source: Vec<(String, i64)>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct RunLogLine {
    pub id: i64,
    pub run_id: String,
    pub lead_id: Option<i64>,
    pub component: String,
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StratoError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Filtered, paginated listing for the API.
    pub async fn query(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT * FROM leads WHERE 1=1");
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(bucket) = filter.bucket {
            qb.push(" AND bucket = ").push_bind(bucket.to_string());
        }
        if let Some(run_id) = &filter.run_id {
            qb.push(" AND run_id = ").push_bind(run_id.clone());
        }
        if let Some(after) = filter.created_after {
            qb.push(" AND created_at >= ").push_bind(after);
        }
        qb.push(" ORDER BY score DESC, created_at DESC");
        qb.push(" OFFSET ").push_bind(filter.skip.max(0));
        qb.push(" LIMIT ").push_bind(filter.limit.clamp(1, 500));

        let rows: Vec<LeadRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(LeadRow::into_lead).collect())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(LeadRow::into_lead))
    }

    /// Manual review: move a lead to a new status and/or bucket.
    pub async fn set_status_bucket(
        &self,
        id: i64,
        status: Option<LeadStatus>,
        bucket: Option<Bucket>,
    ) -> Result<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>(
            r#"
            UPDATE leads
            SET status = COALESCE($2, status),
                bucket = COALESCE($3, bucket),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.map(|s| s.to_string()))
        .bind(bucket.map(|b| b.to_string()))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(LeadRow::into_lead))
    }

    /// Everything, ordered for CSV export.
    pub async fn export_rows(&self) -> Result<Vec<Lead>> {
        let rows = sqlx::query_as::<_, LeadRow>(
            "SELECT * FROM leads ORDER BY score DESC, created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(LeadRow::into_lead).collect())
    }

    pub async fn stats(&self) -> Result<LeadStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let by_bucket: Vec<(String, i64)> = sqlx::query_as(
            "SELECT COALESCE(bucket, 'UNBUCKETED'), COUNT(*) FROM leads GROUP BY 1 ORDER BY 2 DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let by_source: Vec<(String, i64)> = sqlx::query_as(
            "SELECT source_name, COUNT(DISTINCT lead_id) FROM lead_sources GROUP BY 1 ORDER BY 2 DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(LeadStats {
            total,
            by_bucket,
            by_source,
        })
    }

    /// Record a progress line for a run. Logs a warning on failure rather
    /// than propagating; a failed log write shouldn't abort the run.
    pub async fn log_line(
        &self,
        run_id: &str,
        lead_id: Option<i64>,
        component: &str,
        level: &str,
        message: &str,
    ) {
        let result = sqlx::query(
            "INSERT INTO run_logs (run_id, lead_id, component, level, message) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(run_id)
        .bind(lead_id)
        .bind(component)
        .bind(level)
        .bind(message)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            warn!(run_id, error = %e, "Failed to record run log line");
        }
    }

    pub async fn recent_logs(&self, run_id: &str, limit: i64) -> Result<Vec<RunLogLine>> {
        let rows = sqlx::query_as::<_, RunLogLine>(
            "SELECT * FROM run_logs WHERE run_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(run_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows)
    }
}

fn db_err(e: sqlx::Error) -> StratoError {
    StratoError::Database(e.to_string())
}

/// Map a unique violation on one of the identity key indexes back to the
/// column it guards, so the engine can fall back to merge.
fn duplicate_key_error(e: &sqlx::Error, lead: &NewLead) -> Option<StratoError> {
    let db = e.as_database_error()?;
    if db.code().as_deref() != Some("23505") {
        return None;
    }
    let constraint = db.constraint()?;
    let (column, value) = match constraint {
        "leads_normalized_domain_key" => ("normalized_domain", lead.normalized_domain.clone()),
        "leads_normalized_handle_key" => ("normalized_handle", lead.normalized_handle.clone()),
        "leads_normalized_channel_key" => ("normalized_channel", lead.normalized_channel.clone()),
        _ => return None,
    };
    Some(StratoError::DuplicateKey {
        column: column.to_string(),
        value: value.unwrap_or_default(),
    })
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE normalized_domain = $1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(LeadRow::into_lead))
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE normalized_handle = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(LeadRow::into_lead))
    }

    async fn find_by_channel(&self, channel: &str) -> Result<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE normalized_channel = $1")
            .bind(channel)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(LeadRow::into_lead))
    }

    async fn insert(&self, lead: NewLead) -> Result<Lead> {
        let result = sqlx::query_as::<_, LeadRow>(
            r#"
            INSERT INTO leads
                (normalized_domain, normalized_handle, normalized_channel,
                 project_name, description, domain, social_handle, profile_image_url,
                 status, score, bucket, reject_reason,
                 run_id, source_counts,
                 email, discord_url, telegram_url, telegram_channel,
                 funding_info, launch_date, chains, tags, ai_analysis, icebreaker)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)
            RETURNING *
            "#,
        )
        .bind(&lead.normalized_domain)
        .bind(&lead.normalized_handle)
        .bind(&lead.normalized_channel)
        .bind(&lead.project_name)
        .bind(&lead.description)
        .bind(&lead.domain)
        .bind(&lead.social_handle)
        .bind(&lead.profile_image_url)
        .bind(lead.status.to_string())
        .bind(lead.score)
        .bind(lead.bucket.map(|b| b.to_string()))
        .bind(&lead.reject_reason)
        .bind(&lead.run_id)
        .bind(lead.source_counts)
        .bind(&lead.email)
        .bind(&lead.discord_url)
        .bind(&lead.telegram_url)
        .bind(&lead.telegram_channel)
        .bind(&lead.funding_info)
        .bind(lead.launch_date)
        .bind(serde_json::json!(lead.chains))
        .bind(serde_json::json!(lead.tags))
        .bind(&lead.ai_analysis)
        .bind(&lead.icebreaker)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into_lead()),
            Err(e) => match duplicate_key_error(&e, &lead) {
                Some(dup) => Err(dup),
                None => Err(db_err(e)),
            },
        }
    }

    async fn update(&self, lead: &Lead) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE leads SET
                normalized_domain = $2, normalized_handle = $3, normalized_channel = $4,
                project_name = $5, description = $6, domain = $7,
                social_handle = $8, profile_image_url = $9,
                status = $10, score = $11, bucket = $12, reject_reason = $13,
                source_counts = $14,
                email = $15, discord_url = $16, telegram_url = $17, telegram_channel = $18,
                funding_info = $19, launch_date = $20, chains = $21, tags = $22,
                ai_analysis = $23, icebreaker = $24, last_contacted_at = $25,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(lead.id)
        .bind(&lead.normalized_domain)
        .bind(&lead.normalized_handle)
        .bind(&lead.normalized_channel)
        .bind(&lead.project_name)
        .bind(&lead.description)
        .bind(&lead.domain)
        .bind(&lead.social_handle)
        .bind(&lead.profile_image_url)
        .bind(lead.status.to_string())
        .bind(lead.score)
        .bind(lead.bucket.map(|b| b.to_string()))
        .bind(&lead.reject_reason)
        .bind(lead.source_counts)
        .bind(&lead.email)
        .bind(&lead.discord_url)
        .bind(&lead.telegram_url)
        .bind(&lead.telegram_channel)
        .bind(&lead.funding_info)
        .bind(lead.launch_date)
        .bind(serde_json::json!(lead.chains))
        .bind(serde_json::json!(lead.tags))
        .bind(&lead.ai_analysis)
        .bind(&lead.icebreaker)
        .bind(lead.last_contacted_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn append_sighting(
        &self,
        lead_id: i64,
        source_name: &str,
        source_url: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO lead_sources (lead_id, source_name, source_url) VALUES ($1, $2, $3)",
        )
        .bind(lead_id)
        .bind(source_name)
        .bind(source_url)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(n as u64)
    }

    async fn count_for_run(&self, run_id: &str) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE run_id = $1")
            .bind(run_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(n as u64)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM leads WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn leads_for_run(&self, run_id: &str) -> Result<Vec<Lead>> {
        let rows = sqlx::query_as::<_, LeadRow>(
            "SELECT * FROM leads WHERE run_id = $1 ORDER BY id",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(LeadRow::into_lead).collect())
    }

    async fn get_rotation_cursor(&self, adapter: &str) -> Result<Option<u32>> {
        let cursor: Option<i32> =
            sqlx::query_scalar("SELECT cursor FROM rotation_cursors WHERE adapter = $1")
                .bind(adapter)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(cursor.map(|c| c as u32))
    }

    async fn set_rotation_cursor(&self, adapter: &str, cursor: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rotation_cursors (adapter, cursor)
            VALUES ($1, $2)
            ON CONFLICT (adapter)
            DO UPDATE SET cursor = EXCLUDED.cursor, updated_at = now()
            "#,
        )
        .bind(adapter)
        .bind(cursor as i32)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
