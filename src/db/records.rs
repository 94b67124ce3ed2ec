use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::ExternalError;
use crate::pipeline::collaborators::{AdRecord, RecordSync};

const SERVICE: &str = "record store";

/// Keeps one `ad_records` row per job in PostgreSQL.
pub struct PgRecordSync {
    pool: PgPool,
}

impl PgRecordSync {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Insert or update the record for a job
pub async fn upsert_record(pool: &PgPool, record: &AdRecord) -> Result<(), sqlx::Error> {
    let (creative_id, ad_id) = match &record.platform_ids {
        Some(ids) => (Some(ids.creative_id.as_str()), Some(ids.ad_id.as_str())),
        None => (None, None),
    };

    sqlx::query(
        r#"
        INSERT INTO ad_records
            (job_id, batch_id, source_ref, primary_text, headline, creative_id, ad_id, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (job_id) DO UPDATE SET
            primary_text = EXCLUDED.primary_text,
            headline     = EXCLUDED.headline,
            creative_id  = EXCLUDED.creative_id,
            ad_id        = EXCLUDED.ad_id,
            status       = EXCLUDED.status,
            updated_at   = NOW()
        "#,
    )
    .bind(record.job_id)
    .bind(record.batch_id)
    .bind(&record.source_ref)
    .bind(&record.copy.primary_text)
    .bind(&record.copy.headline)
    .bind(creative_id)
    .bind(ad_id)
    .bind(&record.status)
    .execute(pool)
    .await?;

    Ok(())
}

/// Connection-level failures are retried; anything the database itself
/// rejected is not, except serialization and connection-class SQLSTATEs.
pub fn classify_sqlx(err: sqlx::Error) -> ExternalError {
    let transient = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("08") || code.starts_with("40")),
        _ => false,
    };

    if transient {
        ExternalError::transient(SERVICE, err.to_string())
    } else {
        ExternalError::non_retryable(SERVICE, err.to_string())
    }
}

#[async_trait]
impl RecordSync for PgRecordSync {
    async fn update(&self, record: &AdRecord) -> Result<(), ExternalError> {
        upsert_record(&self.pool, record)
            .await
            .map_err(classify_sqlx)?;
        tracing::debug!(job_id = %record.job_id, status = %record.status, "Ad record synced");
        Ok(())
    }
}
