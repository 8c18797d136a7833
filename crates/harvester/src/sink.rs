//! Idempotent record persistence
//!
//! Each page's valid records are written in one transaction. Rows are keyed
//! by the resume's natural id; redelivering a record rewrites the same row
//! with the same values, so duplicate delivery is a no-op on state.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::SinkError;
use crate::record::ResumeRecord;

/// Destination for validated records.
pub trait RecordSink: Send + Sync {
    /// Upsert a batch, returning the number of records written.
    fn upsert<'a>(
        &'a self,
        records: &'a [ResumeRecord],
    ) -> Pin<Box<dyn Future<Output = Result<u64, SinkError>> + Send + 'a>>;
}

/// SQLite-backed sink.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Open (creating if missing) the database at `path` and ensure the
    /// `resumes` table exists.
    pub async fn connect(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let sink = Self { pool };
        sink.migrate().await?;
        info!(path = %path.display(), "record sink ready");
        Ok(sink)
    }

    async fn migrate(&self) -> Result<(), SinkError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resumes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resume_id TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                age INTEGER,
                title TEXT,
                education TEXT,
                experience TEXT,
                area_id TEXT,
                area_name TEXT,
                gender_id TEXT,
                salary_amount INTEGER,
                salary_currency TEXT,
                photo_medium TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of stored resumes.
    pub async fn count(&self) -> Result<i64, SinkError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resumes")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn upsert_batch(&self, records: &[ResumeRecord]) -> Result<u64, SinkError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            let education = encode_json(&record.id, record.education.as_ref())?;
            let experience = encode_json(&record.id, record.experience.as_ref())?;
            sqlx::query(
                r#"
                INSERT INTO resumes (resume_id, url, created_at, updated_at, age, title, education, experience, area_id, area_name, gender_id, salary_amount, salary_currency, photo_medium)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(resume_id) DO UPDATE SET
                    url = excluded.url,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    age = excluded.age,
                    title = excluded.title,
                    education = excluded.education,
                    experience = excluded.experience,
                    area_id = excluded.area_id,
                    area_name = excluded.area_name,
                    gender_id = excluded.gender_id,
                    salary_amount = excluded.salary_amount,
                    salary_currency = excluded.salary_currency,
                    photo_medium = excluded.photo_medium
                "#,
            )
            .bind(&record.id)
            .bind(&record.alternate_url)
            .bind(record.created_at.to_rfc3339())
            .bind(record.updated_at.to_rfc3339())
            .bind(record.age)
            .bind(&record.title)
            .bind(education)
            .bind(experience)
            .bind(&record.area_id)
            .bind(&record.area_name)
            .bind(&record.gender_id)
            .bind(record.salary_amount)
            .bind(&record.salary_currency)
            .bind(&record.photo_medium)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(records = records.len(), "batch upserted");
        Ok(records.len() as u64)
    }
}

fn encode_json(id: &str, value: Option<&serde_json::Value>) -> Result<Option<String>, SinkError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|source| SinkError::Encode {
            id: id.to_string(),
            source,
        })
}

impl RecordSink for SqliteSink {
    fn upsert<'a>(
        &'a self,
        records: &'a [ResumeRecord],
    ) -> Pin<Box<dyn Future<Output = Result<u64, SinkError>> + Send + 'a>> {
        Box::pin(self.upsert_batch(records))
    }
}
