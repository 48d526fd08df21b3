//! PostgreSQL sink: one row per plate sighting in `plate_logs`.

use crate::plate::PlateReading;
use crate::storage::{MediaKind, PlateRecord, RecordSink, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS plate_logs (
    id BIGSERIAL PRIMARY KEY,
    plate_number TEXT NOT NULL,
    province TEXT NOT NULL,
    source_id TEXT,
    media_kind TEXT NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const INSERT: &str = "INSERT INTO plate_logs (plate_number, province, source_id, media_kind, recorded_at)
    VALUES ($1, $2, $3, $4, $5)";

const SELECT_RECENT: &str = "SELECT plate_number, province, source_id, media_kind, recorded_at
    FROM plate_logs ORDER BY recorded_at DESC, id DESC LIMIT $1";

pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    /// Connect and make sure the table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        log::info!("postgres: plate_logs table ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordSink for PostgresSink {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn persist(&self, record: &PlateRecord) -> Result<(), StorageError> {
        sqlx::query(INSERT)
            .bind(&record.reading.plate_number)
            .bind(&record.reading.province)
            .bind(record.source_id.as_deref())
            .bind(record.media_kind.as_str())
            .bind(record.recorded_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn keeps_history(&self) -> bool {
        true
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PlateRecord>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(SELECT_RECENT)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<PlateRecord, StorageError> {
                let media: String = row.try_get("media_kind")?;
                let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;
                Ok(PlateRecord {
                    reading: PlateReading {
                        plate_number: row.try_get("plate_number")?,
                        province: row.try_get("province")?,
                    },
                    source_id: row.try_get("source_id")?,
                    media_kind: MediaKind::parse(&media).unwrap_or(MediaKind::Image),
                    recorded_at,
                })
            })
            .collect()
    }
}
