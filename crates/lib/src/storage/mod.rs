//! Plate record persistence.
//!
//! Sinks are independently optional. The recorder fans a record out to every configured
//! sink; a sink failure is logged and never reaches the user-visible reply.

mod postgres;
mod sheets;

pub use postgres::PostgresSink;
pub use sheets::SheetsSink;

use crate::plate::PlateReading;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::sync::Arc;

/// Bangkok is UTC+7 with no daylight saving.
const BANGKOK_OFFSET_SECS: i32 = 7 * 3600;

pub fn bangkok() -> FixedOffset {
    FixedOffset::east_opt(BANGKOK_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("sheets request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("sheets api error: {0}")]
    Sheets(String),
    #[error("credentials error: {0}")]
    Credentials(String),
    #[error("{0} does not keep history")]
    Unsupported(String),
}

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// One persisted plate sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRecord {
    pub reading: PlateReading,
    pub source_id: Option<String>,
    pub media_kind: MediaKind,
    pub recorded_at: DateTime<Utc>,
}

impl PlateRecord {
    pub fn now(reading: PlateReading, source_id: Option<&str>, media_kind: MediaKind) -> Self {
        Self {
            reading,
            source_id: source_id.map(str::to_string),
            media_kind,
            recorded_at: Utc::now(),
        }
    }

    /// Recording time in Thai local time.
    pub fn local_time(&self) -> DateTime<FixedOffset> {
        self.recorded_at.with_timezone(&bangkok())
    }
}

/// A persistence collaborator.
#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;

    async fn persist(&self, record: &PlateRecord) -> Result<(), StorageError>;

    /// True if `recent` is implemented.
    fn keeps_history(&self) -> bool {
        false
    }

    /// Most recent records, newest first.
    async fn recent(&self, _limit: usize) -> Result<Vec<PlateRecord>, StorageError> {
        Err(StorageError::Unsupported(self.name().to_string()))
    }
}

/// Fan-out over the configured sinks.
#[derive(Default)]
pub struct Recorder {
    sinks: Vec<Arc<dyn RecordSink>>,
}

impl Recorder {
    pub fn new(sinks: Vec<Arc<dyn RecordSink>>) -> Self {
        Self { sinks }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Persist to every sink. Failures are logged; returns how many sinks failed.
    pub async fn record(&self, record: &PlateRecord) -> usize {
        let mut failed = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.persist(record).await {
                failed += 1;
                log::warn!(
                    "{}: failed to persist plate {}: {}",
                    sink.name(),
                    record.reading.label(),
                    e
                );
            } else {
                log::debug!("{}: persisted plate {}", sink.name(), record.reading.label());
            }
        }
        failed
    }

    /// Recent records from the first sink that keeps history; `Ok(None)` when none does.
    pub async fn recent(&self, limit: usize) -> Result<Option<Vec<PlateRecord>>, StorageError> {
        match self.sinks.iter().find(|s| s.keeps_history()) {
            Some(sink) => sink.recent(limit).await.map(Some),
            None => Ok(None),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemorySink;
    use super::*;

    fn record(plate: &str) -> PlateRecord {
        PlateRecord::now(
            PlateReading {
                plate_number: plate.to_string(),
                province: "ขอนแก่น".to_string(),
            },
            Some("U1"),
            MediaKind::Image,
        )
    }

    #[tokio::test]
    async fn failing_sink_does_not_block_others() {
        let bad = Arc::new(MemorySink {
            fail: true,
            ..Default::default()
        });
        let good = Arc::new(MemorySink::default());
        let recorder = Recorder::new(vec![bad.clone(), good.clone()]);
        assert_eq!(recorder.record(&record("กข 1")).await, 1);
        assert_eq!(good.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recent_uses_first_sink_with_history() {
        let bad = Arc::new(MemorySink {
            fail: true,
            ..Default::default()
        });
        let good = Arc::new(MemorySink::default());
        let recorder = Recorder::new(vec![bad, good]);
        recorder.record(&record("กข 1")).await;
        recorder.record(&record("กข 2")).await;
        let recent = recorder.recent(1).await.unwrap().unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].reading.plate_number, "กข 2");
    }

    #[test]
    fn empty_only_without_sinks() {
        assert!(Recorder::default().is_empty());
        let sink: Arc<dyn RecordSink> = Arc::new(MemorySink::default());
        assert!(!Recorder::new(vec![sink]).is_empty());
    }

    #[tokio::test]
    async fn no_history_sink_is_none() {
        assert!(Recorder::default().recent(5).await.unwrap().is_none());
    }

    #[test]
    fn local_time_is_utc_plus_seven() {
        let r = record("กข 1");
        assert_eq!(r.local_time().offset().local_minus_utc(), 7 * 3600);
        assert_eq!(MediaKind::parse(MediaKind::Video.as_str()), Some(MediaKind::Video));
    }
}
