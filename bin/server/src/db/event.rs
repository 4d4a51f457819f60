//! Postgres event store.

use super::{backend, serialization};
use async_trait::async_trait;
use chime_core::{ActorId, EventId};
use chime_store::{Event, EventKey, EventStore, StoreError, TimeBucket};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;

const COLUMNS: &str = "bucket, event_id, actor_id, name, from_ts, to_ts, frequency, claimed, \
                       reschedule, children, series_anchor, occurrence";

/// Row type for event queries.
#[derive(Debug, FromRow)]
struct EventRow {
    bucket: i64,
    event_id: String,
    actor_id: String,
    name: String,
    from_ts: DateTime<Utc>,
    to_ts: Option<DateTime<Utc>>,
    frequency: String,
    claimed: bool,
    reschedule: bool,
    children: serde_json::Value,
    series_anchor: DateTime<Utc>,
    occurrence: i64,
}

impl EventRow {
    fn try_into_event(self) -> Result<Event, StoreError> {
        let children: Vec<EventKey> =
            serde_json::from_value(self.children).map_err(serialization)?;
        let occurrence =
            u32::try_from(self.occurrence).map_err(|_| StoreError::Serialization {
                reason: format!("occurrence {} out of range", self.occurrence),
            })?;
        Ok(Event {
            id: EventId::new(self.event_id),
            actor_id: ActorId::new(self.actor_id),
            name: self.name,
            from_ts: self.from_ts,
            to_ts: self.to_ts,
            frequency: self.frequency,
            claimed: self.claimed,
            reschedule: self.reschedule,
            bucket: TimeBucket::from_seconds(self.bucket),
            children,
            series_anchor: self.series_anchor,
            occurrence,
        })
    }
}

fn collect(rows: Vec<EventRow>) -> Result<Vec<Event>, StoreError> {
    rows.into_iter().map(EventRow::try_into_event).collect()
}

/// Repository for scheduled events.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn put(&self, event: &Event) -> Result<(), StoreError> {
        let children = serde_json::to_value(&event.children).map_err(serialization)?;
        sqlx::query(
            r#"
            INSERT INTO events
                (bucket, event_id, actor_id, name, from_ts, to_ts, frequency, claimed,
                 reschedule, children, series_anchor, occurrence)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (bucket, event_id) DO UPDATE
            SET actor_id = EXCLUDED.actor_id, name = EXCLUDED.name,
                from_ts = EXCLUDED.from_ts, to_ts = EXCLUDED.to_ts,
                frequency = EXCLUDED.frequency, claimed = EXCLUDED.claimed,
                reschedule = EXCLUDED.reschedule, children = EXCLUDED.children,
                series_anchor = EXCLUDED.series_anchor, occurrence = EXCLUDED.occurrence
            "#,
        )
        .bind(event.bucket.as_seconds())
        .bind(event.id.as_str())
        .bind(event.actor_id.as_str())
        .bind(&event.name)
        .bind(event.from_ts)
        .bind(event.to_ts)
        .bind(&event.frequency)
        .bind(event.claimed)
        .bind(event.reschedule)
        .bind(&children)
        .bind(event.series_anchor)
        .bind(i64::from(event.occurrence))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, key: &EventKey) -> Result<Option<Event>, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM events WHERE bucket = $1 AND event_id = $2"
        ))
        .bind(key.bucket.as_seconds())
        .bind(key.event_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(EventRow::try_into_event).transpose()
    }

    async fn delete(&self, key: &EventKey) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE bucket = $1 AND event_id = $2")
            .bind(key.bucket.as_seconds())
            .bind(key.event_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            debug!(key = %key, "delete of absent event");
        }
        Ok(result.rows_affected() > 0)
    }

    async fn batch_get(&self, keys: &[EventKey]) -> Result<Vec<Event>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let buckets: Vec<i64> = keys.iter().map(|k| k.bucket.as_seconds()).collect();
        let ids: Vec<String> = keys.iter().map(|k| k.event_id.as_str().to_string()).collect();
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM events
            WHERE (bucket, event_id) IN (SELECT * FROM UNNEST($1::bigint[], $2::text[]))
            ORDER BY from_ts, event_id
            "#
        ))
        .bind(&buckets)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        collect(rows)
    }

    async fn scan_due_unclaimed(&self, bucket: TimeBucket) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM events WHERE bucket = $1 AND claimed = FALSE"
        ))
        .bind(bucket.as_seconds())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        collect(rows)
    }

    async fn mark_claimed(&self, key: &EventKey) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE events SET claimed = TRUE WHERE bucket = $1 AND event_id = $2 AND claimed = FALSE",
        )
        .bind(key.bucket.as_seconds())
        .bind(key.event_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }
}
