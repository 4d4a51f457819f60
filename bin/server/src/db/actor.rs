//! Postgres actor store.

use super::{backend, serialization};
use async_trait::async_trait;
use chime_conversation::LogEntry;
use chime_core::{ActorId, MessageId};
use chime_store::{
    Actor, ActorStore, ConsentState, EventKey, LockState, RecentMessages, StoreError, UsageStats,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgQueryResult;
use sqlx::{FromRow, PgPool};
use tracing::debug;

const COLUMNS: &str = "id, name, timezone, conversation, events, locked, locked_at, \
recent_message_ids, consent, stats";

/// Row type for actor queries.
#[derive(Debug, FromRow)]
struct ActorRow {
    id: String,
    name: Option<String>,
    timezone: Option<String>,
    conversation: serde_json::Value,
    events: serde_json::Value,
    locked: bool,
    locked_at: Option<DateTime<Utc>>,
    recent_message_ids: serde_json::Value,
    consent: String,
    stats: serde_json::Value,
}

impl ActorRow {
    fn from_actor(actor: &Actor) -> Result<Self, StoreError> {
        Ok(Self {
            id: actor.id.as_str().to_string(),
            name: actor.name.clone(),
            timezone: actor.timezone.clone(),
            conversation: serde_json::to_value(&actor.conversation).map_err(serialization)?,
            events: serde_json::to_value(&actor.events).map_err(serialization)?,
            locked: actor.lock.locked,
            locked_at: actor.lock.locked_at,
            recent_message_ids: serde_json::to_value(&actor.recent_message_ids)
                .map_err(serialization)?,
            consent: consent_to_str(actor.consent).to_string(),
            stats: serde_json::to_value(&actor.stats).map_err(serialization)?,
        })
    }

    fn try_into_actor(self) -> Result<Actor, StoreError> {
        let recent: Vec<MessageId> =
            serde_json::from_value(self.recent_message_ids).map_err(serialization)?;
        Ok(Actor {
            id: ActorId::new(self.id),
            name: self.name,
            timezone: self.timezone,
            conversation: serde_json::from_value(self.conversation).map_err(serialization)?,
            events: serde_json::from_value(self.events).map_err(serialization)?,
            lock: LockState {
                locked: self.locked,
                locked_at: self.locked_at,
            },
            recent_message_ids: RecentMessages::from_ids(recent),
            consent: consent_from_str(&self.consent)?,
            stats: serde_json::from_value(self.stats).map_err(serialization)?,
        })
    }
}

fn consent_to_str(consent: ConsentState) -> &'static str {
    match consent {
        ConsentState::Pending => "pending",
        ConsentState::Granted => "granted",
        ConsentState::Declined => "declined",
    }
}

fn consent_from_str(value: &str) -> Result<ConsentState, StoreError> {
    match value {
        "pending" => Ok(ConsentState::Pending),
        "granted" => Ok(ConsentState::Granted),
        "declined" => Ok(ConsentState::Declined),
        other => Err(StoreError::Serialization {
            reason: format!("unknown consent state: {other}"),
        }),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Repository for actor records.
#[derive(Debug, Clone)]
pub struct PgActorStore {
    pool: PgPool,
}

impl PgActorStore {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Maps an update that touched no row to `NotFound`.
    fn require_row(id: &ActorId, result: PgQueryResult) -> Result<(), StoreError> {
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                key: format!("actor {id}"),
            });
        }
        Ok(())
    }

    async fn exists(&self, id: &ActorId) -> Result<bool, StoreError> {
        let found: Option<(String,)> = sqlx::query_as("SELECT id FROM actors WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(found.is_some())
    }

    async fn set_json(
        &self,
        id: &ActorId,
        column: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&format!("UPDATE actors SET {column} = $2 WHERE id = $1"))
            .bind(id.as_str())
            .bind(&value)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Self::require_row(id, result)
    }

    async fn append_json(
        &self,
        id: &ActorId,
        column: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE actors SET {column} = {column} || $2::jsonb WHERE id = $1"
        ))
        .bind(id.as_str())
        .bind(&value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Self::require_row(id, result)
    }
}

#[async_trait]
impl ActorStore for PgActorStore {
    async fn load(&self, id: &ActorId) -> Result<Option<Actor>, StoreError> {
        let row: Option<ActorRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM actors WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        row.map(ActorRow::try_into_actor).transpose()
    }

    async fn create(&self, actor: &Actor) -> Result<(), StoreError> {
        let row = ActorRow::from_actor(actor)?;
        sqlx::query(
            r#"
            INSERT INTO actors
                (id, name, timezone, conversation, events, locked, locked_at,
                 recent_message_ids, consent, stats)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.timezone)
        .bind(&row.conversation)
        .bind(&row.events)
        .bind(row.locked)
        .bind(row.locked_at)
        .bind(&row.recent_message_ids)
        .bind(&row.consent)
        .bind(&row.stats)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::AlreadyExists {
                    key: format!("actor {}", actor.id),
                }
            } else {
                backend(e)
            }
        })?;
        Ok(())
    }

    async fn try_lock(
        &self,
        id: &ActorId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE actors SET locked = TRUE, locked_at = $2
            WHERE id = $1
              AND (locked = FALSE OR locked_at IS NULL OR locked_at < $3)
            "#,
        )
        .bind(id.as_str())
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        if !self.exists(id).await? {
            return Err(StoreError::NotFound {
                key: format!("actor {id}"),
            });
        }
        debug!(actor_id = %id, "lock held");
        Err(StoreError::ConditionFailed {
            key: format!("actor {id}"),
            reason: "lock held".to_string(),
        })
    }

    async fn unlock(&self, id: &ActorId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE actors SET locked = FALSE WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Self::require_row(id, result)
    }

    async fn set_recent_message_ids(
        &self,
        id: &ActorId,
        ids: &RecentMessages,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(ids).map_err(serialization)?;
        self.set_json(id, "recent_message_ids", value).await
    }

    async fn append_conversation(
        &self,
        id: &ActorId,
        entries: &[LogEntry],
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(entries).map_err(serialization)?;
        self.append_json(id, "conversation", value).await
    }

    async fn append_events(&self, id: &ActorId, keys: &[EventKey]) -> Result<(), StoreError> {
        let value = serde_json::to_value(keys).map_err(serialization)?;
        self.append_json(id, "events", value).await
    }

    async fn set_events(&self, id: &ActorId, keys: &[EventKey]) -> Result<(), StoreError> {
        let value = serde_json::to_value(keys).map_err(serialization)?;
        self.set_json(id, "events", value).await
    }

    async fn replace_event(
        &self,
        id: &ActorId,
        old: &EventKey,
        new: &EventKey,
    ) -> Result<(), StoreError> {
        let old = serde_json::to_value(old).map_err(serialization)?;
        let new = serde_json::to_value(new).map_err(serialization)?;
        let result = sqlx::query(
            r#"
            UPDATE actors SET events = CASE
                WHEN events @> jsonb_build_array($2::jsonb) THEN (
                    SELECT jsonb_agg(
                        CASE WHEN item = $2::jsonb THEN $3::jsonb ELSE item END
                        ORDER BY position
                    )
                    FROM jsonb_array_elements(events) WITH ORDINALITY AS listed(item, position)
                )
                ELSE events || jsonb_build_array($3::jsonb)
            END
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(&old)
        .bind(&new)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Self::require_row(id, result)
    }

    async fn set_name(&self, id: &ActorId, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE actors SET name = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Self::require_row(id, result)
    }

    async fn set_timezone(&self, id: &ActorId, timezone: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE actors SET timezone = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(timezone)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Self::require_row(id, result)
    }

    async fn set_consent(&self, id: &ActorId, consent: ConsentState) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE actors SET consent = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(consent_to_str(consent))
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Self::require_row(id, result)
    }

    async fn set_stats(&self, id: &ActorId, stats: &UsageStats) -> Result<(), StoreError> {
        let value = serde_json::to_value(stats).map_err(serialization)?;
        self.set_json(id, "stats", value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_store::TimeBucket;
    use chrono::TimeZone;

    fn actor() -> Actor {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let mut actor = Actor::new(ActorId::new("15550001111"), now);
        actor.name = Some("Sam".to_string());
        actor.timezone = Some("Europe/Paris".to_string());
        actor.consent = ConsentState::Granted;
        actor.conversation.push(LogEntry::user("hello", now));
        actor.events.push(EventKey::new(
            TimeBucket::from_seconds(1_709_542_800),
            chime_core::EventId::new("e1"),
        ));
        actor.recent_message_ids.push(MessageId::new("wamid.1"));
        actor.stats.record_message(now);
        actor.lock = LockState {
            locked: true,
            locked_at: Some(now),
        };
        actor
    }

    #[test]
    fn row_conversion_preserves_actor() {
        let actor = actor();
        let row = ActorRow::from_actor(&actor).unwrap();
        assert_eq!(row.consent, "granted");
        assert_eq!(row.try_into_actor().unwrap(), actor);
    }

    #[test]
    fn unknown_consent_is_a_serialization_error() {
        let mut row = ActorRow::from_actor(&actor()).unwrap();
        row.consent = "maybe".to_string();
        assert!(matches!(
            row.try_into_actor(),
            Err(StoreError::Serialization { .. })
        ));
    }

    #[test]
    fn consent_strings_match_column_default() {
        for state in [
            ConsentState::Pending,
            ConsentState::Granted,
            ConsentState::Declined,
        ] {
            assert_eq!(consent_from_str(consent_to_str(state)).unwrap(), state);
        }
        assert_eq!(consent_to_str(ConsentState::default()), "pending");
    }
}
