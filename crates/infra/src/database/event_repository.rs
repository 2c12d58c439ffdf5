//! SQLite-backed implementation of the EventStore port.
//!
//! Every query predicates on the owning user id; rows owned by another
//! user are unreachable through this store.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::{debug, instrument, warn};

use calbridge_core::ports::EventStore;
use calbridge_domain::{
    Attendee, Event, EventFilters, EventPage, EventSource, EventStatus, Result,
};

use super::{datetime_from_ts, SqlitePool};
use crate::errors::InfraError;

const EVENT_COLUMNS: &str = "id, user_id, google_event_id, title, description, start_ts, end_ts,
       location, attendees, is_all_day, timezone, status, source,
       created_at, updated_at, last_modified";

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Shared WHERE clause for listing and counting under one filter.
    fn filter_clause(user_id: &str, filters: &EventFilters) -> (String, Vec<Value>) {
        let mut clause = String::from("user_id = ?1");
        let mut params: Vec<Value> = vec![Value::Text(user_id.to_string())];

        if let Some(start) = filters.start_date {
            params.push(Value::Integer(start.timestamp()));
            clause.push_str(&format!(" AND start_ts >= ?{}", params.len()));
        }
        if let Some(end) = filters.end_date {
            params.push(Value::Integer(end.timestamp()));
            clause.push_str(&format!(" AND start_ts <= ?{}", params.len()));
        }
        if let Some(status) = filters.status {
            params.push(Value::Text(status.as_str().to_string()));
            clause.push_str(&format!(" AND status = ?{}", params.len()));
        }
        if let Some(source) = filters.source.as_source() {
            params.push(Value::Text(source.as_str().to_string()));
            clause.push_str(&format!(" AND source = ?{}", params.len()));
        }
        if let Some(search) = filters.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim().to_lowercase());
            params.push(Value::Text(pattern));
            let idx = params.len();
            clause.push_str(&format!(
                " AND (LOWER(title) LIKE ?{idx} OR LOWER(COALESCE(description, '')) LIKE ?{idx})"
            ));
        }

        (clause, params)
    }
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let status_raw: String = row.get(11)?;
    let source_raw: String = row.get(12)?;
    let attendees_raw: Option<String> = row.get(8)?;

    Ok(Event {
        id: row.get(0)?,
        user_id: row.get(1)?,
        google_event_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        start: datetime_from_ts(row.get(5)?),
        end: datetime_from_ts(row.get(6)?),
        location: row.get(7)?,
        attendees: parse_attendees(attendees_raw.as_deref()),
        is_all_day: row.get(9)?,
        timezone: row.get(10)?,
        status: EventStatus::parse(&status_raw).unwrap_or(EventStatus::Confirmed),
        source: EventSource::parse(&source_raw).unwrap_or(EventSource::Manual),
        created_at: datetime_from_ts(row.get(13)?),
        updated_at: datetime_from_ts(row.get(14)?),
        last_modified: datetime_from_ts(row.get(15)?),
    })
}

/// Absent or malformed attendee serializations read as empty.
fn parse_attendees(raw: Option<&str>) -> Vec<Attendee> {
    match raw {
        None | Some("") => Vec::new(),
        Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
            warn!(error = %e, "malformed attendees column, treating as empty");
            Vec::new()
        }),
    }
}

fn serialize_attendees(attendees: &[Attendee]) -> Result<String> {
    serde_json::to_string(attendees).map_err(|e| InfraError::from(e).into())
}

/// Layer invariant: no stored event may end before it starts.
fn check_time_order(event: &Event) -> Result<()> {
    if event.end < event.start {
        return Err(calbridge_domain::CalbridgeError::Validation(format!(
            "event {} ends before it starts",
            event.id
        )));
    }
    Ok(())
}

#[async_trait]
impl EventStore for SqliteEventStore {
    #[instrument(skip(self, filters), fields(user_id))]
    async fn list(&self, user_id: &str, filters: &EventFilters) -> Result<EventPage> {
        let conn = self.pool.get()?;
        let (clause, mut values) = Self::filter_clause(user_id, filters);

        let total: u64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM events WHERE {clause}"),
                params_from_iter(values.iter()),
                |row| row.get::<_, i64>(0),
            )
            .map_err(InfraError::from)? as u64;

        values.push(Value::Integer(i64::from(filters.limit)));
        let limit_idx = values.len();
        values.push(Value::Integer(filters.offset() as i64));
        let offset_idx = values.len();

        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE {clause}
             ORDER BY start_ts ASC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        );

        let mut stmt = conn.prepare(&sql).map_err(InfraError::from)?;
        let events = stmt
            .query_map(params_from_iter(values.iter()), map_event)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<Event>>>()
            .map_err(InfraError::from)?;

        debug!(user_id, total, page = filters.page, returned = events.len(), "listed events");

        Ok(EventPage { events, total, page: filters.page, limit: filters.limit })
    }

    async fn get(&self, user_id: &str, event_id: &str) -> Result<Option<Event>> {
        let conn = self.pool.get()?;
        conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE user_id = ?1 AND id = ?2"),
            params![user_id, event_id],
            map_event,
        )
        .optional()
        .map_err(|e| InfraError::from(e).into())
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn insert(&self, event: &Event) -> Result<()> {
        check_time_order(event)?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO events (id, user_id, google_event_id, title, description,
                                 start_ts, end_ts, location, attendees, is_all_day,
                                 timezone, status, source, created_at, updated_at, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                event.id,
                event.user_id,
                event.google_event_id,
                event.title,
                event.description,
                event.start.timestamp(),
                event.end.timestamp(),
                event.location,
                serialize_attendees(&event.attendees)?,
                event.is_all_day,
                event.timezone,
                event.status.as_str(),
                event.source.as_str(),
                event.created_at.timestamp(),
                event.updated_at.timestamp(),
                event.last_modified.timestamp(),
            ],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn update(&self, event: &Event) -> Result<()> {
        check_time_order(event)?;
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE events
                SET title = ?1, description = ?2, start_ts = ?3, end_ts = ?4,
                    location = ?5, attendees = ?6, is_all_day = ?7, timezone = ?8,
                    status = ?9, updated_at = ?10, last_modified = ?11
              WHERE user_id = ?12 AND id = ?13",
            params![
                event.title,
                event.description,
                event.start.timestamp(),
                event.end.timestamp(),
                event.location,
                serialize_attendees(&event.attendees)?,
                event.is_all_day,
                event.timezone,
                event.status.as_str(),
                event.updated_at.timestamp(),
                event.last_modified.timestamp(),
                event.user_id,
                event.id,
            ],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn delete(&self, user_id: &str, event_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let removed = conn
            .execute(
                "DELETE FROM events WHERE user_id = ?1 AND id = ?2",
                params![user_id, event_id],
            )
            .map_err(InfraError::from)?;
        Ok(removed > 0)
    }

    async fn find_by_google_id(
        &self,
        user_id: &str,
        google_event_id: &str,
    ) -> Result<Option<Event>> {
        let conn = self.pool.get()?;
        conn.query_row(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events
                  WHERE user_id = ?1 AND google_event_id = ?2"
            ),
            params![user_id, google_event_id],
            map_event,
        )
        .optional()
        .map_err(|e| InfraError::from(e).into())
    }

    #[instrument(skip(self, event), fields(google_event_id = ?event.google_event_id))]
    async fn upsert_by_google_id(&self, event: &Event) -> Result<String> {
        check_time_order(event)?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO events (id, user_id, google_event_id, title, description,
                                 start_ts, end_ts, location, attendees, is_all_day,
                                 timezone, status, source, created_at, updated_at, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(user_id, google_event_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                start_ts = excluded.start_ts,
                end_ts = excluded.end_ts,
                location = excluded.location,
                attendees = excluded.attendees,
                is_all_day = excluded.is_all_day,
                timezone = excluded.timezone,
                status = excluded.status,
                updated_at = excluded.updated_at,
                last_modified = excluded.last_modified",
            params![
                event.id,
                event.user_id,
                event.google_event_id,
                event.title,
                event.description,
                event.start.timestamp(),
                event.end.timestamp(),
                event.location,
                serialize_attendees(&event.attendees)?,
                event.is_all_day,
                event.timezone,
                event.status.as_str(),
                event.source.as_str(),
                event.created_at.timestamp(),
                event.updated_at.timestamp(),
                event.last_modified.timestamp(),
            ],
        )
        .map_err(InfraError::from)?;

        let google_event_id = event.google_event_id.as_deref().unwrap_or_default();
        let local_id: String = conn
            .query_row(
                "SELECT id FROM events WHERE user_id = ?1 AND google_event_id = ?2",
                params![event.user_id, google_event_id],
                |row| row.get(0),
            )
            .map_err(InfraError::from)?;

        Ok(local_id)
    }

    async fn delete_by_google_id(&self, user_id: &str, google_event_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let removed = conn
            .execute(
                "DELETE FROM events WHERE user_id = ?1 AND google_event_id = ?2",
                params![user_id, google_event_id],
            )
            .map_err(InfraError::from)?;
        Ok(removed > 0)
    }
}
