//! Coercion from the upstream wire format into sanitized engine shapes.
//!
//! All timestamp parsing and attendee validation happens here; the rest
//! of the engine only sees resolved [`UpstreamChange`] values.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use calbridge_core::ports::{UpstreamChange, UpstreamEvent};
use calbridge_domain::Attendee;

use super::types::{GoogleAttendee, GoogleEvent, GoogleEventDateTime};

/// Map one wire event into a change entry. Events whose schedulable
/// fields cannot be resolved are dropped with a warning; the provider
/// copy stays canonical and a later sync retries them.
pub fn to_change(raw: GoogleEvent) -> Option<UpstreamChange> {
    if raw.status.as_deref() == Some("cancelled") {
        return Some(UpstreamChange::Cancelled { id: raw.id });
    }

    let start_field = raw.start.as_ref()?;
    let end_field = raw.end.as_ref()?;

    let (start, all_day) = match parse_event_datetime(start_field) {
        Some(parsed) => parsed,
        None => {
            warn!(event_id = %raw.id, "unparseable start field, skipping event");
            return None;
        }
    };
    let (end, _) = match parse_event_datetime(end_field) {
        Some(parsed) => parsed,
        None => {
            warn!(event_id = %raw.id, "unparseable end field, skipping event");
            return None;
        }
    };

    let timezone =
        start_field.time_zone.clone().unwrap_or_else(|| "UTC".to_string());

    let attendees = raw
        .attendees
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| to_attendee(a, &raw.id))
        .collect();

    Some(UpstreamChange::Upserted(UpstreamEvent {
        id: raw.id,
        title: raw
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Untitled Event".to_string()),
        description: raw.description,
        location: raw.location,
        start,
        end,
        all_day,
        timezone,
        attendees,
        tentative: raw.status.as_deref() == Some("tentative"),
        updated: raw.updated.as_deref().and_then(parse_rfc3339),
    }))
}

fn to_attendee(raw: GoogleAttendee, event_id: &str) -> Option<Attendee> {
    let email = raw.email.trim().to_string();
    if email.is_empty() {
        warn!(event_id, "empty attendee email, dropping entry");
        return None;
    }

    Some(Attendee {
        email,
        display_name: raw.display_name,
        optional: raw.optional,
        response_status: raw.response_status,
    })
}

/// `dateTime` carries a full instant; a bare `date` marks an all-day
/// event anchored at midnight UTC.
fn parse_event_datetime(field: &GoogleEventDateTime) -> Option<(DateTime<Utc>, bool)> {
    if let Some(instant) = field.date_time.as_deref() {
        return parse_rfc3339(instant).map(|dt| (dt, false));
    }

    let date = NaiveDate::parse_from_str(field.date.as_deref()?, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some((midnight.and_utc(), true))
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.with_timezone(&Utc))
}
