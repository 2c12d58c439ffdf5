//! Event entity, filters, and write shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::errors::{CalbridgeError, Result};

/// Event lifecycle status mirroring the upstream enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "confirmed" => Ok(Self::Confirmed),
            "tentative" => Ok(Self::Tentative),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CalbridgeError::Validation(format!("unknown event status: {other}"))),
        }
    }
}

/// Where a local replica row originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Google,
    Manual,
    Imported,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Manual => "manual",
            Self::Imported => "imported",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "google" => Ok(Self::Google),
            "manual" => Ok(Self::Manual),
            "imported" => Ok(Self::Imported),
            other => Err(CalbridgeError::Validation(format!("unknown event source: {other}"))),
        }
    }
}

/// A single attendee on an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

/// A local calendar event replica row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub google_event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub attendees: Vec<Attendee>,
    pub is_all_day: bool,
    pub timezone: String,
    pub status: EventStatus,
    pub source: EventSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// Input shape for creating an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Sparse update shape; `None` fields retain their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<Attendee>>,
    #[serde(default)]
    pub is_all_day: Option<bool>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub status: Option<EventStatus>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.location.is_none()
            && self.attendees.is_none()
            && self.is_all_day.is_none()
            && self.timezone.is_none()
            && self.status.is_none()
    }
}

/// Source filter accepted by the listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    #[default]
    All,
    Google,
    Manual,
    Imported,
}

impl SourceFilter {
    pub fn as_source(&self) -> Option<EventSource> {
        match self {
            Self::All => None,
            Self::Google => Some(EventSource::Google),
            Self::Manual => Some(EventSource::Manual),
            Self::Imported => Some(EventSource::Imported),
        }
    }
}

/// Listing filters; pagination is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilters {
    pub page: u32,
    pub limit: u32,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub source: SourceFilter,
    #[serde(default)]
    pub search: Option<String>,
}

impl Default for EventFilters {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            start_date: None,
            end_date: None,
            status: None,
            source: SourceFilter::All,
            search: None,
        }
    }
}

impl EventFilters {
    /// Clamp pagination into the supported range.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// One page of events plus the filter-wide total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<Event>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl EventPage {
    pub fn has_next(&self) -> bool {
        u64::from(self.page) * u64::from(self.limit) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_normalize_page_and_limit() {
        let filters =
            EventFilters { page: 0, limit: 500, ..EventFilters::default() }.normalized();
        assert_eq!(filters.page, 1);
        assert_eq!(filters.limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn page_past_total_has_no_next() {
        let page = EventPage { events: vec![], total: 10, page: 3, limit: 50 };
        assert!(!page.has_next());
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert!(EventStatus::parse("confirmed").is_ok());
        assert!(EventStatus::parse("sleeping").is_err());
    }
}
