//! Google Calendar data-plane client.
//!
//! Single-attempt HTTP calls with classification into [`UpstreamError`];
//! retrying is the caller's concern (services route these through the
//! retry executor).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

use calbridge_common::UpstreamError;
use calbridge_core::ports::{
    CalendarApi, EventsQuery, UpstreamChange, UpstreamEvent, UpstreamEventWrite, UpstreamPage,
    WatchResult,
};
use calbridge_domain::constants::UPSTREAM_CALL_TIMEOUT_SECS;

use super::mapping;
use super::types::{
    GoogleAttendee, GoogleEvent, GoogleEventDateTime, GoogleEventPayload, GoogleEventsResponse,
    GoogleStopRequest, GoogleWatchRequest, GoogleWatchResponse,
};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const PRIMARY_CALENDAR: &str = "primary";

pub struct GoogleCalendarClient {
    http: Client,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new() -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_CALL_TIMEOUT_SECS))
            .build()
            .map_err(|e| UpstreamError::Other(format!("http client build failed: {e}")))?;

        Ok(Self { http, api_base: DEFAULT_API_BASE.to_string() })
    }

    /// Point the client at a different API base (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.api_base, PRIMARY_CALENDAR)
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    #[instrument(skip(self, access_token, query))]
    async fn list_events(
        &self,
        access_token: &str,
        query: &EventsQuery,
    ) -> Result<UpstreamPage, UpstreamError> {
        let mut params: Vec<(&str, String)> =
            vec![("maxResults", query.max_results.to_string()), ("singleEvents", "true".into())];

        if let Some(sync_token) = &query.sync_token {
            params.push(("syncToken", sync_token.clone()));
        } else {
            // orderBy is only valid without a sync token.
            params.push(("orderBy", "startTime".into()));
            if let Some(time_min) = query.time_min {
                params.push(("timeMin", rfc3339(time_min)));
            }
            if let Some(time_max) = query.time_max {
                params.push(("timeMax", rfc3339(time_max)));
            }
        }

        if let Some(page_token) = &query.page_token {
            params.push(("pageToken", page_token.clone()));
        }

        let response = self
            .http
            .get(self.events_url())
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let body: GoogleEventsResponse = parse_success(response).await?;

        let changes: Vec<UpstreamChange> =
            body.items.into_iter().filter_map(mapping::to_change).collect();

        debug!(
            changes = changes.len(),
            has_next_page = body.next_page_token.is_some(),
            has_sync_token = body.next_sync_token.is_some(),
            "listed upstream events"
        );

        Ok(UpstreamPage {
            changes,
            next_page_token: body.next_page_token,
            next_sync_token: body.next_sync_token,
        })
    }

    #[instrument(skip(self, access_token, payload))]
    async fn insert_event(
        &self,
        access_token: &str,
        payload: &UpstreamEventWrite,
    ) -> Result<UpstreamEvent, UpstreamError> {
        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(access_token)
            .json(&to_payload(payload))
            .send()
            .await
            .map_err(transport_error)?;

        let event: GoogleEvent = parse_success(response).await?;
        require_upserted(event)
    }

    #[instrument(skip(self, access_token, payload))]
    async fn update_event(
        &self,
        access_token: &str,
        event_id: &str,
        payload: &UpstreamEventWrite,
    ) -> Result<UpstreamEvent, UpstreamError> {
        // The upstream expects a complete representation on update.
        let response = self
            .http
            .put(format!("{}/{}", self.events_url(), event_id))
            .bearer_auth(access_token)
            .json(&to_payload(payload))
            .send()
            .await
            .map_err(transport_error)?;

        let event: GoogleEvent = parse_success(response).await?;
        require_upserted(event)
    }

    #[instrument(skip(self, access_token))]
    async fn delete_event(
        &self,
        access_token: &str,
        event_id: &str,
    ) -> Result<(), UpstreamError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.events_url(), event_id))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() || response.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }
        Err(classify_response(response).await)
    }

    #[instrument(skip(self, access_token, channel_token))]
    async fn watch_events(
        &self,
        access_token: &str,
        channel_id: &str,
        channel_token: &str,
        callback_url: &str,
    ) -> Result<WatchResult, UpstreamError> {
        let request = GoogleWatchRequest {
            id: channel_id.to_string(),
            channel_type: "web_hook".to_string(),
            address: callback_url.to_string(),
            token: channel_token.to_string(),
        };

        let response = self
            .http
            .post(format!("{}/watch", self.events_url()))
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let body: GoogleWatchResponse = parse_success(response).await?;

        let expiration = body
            .expiration
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis);

        Ok(WatchResult {
            resource_id: body.resource_id,
            resource_uri: body.resource_uri,
            expiration,
        })
    }

    #[instrument(skip(self, access_token))]
    async fn stop_channel(
        &self,
        access_token: &str,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<(), UpstreamError> {
        let request = GoogleStopRequest {
            id: channel_id.to_string(),
            resource_id: resource_id.to_string(),
        };

        let response = self
            .http
            .post(format!("{}/channels/stop", self.api_base))
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            return Ok(());
        }
        Err(classify_response(response).await)
    }
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn to_payload(write: &UpstreamEventWrite) -> GoogleEventPayload {
    let (start, end) = if write.all_day {
        (
            GoogleEventDateTime {
                date: Some(write.start.format("%Y-%m-%d").to_string()),
                ..GoogleEventDateTime::default()
            },
            GoogleEventDateTime {
                date: Some(write.end.format("%Y-%m-%d").to_string()),
                ..GoogleEventDateTime::default()
            },
        )
    } else {
        (
            GoogleEventDateTime {
                date_time: Some(rfc3339(write.start)),
                time_zone: Some(write.timezone.clone()),
                ..GoogleEventDateTime::default()
            },
            GoogleEventDateTime {
                date_time: Some(rfc3339(write.end)),
                time_zone: Some(write.timezone.clone()),
                ..GoogleEventDateTime::default()
            },
        )
    };

    GoogleEventPayload {
        summary: write.title.clone(),
        description: write.description.clone(),
        location: write.location.clone(),
        start,
        end,
        attendees: write
            .attendees
            .iter()
            .map(|a| GoogleAttendee {
                email: a.email.clone(),
                display_name: a.display_name.clone(),
                optional: a.optional,
                response_status: a.response_status.clone(),
            })
            .collect(),
    }
}

fn require_upserted(event: GoogleEvent) -> Result<UpstreamEvent, UpstreamError> {
    match mapping::to_change(event) {
        Some(UpstreamChange::Upserted(upserted)) => Ok(upserted),
        _ => Err(UpstreamError::Other("upstream returned an unusable event body".to_string())),
    }
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        UpstreamError::from_transport(err.to_string())
    } else {
        UpstreamError::Other(err.to_string())
    }
}

async fn parse_success<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, UpstreamError> {
    if !response.status().is_success() {
        return Err(classify_response(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| UpstreamError::Other(format!("response parse failed: {e}")))
}

async fn classify_response(response: Response) -> UpstreamError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    UpstreamError::from_status(status, retry_after, &body)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> GoogleCalendarClient {
        GoogleCalendarClient::new().unwrap().with_api_base(server.uri())
    }

    fn windowed_query() -> EventsQuery {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        EventsQuery {
            time_min: Some(now),
            time_max: Some(now + chrono::Duration::days(30)),
            max_results: 250,
            ..EventsQuery::default()
        }
    }

    #[tokio::test]
    async fn list_parses_page_and_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "id": "e1",
                        "status": "confirmed",
                        "summary": "Standup",
                        "start": {"dateTime": "2025-06-02T09:00:00Z"},
                        "end": {"dateTime": "2025-06-02T09:15:00Z"},
                        "updated": "2025-06-01T08:00:00Z"
                    },
                    {"id": "e2", "status": "cancelled"}
                ],
                "nextSyncToken": "nst-1"
            })))
            .mount(&server)
            .await;

        let page = client(&server).list_events("tok", &windowed_query()).await.unwrap();

        assert_eq!(page.changes.len(), 2);
        assert!(matches!(page.changes[0], UpstreamChange::Upserted(_)));
        assert!(matches!(page.changes[1], UpstreamChange::Cancelled { .. }));
        assert_eq!(page.next_sync_token.as_deref(), Some("nst-1"));
    }

    #[tokio::test]
    async fn list_sends_sync_token_without_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("syncToken", "nst-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [],
                "nextSyncToken": "nst-2"
            })))
            .mount(&server)
            .await;

        let query = EventsQuery {
            sync_token: Some("nst-1".to_string()),
            max_results: 100,
            ..EventsQuery::default()
        };
        let page = client(&server).list_events("tok", &query).await.unwrap();
        assert_eq!(page.next_sync_token.as_deref(), Some("nst-2"));
    }

    #[tokio::test]
    async fn stale_sync_token_classifies_as_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(410).set_body_string("Sync token is no longer valid"))
            .mount(&server)
            .await;

        let result = client(&server).list_events("tok", &windowed_query()).await;
        assert!(matches!(result, Err(UpstreamError::Gone(_))));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "3")
                    .set_body_string("rateLimitExceeded"),
            )
            .mount(&server)
            .await;

        let result = client(&server).list_events("tok", &windowed_query()).await;
        match result {
            Err(err @ UpstreamError::RateLimited { .. }) => {
                assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
            }
            other => panic!("expected rate-limited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn insert_round_trips_created_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "created-1",
                "status": "confirmed",
                "summary": "Meeting",
                "start": {"dateTime": "2025-06-02T10:00:00Z"},
                "end": {"dateTime": "2025-06-02T11:00:00Z"}
            })))
            .mount(&server)
            .await;

        let start = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let write = UpstreamEventWrite {
            title: "Meeting".to_string(),
            description: None,
            location: None,
            start,
            end: start + chrono::Duration::hours(1),
            all_day: false,
            timezone: "UTC".to_string(),
            attendees: vec![],
        };

        let created = client(&server).insert_event("tok", &write).await.unwrap();
        assert_eq!(created.id, "created-1");
    }

    #[tokio::test]
    async fn delete_classifies_missing_event() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let result = client(&server).delete_event("tok", "ghost").await;
        assert!(matches!(result, Err(UpstreamError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        client(&server).delete_event("tok", "e1").await.unwrap();
    }

    #[tokio::test]
    async fn watch_parses_channel_binding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events/watch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resourceId": "res-9",
                "resourceUri": "https://www.googleapis.com/calendar/v3/calendars/primary/events",
                "expiration": "1750000000000"
            })))
            .mount(&server)
            .await;

        let watch = client(&server)
            .watch_events("tok", "chan-1", "secret", "https://svc.example.com/webhook")
            .await
            .unwrap();

        assert_eq!(watch.resource_id, "res-9");
        assert!(watch.expiration.is_some());
    }
}
