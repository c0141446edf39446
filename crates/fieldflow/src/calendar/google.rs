use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{
    CalendarEvent, CalendarGateway, EventPatch, GatewayError, NewCalendarEvent, EVENT_REMINDERS,
};
use crate::config::CalendarSettings;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://www.googleapis.com/calendar/v3/";

/// Access tokens are refreshed this long before Google says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    refresh_token: String,
    access_token: String,
    expires_at: Instant,
}

/// Google Calendar v3 over HTTPS.
pub struct GoogleCalendar {
    http: Client,
    settings: CalendarSettings,
    api_base: Url,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Serialize)]
struct ReminderOverride {
    method: &'static str,
    minutes: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Reminders {
    use_default: bool,
    overrides: Vec<ReminderOverride>,
}

#[derive(Serialize, Default)]
struct EventBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reminders: Option<Reminders>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResource {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    start: Option<EventTime>,
    #[serde(default)]
    end: Option<EventTime>,
    #[serde(default)]
    html_link: Option<String>,
}

#[derive(Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<EventResource>,
}

impl From<EventResource> for CalendarEvent {
    fn from(r: EventResource) -> Self {
        CalendarEvent {
            id: r.id,
            title: r.summary.unwrap_or_default(),
            description: r.description,
            location: r.location,
            start: r.start.and_then(|t| t.date_time),
            end: r.end.and_then(|t| t.date_time),
            html_link: r.html_link,
        }
    }
}

fn map_send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Http(e.to_string())
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl GoogleCalendar {
    pub fn new(settings: CalendarSettings) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        let api_base = Url::parse(API_BASE).map_err(|e| GatewayError::Http(e.to_string()))?;

        Ok(Self {
            http,
            settings,
            api_base,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self, refresh_token: &str) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref() {
            if t.refresh_token == refresh_token && Instant::now() + EXPIRY_MARGIN < t.expires_at {
                return Ok(t.access_token.clone());
            }
        }

        let resp = self
            .http
            .post(TOKEN_URL)
            .json(&TokenRequest {
                client_id: &self.settings.client_id,
                client_secret: &self.settings.client_secret,
                refresh_token,
                grant_type: "refresh_token",
            })
            .send()
            .await
            .map_err(map_send_error)?;

        let status = resp.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            *cached = None;
            return Err(GatewayError::Unauthorized(body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        tracing::debug!(expires_in = token.expires_in, "calendar access token refreshed");
        *cached = Some(CachedToken {
            refresh_token: refresh_token.to_string(),
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }

    fn events_url(&self, event_id: Option<&str>) -> Result<Url, GatewayError> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GatewayError::Http("calendar api base cannot be a base".into()))?;
            segments
                .pop_if_empty()
                .extend(["calendars", self.settings.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn event_time(&self, at: DateTime<Utc>) -> EventTime {
        EventTime {
            date_time: Some(at),
            time_zone: Some(self.settings.time_zone.clone()),
        }
    }

    async fn send(
        &self,
        refresh_token: &str,
        method: Method,
        url: Url,
        body: Option<&EventBody>,
    ) -> Result<reqwest::Response, GatewayError> {
        let access_token = self.access_token(refresh_token).await?;

        let mut req = self.http.request(method, url).bearer_auth(access_token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(map_send_error)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED => {
                *self.token.lock().await = None;
                GatewayError::Unauthorized(body)
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => GatewayError::NotFound,
            _ => GatewayError::Remote {
                status: status.as_u16(),
                body,
            },
        })
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendar {
    async fn create_event(
        &self,
        refresh_token: &str,
        event: &NewCalendarEvent,
    ) -> Result<CalendarEvent, GatewayError> {
        let body = EventBody {
            summary: Some(event.title.clone()),
            description: Some(event.description.clone()),
            location: event.location.clone(),
            start: Some(self.event_time(event.start)),
            end: Some(self.event_time(event.end)),
            reminders: Some(Reminders {
                use_default: false,
                overrides: EVENT_REMINDERS
                    .iter()
                    .map(|r| ReminderOverride {
                        method: r.method,
                        minutes: r.minutes,
                    })
                    .collect(),
            }),
        };

        let resp = self
            .send(refresh_token, Method::POST, self.events_url(None)?, Some(&body))
            .await?;
        let created: EventResource = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(created.into())
    }

    async fn update_event(
        &self,
        refresh_token: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, GatewayError> {
        let body = EventBody {
            summary: patch.title.clone(),
            description: patch.description.clone(),
            location: patch.location.clone(),
            start: patch.start.map(|t| self.event_time(t)),
            end: patch.end.map(|t| self.event_time(t)),
            reminders: None,
        };

        let resp = self
            .send(
                refresh_token,
                Method::PATCH,
                self.events_url(Some(event_id))?,
                Some(&body),
            )
            .await?;
        let updated: EventResource = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(updated.into())
    }

    async fn delete_event(&self, refresh_token: &str, event_id: &str) -> Result<(), GatewayError> {
        self.send(
            refresh_token,
            Method::DELETE,
            self.events_url(Some(event_id))?,
            None,
        )
        .await?;
        Ok(())
    }

    async fn list_events_for_day(
        &self,
        refresh_token: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        let mut url = self.events_url(None)?;
        url.query_pairs_mut()
            .append_pair("timeMin", &rfc3339(day_start))
            .append_pair("timeMax", &rfc3339(day_end))
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");

        let resp = self.send(refresh_token, Method::GET, url, None).await?;
        let list: EventList = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(list.items.into_iter().map(CalendarEvent::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CalendarSettings {
        CalendarSettings {
            client_id: "id".into(),
            client_secret: "secret".into(),
            calendar_id: "office@example.com".into(),
            time_zone: "Australia/Perth".into(),
            timeout_ms: 1000,
        }
    }

    #[test]
    fn event_urls_escape_the_calendar_id() {
        let cal = GoogleCalendar::new(settings()).unwrap();
        assert_eq!(
            cal.events_url(None).unwrap().as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/office@example.com/events"
        );
        assert_eq!(
            cal.events_url(Some("abc 1")).unwrap().as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/office@example.com/events/abc%201"
        );
    }

    #[test]
    fn event_resource_without_times_still_decodes() {
        let raw = serde_json::json!({
            "id": "evt1",
            "summary": "JOB-2025-0001 pool",
            "start": { "dateTime": "2025-03-04T01:00:00Z" },
            "end": { "date": "2025-03-04" },
            "htmlLink": "https://calendar.example/evt1"
        });
        let resource: EventResource = serde_json::from_value(raw).unwrap();
        let event = CalendarEvent::from(resource);
        assert_eq!(event.id, "evt1");
        assert_eq!(event.title, "JOB-2025-0001 pool");
        assert!(event.start.is_some());
        assert!(event.end.is_none());
    }
}
