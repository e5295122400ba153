use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::session::MeetingRoom;

/// What the meeting service needs to open a room for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingRequest {
    pub session_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// The absolute start, for services that want an instant.
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub tutor_name: String,
}

/// Opens video rooms for scheduled sessions.
#[async_trait]
pub trait MeetingService: Send + Sync {
    async fn create_meeting_for_session(&self, request: &MeetingRequest) -> Result<MeetingRoom>;
}

#[derive(Serialize)]
struct CreateMeetingBody<'a> {
    topic: String,
    start_time: DateTime<Utc>,
    duration: i32,
    external_id: &'a Uuid,
}

#[derive(Deserialize)]
struct CreateMeetingResponse {
    id: String,
    join_url: String,
    start_url: String,
    #[serde(default)]
    password: Option<String>,
}

/// JSON client for the meeting-room service.
#[derive(Clone)]
pub struct HttpMeetingService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMeetingService {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build meeting client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MeetingService for HttpMeetingService {
    async fn create_meeting_for_session(&self, request: &MeetingRequest) -> Result<MeetingRoom> {
        let body = CreateMeetingBody {
            topic: format!("Tutoring session with {}", request.tutor_name),
            start_time: request.starts_at,
            duration: request.duration_minutes,
            external_id: &request.session_id,
        };

        let response = self
            .client
            .post(format!("{}/meetings", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Integration(format!("Meeting service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Integration(format!(
                "Meeting service returned {}",
                response.status()
            )));
        }

        let created: CreateMeetingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Integration(format!("Invalid meeting response: {}", e)))?;

        Ok(MeetingRoom {
            meeting_id: created.id,
            join_url: created.join_url,
            start_url: created.start_url,
            passcode: created.password,
        })
    }
}

/// Used when no meeting service is configured; sessions stay without a room.
pub struct DisabledMeetingService;

#[async_trait]
impl MeetingService for DisabledMeetingService {
    async fn create_meeting_for_session(&self, request: &MeetingRequest) -> Result<MeetingRoom> {
        Err(AppError::Integration(format!(
            "No meeting service configured for session {}",
            request.session_id
        )))
    }
}
