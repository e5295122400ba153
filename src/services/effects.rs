use std::sync::Arc;

use chrono::FixedOffset;

use crate::error::{AppError, Result};
use crate::integrations::accounts::AccountDirectory;
use crate::integrations::email::Mailer;
use crate::integrations::meetings::{MeetingRequest, MeetingService};
use crate::integrations::notifications::Notifier;
use crate::models::session::to_utc;
use crate::scheduling::effects::SideEffect;
use crate::store::BookingStore;

/// How post-commit effects are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// On a spawned task; the caller's response never waits on collaborators.
    Detached,
    /// In the caller's task, before it returns.
    Inline,
}

/// Carries out side-effect intents after their transition has committed.
///
/// Every failure is logged and swallowed.
#[derive(Clone)]
pub struct EffectDispatcher {
    store: Arc<dyn BookingStore>,
    directory: Arc<dyn AccountDirectory>,
    meetings: Arc<dyn MeetingService>,
    notifier: Arc<dyn Notifier>,
    mailer: Arc<dyn Mailer>,
    offset: FixedOffset,
    mode: DispatchMode,
}

impl EffectDispatcher {
    pub fn new(
        store: Arc<dyn BookingStore>,
        directory: Arc<dyn AccountDirectory>,
        meetings: Arc<dyn MeetingService>,
        notifier: Arc<dyn Notifier>,
        mailer: Arc<dyn Mailer>,
        offset: FixedOffset,
        mode: DispatchMode,
    ) -> Self {
        Self {
            store,
            directory,
            meetings,
            notifier,
            mailer,
            offset,
            mode,
        }
    }

    pub async fn dispatch(&self, effects: Vec<SideEffect>) {
        if effects.is_empty() {
            return;
        }

        match self.mode {
            DispatchMode::Inline => self.run_all(effects).await,
            DispatchMode::Detached => {
                let this = self.clone();
                tokio::spawn(async move { this.run_all(effects).await });
            }
        }
    }

    async fn run_all(&self, effects: Vec<SideEffect>) {
        for effect in &effects {
            if let Err(e) = self.run(effect).await {
                tracing::warn!(
                    effect = label(effect),
                    session = ?session_of(effect),
                    error = %e,
                    "side effect failed; primary operation stands"
                );
            }
        }
    }

    async fn run(&self, effect: &SideEffect) -> Result<()> {
        match effect {
            SideEffect::CreateMeeting {
                session_id,
                tutor_id,
                date,
                start_time,
                duration_minutes,
            } => {
                let tutor = self
                    .directory
                    .find_tutor(*tutor_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Tutor".to_string()))?;

                let request = MeetingRequest {
                    session_id: *session_id,
                    date: *date,
                    start_time: *start_time,
                    starts_at: to_utc(date.and_time(*start_time), &self.offset),
                    duration_minutes: *duration_minutes,
                    tutor_name: tutor.display_name,
                };

                let room = self.meetings.create_meeting_for_session(&request).await?;
                self.store.attach_meeting(*session_id, &room).await?;
                tracing::info!(session = %session_id, meeting = %room.meeting_id, "meeting room attached");
                Ok(())
            }
            SideEffect::Notify {
                account_id,
                title,
                body,
                kind,
            } => self.notifier.notify(*account_id, title, body, *kind).await,
            SideEffect::Email {
                account_id,
                session_id,
                template,
            } => self.mailer.send(*account_id, *session_id, template).await,
        }
    }
}

fn label(effect: &SideEffect) -> &'static str {
    match effect {
        SideEffect::CreateMeeting { .. } => "create_meeting",
        SideEffect::Notify { .. } => "notify",
        SideEffect::Email { .. } => "email",
    }
}

fn session_of(effect: &SideEffect) -> Option<uuid::Uuid> {
    match effect {
        SideEffect::CreateMeeting { session_id, .. } | SideEffect::Email { session_id, .. } => Some(*session_id),
        SideEffect::Notify { .. } => None,
    }
}
