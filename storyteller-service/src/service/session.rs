//! Per-session state and its transitions.
//!
//! A [`Session`] owns one [`SessionState`]. Every mutation goes through a
//! method here; the generation pipeline in `pipeline.rs` only talks to the
//! state through [`Session::checkpoint`] and the commit helpers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::prompts::{StoryDuration, Tone};
use super::story::StoryResult;

/// User preferences for one generation, snapshotted when it starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizationInput {
    pub idea: String,
    pub tone: Tone,
    pub duration: StoryDuration,
    pub illustrate: bool,
}

impl Default for PersonalizationInput {
    fn default() -> Self {
        Self {
            idea: String::new(),
            tone: Tone::default(),
            duration: StoryDuration::default(),
            illustrate: true,
        }
    }
}

/// How the most recent attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Failed,
    Interrupted,
}

/// Transient messages raised during an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    PersonalizationDiscarded,
    Interrupted,
    Completed,
}

/// Illustration slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Illustration {
    #[default]
    None,
    Ready(Bytes),
    /// Generation failed; carries the failure detail
    Unavailable(String),
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub busy: bool,
    pub stop_requested: bool,
    pub confirm_stop_pending: bool,
    pub last_story: Option<StoryResult>,
    pub personalization: PersonalizationInput,
    pub illustration: Illustration,
    pub outcome: Option<Outcome>,
    pub notices: Vec<Notice>,
    /// Detail of the last failed attempt
    pub failure: Option<String>,
    pub attempts: u64,
}

/// Result of a generation trigger
#[derive(Debug)]
pub enum StartOutcome {
    Started(CancellationToken),
    /// A generation is already in flight; nothing was started
    Busy,
}

/// Returned by a checkpoint that observed a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

struct Inner {
    state: SessionState,
    token: Option<CancellationToken>,
    last_seen: Instant,
}

/// One user's session
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            inner: Mutex::new(Inner {
                state: SessionState::default(),
                token: None,
                last_seen: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// PNG bytes of the current illustration, if one is ready
    pub fn illustration_png(&self) -> Option<Bytes> {
        match &self.lock().state.illustration {
            Illustration::Ready(png) => Some(png.clone()),
            _ => None,
        }
    }

    pub fn touch(&self) {
        self.lock().last_seen = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.lock().last_seen.elapsed()
    }

    /// Idle → Busy. Has no effect while a generation is in flight.
    pub fn start_generation(&self, input: PersonalizationInput) -> StartOutcome {
        let mut inner = self.lock();
        if inner.state.busy {
            debug!(session_id = %self.id, "Generation already in flight, trigger ignored");
            return StartOutcome::Busy;
        }

        let token = CancellationToken::new();
        let state = &mut inner.state;
        state.busy = true;
        state.stop_requested = false;
        state.confirm_stop_pending = false;
        state.personalization = input;
        state.illustration = Illustration::None;
        state.outcome = None;
        state.notices.clear();
        state.failure = None;
        state.attempts += 1;
        info!(session_id = %self.id, attempt = state.attempts, "Generation started");

        inner.token = Some(token.clone());
        StartOutcome::Started(token)
    }

    /// Keep a rejected form input so the page can show it again. Ignored while busy.
    pub fn keep_draft(&self, input: PersonalizationInput) {
        let mut inner = self.lock();
        if !inner.state.busy {
            inner.state.personalization = input;
        }
    }

    /// Show the stop confirmation. Cancels nothing by itself.
    pub fn request_stop(&self) -> bool {
        let mut inner = self.lock();
        if !inner.state.busy {
            return false;
        }
        inner.state.confirm_stop_pending = true;
        true
    }

    /// Confirm a pending stop. The pipeline notices at its next checkpoint.
    pub fn confirm_stop(&self) -> bool {
        let mut inner = self.lock();
        if !inner.state.busy || !inner.state.confirm_stop_pending {
            return false;
        }
        inner.state.confirm_stop_pending = false;
        inner.state.stop_requested = true;
        if let Some(token) = &inner.token {
            token.cancel();
        }
        info!(session_id = %self.id, "Stop confirmed");
        true
    }

    /// Dismiss the stop confirmation and keep generating.
    pub fn deny_stop(&self) {
        self.lock().state.confirm_stop_pending = false;
    }

    /// Cancel any in-flight attempt without user confirmation (session teardown).
    pub fn cancel(&self) {
        if let Some(token) = &self.lock().token {
            token.cancel();
        }
    }

    /// Cooperative cancellation point.
    ///
    /// A stop observed here ends the attempt: Busy → Idle, the stop flag is
    /// consumed and an interrupted notice is raised.
    pub fn checkpoint(&self, token: &CancellationToken) -> Result<(), Interrupted> {
        if !token.is_cancelled() {
            return Ok(());
        }

        let mut inner = self.lock();
        let state = &mut inner.state;
        state.busy = false;
        state.stop_requested = false;
        state.confirm_stop_pending = false;
        state.outcome = Some(Outcome::Interrupted);
        state.notices.push(Notice::Interrupted);
        inner.token = None;
        info!(session_id = %self.id, "Generation interrupted");
        Err(Interrupted)
    }

    pub(crate) fn personalization(&self) -> PersonalizationInput {
        self.lock().state.personalization.clone()
    }

    pub(crate) fn push_notice(&self, notice: Notice) {
        self.lock().state.notices.push(notice);
    }

    /// Replace the previous story with a new one.
    pub(crate) fn commit_story(&self, story: StoryResult) {
        self.lock().state.last_story = Some(story);
    }

    pub(crate) fn set_illustration(&self, illustration: Illustration) {
        self.lock().state.illustration = illustration;
    }

    /// Busy → Idle with the story committed.
    ///
    /// A stop confirmed after the last checkpoint still counts: the attempt
    /// ends Interrupted, keeping whatever was already committed.
    pub(crate) fn complete(&self) {
        let mut inner = self.lock();
        let stopped = inner.token.as_ref().is_some_and(CancellationToken::is_cancelled);
        let state = &mut inner.state;
        state.busy = false;
        state.stop_requested = false;
        state.confirm_stop_pending = false;
        if stopped {
            state.outcome = Some(Outcome::Interrupted);
            state.notices.push(Notice::Interrupted);
            info!(session_id = %self.id, "Generation interrupted after its last step");
        } else {
            state.outcome = Some(Outcome::Completed);
            state.notices.push(Notice::Completed);
            info!(session_id = %self.id, "Generation completed");
        }
        inner.token = None;
    }

    /// Busy → Idle without a story. The previous story, if any, stays.
    pub(crate) fn fail(&self, detail: String) {
        let mut inner = self.lock();
        let state = &mut inner.state;
        state.busy = false;
        state.stop_requested = false;
        state.confirm_stop_pending = false;
        state.outcome = Some(Outcome::Failed);
        state.failure = Some(detail);
        inner.token = None;
        info!(session_id = %self.id, "Generation failed");
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
