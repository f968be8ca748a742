//! Render-ready projection of a session.
//!
//! Nothing here decides anything: [`SessionView::project`] maps the current
//! [`SessionState`] to labels, flags and content for whatever surface draws it.

use serde::Serialize;
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::i18n::I18n;
use crate::service::prompts::{StoryDuration, Tone};
use crate::service::session::{
    Illustration, Notice, Outcome, PersonalizationInput, SessionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryAction {
    Generate,
    Interrupt,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionView {
    pub kind: PrimaryAction,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmStopView {
    pub message: String,
    pub confirm_label: String,
    pub deny_label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionView {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Personalization form, prefilled with the last submitted input
#[derive(Debug, Clone, Serialize)]
pub struct FormView {
    /// Shown expanded only when the input differs from the defaults
    pub expanded: bool,
    pub personalize_label: String,
    pub idea_label: String,
    pub idea_placeholder: String,
    pub idea: String,
    pub tone_label: String,
    pub tones: Vec<OptionView>,
    pub duration_label: String,
    pub durations: Vec<OptionView>,
    pub illustrate_label: String,
    pub illustrate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryCardView {
    pub title: String,
    pub body: Vec<String>,
    pub moral: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyView {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IllustrationView {
    None,
    Image { url: String },
    Warning { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct NoticeView {
    pub kind: Notice,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub app_title: String,
    pub version_label: String,
    pub busy: bool,
    pub controls_disabled: bool,
    pub primary_action: ActionView,
    /// Progress indicator while busy
    pub progress: Option<String>,
    pub confirm_stop: Option<ConfirmStopView>,
    pub form: FormView,
    pub story: Option<StoryCardView>,
    pub copy: Option<CopyView>,
    pub illustration: IllustrationView,
    pub notices: Vec<NoticeView>,
    pub outcome: Option<Outcome>,
    pub error: Option<String>,
    /// Technical detail behind `error`
    pub error_detail: Option<String>,
    pub new_session_label: String,
}

impl SessionView {
    pub fn project(session_id: Uuid, state: &SessionState, i18n: &I18n, locale: &str) -> Self {
        let t = |key: &str| i18n.get(locale, key, None);

        let primary_action = if state.busy {
            ActionView {
                kind: PrimaryAction::Interrupt,
                label: t("action-interrupt"),
            }
        } else {
            ActionView {
                kind: PrimaryAction::Generate,
                label: t("action-generate"),
            }
        };

        let confirm_stop = (state.busy && state.confirm_stop_pending).then(|| ConfirmStopView {
            message: t("confirm-stop-message"),
            confirm_label: t("confirm-stop-yes"),
            deny_label: t("confirm-stop-no"),
        });

        let input = &state.personalization;
        let form = FormView {
            expanded: *input != PersonalizationInput::default(),
            personalize_label: t("form-personalize"),
            idea_label: t("field-idea"),
            idea_placeholder: t("field-idea-placeholder"),
            idea: input.idea.clone(),
            tone_label: t("field-tone"),
            tones: Tone::iter()
                .map(|tone| OptionView {
                    value: tone.to_string(),
                    label: t(tone.label_key()),
                    selected: tone == input.tone,
                })
                .collect(),
            duration_label: t("field-duration"),
            durations: StoryDuration::iter()
                .map(|duration| OptionView {
                    value: duration.to_string(),
                    label: t(duration.label_key()),
                    selected: duration == input.duration,
                })
                .collect(),
            illustrate_label: t("field-illustrate"),
            illustrate: input.illustrate,
        };

        let story = state.last_story.as_ref().map(|story| StoryCardView {
            title: story.title.clone(),
            body: story.body_lines.clone(),
            moral: story.moral_line.clone(),
        });

        let copy = state.last_story.as_ref().map(|story| CopyView {
            label: t("action-copy"),
            text: story.raw_text.clone(),
        });

        let illustration = match &state.illustration {
            Illustration::None => IllustrationView::None,
            Illustration::Ready(_) => IllustrationView::Image {
                url: format!(
                    "/api/sessions/{}/illustration?attempt={}",
                    session_id, state.attempts
                ),
            },
            Illustration::Unavailable(detail) => IllustrationView::Warning {
                message: i18n.format(locale, "illustration-unavailable", &[("reason", detail)]),
            },
        };

        let notices = state
            .notices
            .iter()
            .map(|notice| NoticeView {
                kind: *notice,
                message: t(notice_key(*notice)),
            })
            .collect();

        let progress = match (state.busy, state.stop_requested) {
            (false, _) => None,
            (true, false) => Some(t("status-generating")),
            (true, true) => Some(t("status-stopping")),
        };

        let failed = state.outcome == Some(Outcome::Failed);
        let error = failed.then(|| t("error-story-empty"));
        let error_detail = if failed { state.failure.clone() } else { None };

        Self {
            session_id,
            app_title: t("app-title"),
            version_label: i18n.format(
                locale,
                "app-version",
                &[("version", env!("CARGO_PKG_VERSION"))],
            ),
            busy: state.busy,
            controls_disabled: state.busy,
            primary_action,
            progress,
            confirm_stop,
            form,
            story,
            copy,
            illustration,
            notices,
            outcome: state.outcome,
            error,
            error_detail,
            new_session_label: t("action-new-session"),
        }
    }
}

fn notice_key(notice: Notice) -> &'static str {
    match notice {
        Notice::PersonalizationDiscarded => "notice-personalization-discarded",
        Notice::Interrupted => "notice-interrupted",
        Notice::Completed => "notice-completed",
    }
}
