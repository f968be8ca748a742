//! Server-rendered session page.
//!
//! Every form action redirects back to the page (303), which re-renders the
//! session's current view. While a generation runs the page refreshes itself.

use axum::{
    Form,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::{AutoEscape, Environment, context};
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::service::MAX_IDEA_CHARS;
use crate::service::prompts::{StoryDuration, Tone};
use crate::service::session::PersonalizationInput;

use super::AppState;

static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env
});

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{ lang }}">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
{% if view.busy %}<meta http-equiv="refresh" content="2">{% endif %}
<title>{{ view.app_title }}</title>
<style>
body { font-family: system-ui, sans-serif; max-width: 720px; margin: 40px auto; padding: 0 20px; }
label { display: block; margin-top: 12px; font-weight: 500; }
textarea, select { width: 100%; padding: 8px; margin-top: 4px; box-sizing: border-box; }
button { margin-top: 16px; padding: 10px 24px; cursor: pointer; font-size: 1em; }
.notice { background: #eef6ee; padding: 8px 12px; margin-top: 12px; }
.error { background: #fbeaea; padding: 8px 12px; margin-top: 12px; }
.warning { background: #fff6e0; padding: 8px 12px; margin-top: 12px; }
.confirm { border: 1px solid #c00; padding: 12px; margin-top: 12px; }
.confirm form { display: inline; }
.story { margin-top: 24px; }
.moral { font-style: italic; }
.illustration img { max-width: 100%; }
.version { color: #666; font-size: 0.9em; margin-top: -12px; }
</style>
</head>
<body>
<h1>{{ view.app_title }}</h1>
<p class="version">{{ view.version_label }}</p>
<form method="POST" action="/s/{{ view.session_id }}/generate">
<fieldset{% if view.controls_disabled %} disabled{% endif %}>
<details{% if view.form.expanded %} open{% endif %}>
<summary>{{ view.form.personalize_label }}</summary>
<label>{{ view.form.idea_label }}<textarea name="idea" rows="3" maxlength="{{ max_idea_chars }}" placeholder="{{ view.form.idea_placeholder }}">{{ view.form.idea }}</textarea></label>
<label>{{ view.form.tone_label }}<select name="tone">
{% for option in view.form.tones %}<option value="{{ option.value }}"{% if option.selected %} selected{% endif %}>{{ option.label }}</option>
{% endfor %}</select></label>
<label>{{ view.form.duration_label }}<select name="duration">
{% for option in view.form.durations %}<option value="{{ option.value }}"{% if option.selected %} selected{% endif %}>{{ option.label }}</option>
{% endfor %}</select></label>
<label><input type="checkbox" name="illustrate" value="on"{% if view.form.illustrate %} checked{% endif %}> {{ view.form.illustrate_label }}</label>
</details>
{% if view.primary_action.kind == "generate" %}<button type="submit">{{ view.primary_action.label }}</button>{% endif %}
</fieldset>
</form>
{% if view.primary_action.kind == "interrupt" %}
<form method="POST" action="/s/{{ view.session_id }}/stop"><button type="submit">{{ view.primary_action.label }}</button></form>
{% endif %}
{% if view.confirm_stop %}
<div class="confirm">
<p>{{ view.confirm_stop.message }}</p>
<form method="POST" action="/s/{{ view.session_id }}/stop/confirm"><button type="submit">{{ view.confirm_stop.confirm_label }}</button></form>
<form method="POST" action="/s/{{ view.session_id }}/stop/deny"><button type="submit">{{ view.confirm_stop.deny_label }}</button></form>
</div>
{% endif %}
{% if view.progress %}<p class="progress">{{ view.progress }}</p>{% endif %}
{% for notice in view.notices %}<p class="notice">{{ notice.message }}</p>
{% endfor %}
{% if view.error %}<p class="error">{{ view.error }}</p>{% endif %}
{% if view.story %}
<article class="story">
<h2>{{ view.story.title }}</h2>
{% for line in view.story.body %}<p>{{ line }}</p>
{% endfor %}
{% if view.story.moral %}<p class="moral">{{ view.story.moral }}</p>{% endif %}
</article>
{% endif %}
{% if view.illustration.kind == "image" %}
<div class="illustration"><img src="{{ view.illustration.url }}" alt="{{ view.story.title }}"></div>
{% elif view.illustration.kind == "warning" %}
<p class="warning">{{ view.illustration.message }}</p>
{% endif %}
{% if view.copy %}
<textarea id="story-text" hidden>{{ view.copy.text }}</textarea>
<button type="button" onclick="navigator.clipboard.writeText(document.getElementById('story-text').value)">{{ view.copy.label }}</button>
{% endif %}
<form method="POST" action="/s/{{ view.session_id }}/reset"><button type="submit">{{ view.new_session_label }}</button></form>
</body>
</html>
"#;

/// Fields of the personalization form. Unknown tone or duration values fall
/// back to their defaults; an unchecked checkbox is simply absent.
#[derive(Debug, Deserialize)]
pub struct GenerateForm {
    #[serde(default)]
    pub idea: String,
    pub tone: Option<String>,
    pub duration: Option<String>,
    pub illustrate: Option<String>,
}

impl From<GenerateForm> for PersonalizationInput {
    fn from(form: GenerateForm) -> Self {
        Self {
            // Browsers submit textarea line breaks as CRLF but count them as one character
            idea: form.idea.replace("\r\n", "\n"),
            tone: Tone::resolve(form.tone.as_deref()),
            duration: StoryDuration::resolve(form.duration.as_deref()),
            illustrate: form.illustrate.is_some(),
        }
    }
}

/// Query flags a form action can leave for the page it redirects to
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub rejected: Option<String>,
}

const IDEA_TOO_LONG: &str = "idea_too_long";

fn session_url(id: Uuid) -> String {
    format!("/s/{id}")
}

/// Redirect back to the page, or to a fresh session if this one is gone
fn back_to(id: Uuid, result: ServiceResult<()>) -> Redirect {
    match result {
        Err(ServiceError::SessionNotFound { .. }) => {
            debug!(session_id = %id, "Form action on unknown session");
            Redirect::to("/")
        }
        Err(e) => {
            debug!(session_id = %id, error = %e, "Form action rejected");
            Redirect::to(&session_url(id))
        }
        Ok(()) => Redirect::to(&session_url(id)),
    }
}

/// Open a new session and send the browser to it
pub async fn index_handler(State(state): State<Arc<AppState>>) -> Redirect {
    let session = state.service.create_session();
    Redirect::to(&session_url(session.id))
}

pub async fn page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Response {
    let Ok(session) = state.service.session(id) else {
        return Redirect::to("/").into_response();
    };
    let mut view = state.view(&session);

    if params.rejected.as_deref() == Some(IDEA_TOO_LONG) && !view.busy {
        view.error = Some(
            ServiceError::IdeaTooLong {
                max: MAX_IDEA_CHARS,
            }
            .user_message(&state.service.i18n, &state.service.locale),
        );
    }

    let rendered = TEMPLATES.render_str(
        PAGE_TEMPLATE,
        context! {
            lang => &state.service.locale,
            max_idea_chars => MAX_IDEA_CHARS,
            view => &view,
        },
    );

    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(session_id = %id, error = %e, "Failed to render session page");
            state
                .i18n_error(ServiceError::Internal {
                    message: format!("page rendering failed: {e}"),
                })
                .into_response()
        }
    }
}

pub async fn generate_form_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Form(form): Form<GenerateForm>,
) -> Redirect {
    let input = PersonalizationInput::from(form);
    match state.service.start_generation(id, input.clone()) {
        Err(ServiceError::IdeaTooLong { .. }) => {
            debug!(session_id = %id, "Idea rejected as too long");
            if let Ok(session) = state.service.session(id) {
                session.keep_draft(input);
            }
            Redirect::to(&format!("{}?rejected={IDEA_TOO_LONG}", session_url(id)))
        }
        result => back_to(id, result.map(|_| ())),
    }
}

pub async fn stop_form_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Redirect {
    let result = state.service.session(id).map(|session| {
        session.request_stop();
    });
    back_to(id, result)
}

pub async fn confirm_stop_form_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Redirect {
    let result = state.service.session(id).map(|session| {
        session.confirm_stop();
    });
    back_to(id, result)
}

pub async fn deny_stop_form_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Redirect {
    let result = state.service.session(id).map(|session| session.deny_stop());
    back_to(id, result)
}

/// Drop the session and start over with a fresh one
pub async fn reset_form_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Redirect {
    if let Err(e) = state.service.end_session(id) {
        debug!(session_id = %id, error = %e, "Reset of unknown session");
    }
    Redirect::to("/")
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use super::*;
    use crate::api::test_app;
    use crate::service::gateway::testing::*;

    async fn page(app: &Router, id: Uuid) -> (StatusCode, String) {
        page_at(app, format!("/s/{id}")).await
    }

    async fn page_at(app: &Router, uri: String) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn form_post(uri: String, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_index_redirects_to_new_session() {
        let (service, app) = test_app(FakeModel::new());

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/s/"));
        assert_eq!(service.session_count(), 1);
    }

    #[tokio::test]
    async fn test_idle_page_renders_form() {
        let (service, app) = test_app(FakeModel::new());
        let id = service.create_session().id;

        let (status, html) = page(&app, id).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<html lang=\"pt-BR\">"));
        assert!(html.contains("Gerar História"));
        assert!(html.contains("<option value=\"random\" selected>Aleatório</option>"));
        assert!(html.contains("<option value=\"medium\" selected>"));
        assert!(!html.contains("http-equiv=\"refresh\""));
        assert!(!html.contains("<fieldset disabled>"));
        assert!(html.contains("<details>\n<summary>Personalizar</summary>"));
        assert!(html.contains(&format!("Versão {}", env!("CARGO_PKG_VERSION"))));
    }

    #[tokio::test]
    async fn test_busy_page_escapes_idea_and_offers_interrupt() {
        let (service, app) = test_app(FakeModel::new());
        let session = service.create_session();
        let _ = session.start_generation(PersonalizationInput {
            idea: "<b>um dragão</b>".to_string(),
            ..PersonalizationInput::default()
        });
        session.request_stop();

        let (_, html) = page(&app, session.id).await;
        assert!(html.contains("http-equiv=\"refresh\""));
        assert!(html.contains("<fieldset disabled>"));
        assert!(html.contains("Interromper geração"));
        assert!(html.contains("Sim, interromper agora"));
        assert!(html.contains("&lt;b&gt;um dragão"));
        assert!(!html.contains("<b>um dragão"));
    }

    #[tokio::test]
    async fn test_generate_form_starts_and_redirects() {
        let (service, app) = test_app(FakeModel::new());
        let session = service.create_session();

        let response = app
            .oneshot(form_post(
                format!("/s/{}/generate", session.id),
                "idea=&tone=funny&duration=bogus",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("/s/{}", session.id).as_str()
        );

        let input = session.snapshot().personalization;
        assert_eq!(input.tone, Tone::Funny);
        assert_eq!(input.duration, StoryDuration::Medium);
        assert!(!input.illustrate);
    }

    #[tokio::test]
    async fn test_unknown_session_redirects_home() {
        let (_, app) = test_app(FakeModel::new());

        let (status, _) = page(&app, Uuid::new_v4()).await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let response = app
            .oneshot(form_post(format!("/s/{}/stop", Uuid::new_v4()), ""))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn test_crlf_idea_at_limit_is_accepted() {
        let (service, app) = test_app(FakeModel::new());
        let session = service.create_session();
        // 250 + newline + 249 = the textarea limit; 501 bytes once CRLF-encoded
        let body = format!("idea={}%0D%0A{}", "a".repeat(250), "b".repeat(249));

        let response = app
            .oneshot(form_post(format!("/s/{}/generate", session.id), &body))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("/s/{}", session.id).as_str()
        );

        let state = session.snapshot();
        assert_eq!(state.attempts, 1);
        assert_eq!(state.personalization.idea.chars().count(), MAX_IDEA_CHARS);
        assert!(!state.personalization.idea.contains('\r'));
    }

    #[tokio::test]
    async fn test_overlong_idea_is_kept_and_reported() {
        let (service, app) = test_app(FakeModel::new());
        let session = service.create_session();
        let idea = "a".repeat(MAX_IDEA_CHARS + 1);

        let response = app
            .clone()
            .oneshot(form_post(
                format!("/s/{}/generate", session.id),
                &format!("idea={idea}&tone=calm"),
            ))
            .await
            .unwrap();
        let location = response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(
            location,
            format!("/s/{}?rejected=idea_too_long", session.id)
        );

        let state = session.snapshot();
        assert!(!state.busy);
        assert_eq!(state.attempts, 0);
        assert_eq!(state.personalization.idea, idea);
        assert_eq!(state.personalization.tone, Tone::Calm);

        let (status, html) = page_at(&app, location).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<p class=\"error\">A ideia é longa demais (máximo de 500 caracteres).</p>"));
        assert!(html.contains(&idea));
        assert!(html.contains("<details open>"));
    }

    #[tokio::test]
    async fn test_reset_drops_session() {
        let (service, app) = test_app(FakeModel::new());
        let id = service.create_session().id;

        let response = app
            .oneshot(form_post(format!("/s/{id}/reset"), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(service.session_count(), 0);
    }
}
