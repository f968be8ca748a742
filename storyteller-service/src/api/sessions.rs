//! JSON session API.
//!
//! Each handler returns the session's current [`SessionView`] so clients can
//! render without a second round trip.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{I18nError, ServiceError};
use crate::service::session::PersonalizationInput;
use crate::view::SessionView;

use super::AppState;

/// Session plus its render-ready view
#[derive(Serialize)]
pub struct SessionResponse {
    pub created_at: String,
    #[serde(flatten)]
    pub view: SessionView,
}

fn session_response(state: &AppState, id: Uuid) -> Result<SessionResponse, I18nError> {
    let session = state
        .service
        .session(id)
        .map_err(|e| state.i18n_error(e))?;

    Ok(SessionResponse {
        created_at: session.created_at.to_rfc3339(),
        view: state.view(&session),
    })
}

/// Open a new session
pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionResponse>), I18nError> {
    let session = state.service.create_session();
    Ok((StatusCode::CREATED, Json(session_response(&state, session.id)?)))
}

pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, I18nError> {
    Ok(Json(session_response(&state, id)?))
}

/// Close a session, cancelling any generation in flight
pub async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, I18nError> {
    state
        .service
        .end_session(id)
        .map_err(|e| state.i18n_error(e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start a generation.
///
/// Responds 202 when the attempt started and 409 when one was already
/// running; in both cases the body is the current view.
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<PersonalizationInput>,
) -> Result<(StatusCode, Json<SessionResponse>), I18nError> {
    let started = state
        .service
        .start_generation(id, input)
        .map_err(|e| state.i18n_error(e))?;

    let status = if started {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(session_response(&state, id)?)))
}

/// Ask to stop; only raises the confirmation prompt
pub async fn stop_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, I18nError> {
    let session = state
        .service
        .session(id)
        .map_err(|e| state.i18n_error(e))?;
    session.request_stop();
    Ok(Json(session_response(&state, id)?))
}

pub async fn confirm_stop_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, I18nError> {
    let session = state
        .service
        .session(id)
        .map_err(|e| state.i18n_error(e))?;
    session.confirm_stop();
    Ok(Json(session_response(&state, id)?))
}

pub async fn deny_stop_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, I18nError> {
    let session = state
        .service
        .session(id)
        .map_err(|e| state.i18n_error(e))?;
    session.deny_stop();
    Ok(Json(session_response(&state, id)?))
}

/// Serve the current illustration as PNG
pub async fn illustration_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, I18nError> {
    let session = state
        .service
        .session(id)
        .map_err(|e| state.i18n_error(e))?;

    let png = session.illustration_png().ok_or_else(|| {
        state.i18n_error(ServiceError::IllustrationNotFound {
            session_id: id.to_string(),
        })
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, mime::IMAGE_PNG.as_ref()),
            (header::CACHE_CONTROL, "no-store"),
        ],
        png,
    )
        .into_response())
}
