//! HTTP surface for the Storyteller service.
//!
//! This module provides:
//! - Health monitoring
//! - The HTML session page and its form actions (`pages`)
//! - A JSON API over the same session operations (`sessions`)

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{I18nError, ServiceError};
use crate::service::StorytellerService;
use crate::service::session::Session;
use crate::view::SessionView;

pub mod pages;
pub mod sessions;
use pages::{
    confirm_stop_form_handler, deny_stop_form_handler, generate_form_handler, index_handler,
    page_handler, reset_form_handler, stop_form_handler,
};
use sessions::{
    confirm_stop_handler, create_session_handler, delete_session_handler, deny_stop_handler,
    generate_handler, get_session_handler, illustration_handler, stop_handler,
};

/// Application state
pub struct AppState {
    pub service: Arc<StorytellerService>,
    pub start_time: Instant,
}

impl AppState {
    /// Create an i18n-aware error from a service error
    pub fn i18n_error(&self, error: ServiceError) -> I18nError {
        I18nError::new(
            error,
            self.service.i18n.clone(),
            self.service.locale.clone(),
        )
    }

    /// Project a session for rendering in the configured locale
    pub fn view(&self, session: &Session) -> SessionView {
        SessionView::project(
            session.id,
            &session.snapshot(),
            &self.service.i18n,
            &self.service.locale,
        )
    }
}

/// Build the application router
pub fn router(service: Arc<StorytellerService>) -> Router {
    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/sessions", post(create_session_handler))
        .route(
            "/sessions/{id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/sessions/{id}/generate", post(generate_handler))
        .route("/sessions/{id}/stop", post(stop_handler))
        .route("/sessions/{id}/stop/confirm", post(confirm_stop_handler))
        .route("/sessions/{id}/stop/deny", post(deny_stop_handler))
        .route("/sessions/{id}/illustration", get(illustration_handler));

    Router::new()
        .route("/", get(index_handler))
        .route("/s/{id}", get(page_handler))
        .route("/s/{id}/generate", post(generate_form_handler))
        .route("/s/{id}/stop", post(stop_form_handler))
        .route("/s/{id}/stop/confirm", post(confirm_stop_form_handler))
        .route("/s/{id}/stop/deny", post(deny_stop_form_handler))
        .route("/s/{id}/reset", post(reset_form_handler))
        .route("/health", get(health_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state
            .service
            .i18n
            .get(&state.service.locale, "health-status-healthy", None),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_sessions: state.service.session_count(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    active_sessions: usize,
}

/// Router over a service backed by a scripted model
#[cfg(test)]
pub(crate) fn test_app(
    model: crate::service::gateway::testing::FakeModel,
) -> (Arc<StorytellerService>, Router) {
    let service = Arc::new(StorytellerService::new(
        Arc::new(model),
        crate::service::gateway::testing::test_prompts(),
        "pt-BR".to_string(),
    ));
    (service.clone(), router(service))
}
