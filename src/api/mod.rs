pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use handlers::ApiDoc;

use crate::{
    auth::IdentityProvider, context::DashboardContext, session::SubscriptionController,
    weather::WeatherClient,
};

/// Shared handler state. Every field is a cheap handle onto shared state.
#[derive(Clone)]
pub struct AppState {
    pub controller: SubscriptionController,
    pub auth: Arc<dyn IdentityProvider>,
    /// `None` when no weather API key is configured.
    pub weather: Option<WeatherClient>,
    pub context: DashboardContext,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/readings/latest", get(handlers::get_latest_reading))
        .route("/readings/history", get(handlers::get_reading_history))
        .route("/readings/stream", get(handlers::stream_dashboard))
        .route("/session", get(handlers::get_session))
        .route("/session/login", post(handlers::login))
        .route("/session/register", post(handlers::register))
        .route("/session/password-reset", post(handlers::password_reset))
        .route("/session/logout", post(handlers::logout))
        .route("/weather", get(handlers::get_weather))
        .route("/context", get(handlers::get_context))
        .route("/context/theme", post(handlers::toggle_theme))
        .route("/context/pump", post(handlers::toggle_pump))
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
