use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::{stream, Stream, StreamExt};
use tracing::{info, warn};
use utoipa::OpenApi;

use super::{
    dto::{
        CredentialsRequest, DashboardView, MessageDto, PasswordResetRequest, PumpDto, ReadingDto,
        SessionDto, ThemeDto,
    },
    errors::AppError,
    AppState,
};
use crate::{
    auth::{AuthAction, AuthError},
    context::{ActivityEntry, ContextSnapshot, Settings},
    session::SubscriptionController,
    weather::models::WeatherReport,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn dashboard_view(controller: &SubscriptionController) -> DashboardView {
    let reading = controller.cache().latest().await;
    DashboardView::new(controller.phase().await, reading)
}

async fn session_dto(controller: &SubscriptionController) -> SessionDto {
    let identity = controller.identity().await;
    SessionDto::new(controller.phase().await, identity.as_ref(), controller.source_name())
}

/// Map a provider failure to a response carrying only the short user message.
fn auth_failure(err: AuthError, action: AuthAction) -> AppError {
    warn!(?action, error = %err, "Authentication request failed");
    let message = err.user_message(action).to_owned();
    match (err, action) {
        (AuthError::Transport(_), _) => AppError::Unavailable(message),
        (_, AuthAction::SignIn) => AppError::Unauthorized(message),
        _ => AppError::BadRequest(message),
    }
}

/// One view now, then one per cache change, until the cache is dropped.
pub fn dashboard_updates(controller: SubscriptionController) -> impl Stream<Item = DashboardView> {
    let rx = controller.cache().subscribe();
    stream::unfold((rx, controller, true), |(mut rx, controller, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let reading = *rx.borrow_and_update();
        let view = DashboardView::new(controller.phase().await, reading);
        Some((view, (rx, controller, false)))
    })
}

// ---------------------------------------------------------------------------
// Dashboard & readings
// ---------------------------------------------------------------------------

/// Current phase, latest reading and everything derived from it.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard view; reading is null while loading", body = DashboardView),
    ),
    tag = "readings"
)]
pub async fn get_dashboard(State(state): State<AppState>) -> Json<DashboardView> {
    Json(dashboard_view(&state.controller).await)
}

#[utoipa::path(
    get,
    path = "/readings/latest",
    responses(
        (status = 200, description = "Latest reading, or null while loading", body = Option<ReadingDto>),
    ),
    tag = "readings"
)]
pub async fn get_latest_reading(State(state): State<AppState>) -> Json<Option<ReadingDto>> {
    Json(state.controller.cache().latest().await.map(Into::into))
}

/// Readings received during the current session, oldest first.
#[utoipa::path(
    get,
    path = "/readings/history",
    responses(
        (status = 200, description = "Bounded reading history", body = Vec<ReadingDto>),
    ),
    tag = "readings"
)]
pub async fn get_reading_history(State(state): State<AppState>) -> Json<Vec<ReadingDto>> {
    let history = state.controller.cache().history().await;
    Json(history.into_iter().map(Into::into).collect())
}

/// Server-sent `dashboard` events, one per reading change.
#[utoipa::path(
    get,
    path = "/readings/stream",
    responses(
        (status = 200, description = "Event stream of dashboard views", content_type = "text/event-stream", body = DashboardView),
    ),
    tag = "readings"
)]
pub async fn stream_dashboard(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = dashboard_updates(state.controller.clone())
        .map(|view| Event::default().event("dashboard").json_data(&view));
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Current session", body = SessionDto),
    ),
    tag = "session"
)]
pub async fn get_session(State(state): State<AppState>) -> Json<SessionDto> {
    Json(session_dto(&state.controller).await)
}

/// Sign in with email and password and attach the feed for that user.
#[utoipa::path(
    post,
    path = "/session/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionDto),
        (status = 401, description = "Rejected credentials"),
        (status = 503, description = "Identity provider unreachable"),
    ),
    tag = "session"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<SessionDto>, AppError> {
    let identity = state
        .auth
        .sign_in(req.email.trim(), &req.password)
        .await
        .map_err(|e| auth_failure(e, AuthAction::SignIn))?;

    info!(uid = %identity.uid, "User signed in");
    state.controller.on_identity_change(Some(identity)).await;
    Ok(Json(session_dto(&state.controller).await))
}

/// Create an account; the new user is signed in immediately.
#[utoipa::path(
    post,
    path = "/session/register",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Registered and signed in", body = SessionDto),
        (status = 400, description = "Registration rejected"),
        (status = 503, description = "Identity provider unreachable"),
    ),
    tag = "session"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<SessionDto>, AppError> {
    let identity = state
        .auth
        .sign_up(req.email.trim(), &req.password)
        .await
        .map_err(|e| auth_failure(e, AuthAction::Register))?;

    info!(uid = %identity.uid, "User registered");
    state.controller.on_identity_change(Some(identity)).await;
    Ok(Json(session_dto(&state.controller).await))
}

#[utoipa::path(
    post,
    path = "/session/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset email sent", body = MessageDto),
        (status = 400, description = "Missing or rejected email"),
    ),
    tag = "session"
)]
pub async fn password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<MessageDto>, AppError> {
    let email = req.email.trim();
    if email.is_empty() {
        return Err(auth_failure(AuthError::MissingEmail, AuthAction::PasswordReset));
    }
    state
        .auth
        .send_password_reset(email)
        .await
        .map_err(|e| auth_failure(e, AuthAction::PasswordReset))?;

    Ok(Json(MessageDto { message: "Password reset email sent".to_owned() }))
}

/// Detach the feed, reset readings to loading and restore default settings.
#[utoipa::path(
    post,
    path = "/session/logout",
    responses(
        (status = 200, description = "Signed out", body = SessionDto),
    ),
    tag = "session"
)]
pub async fn logout(State(state): State<AppState>) -> Json<SessionDto> {
    state.controller.on_identity_change(None).await;
    state.context.reset().await;
    Json(session_dto(&state.controller).await)
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/weather",
    responses(
        (status = 200, description = "Current weather and air quality", body = WeatherReport),
        (status = 500, description = "Upstream lookup failed"),
        (status = 503, description = "Weather lookup not configured"),
    ),
    tag = "weather"
)]
pub async fn get_weather(State(state): State<AppState>) -> Result<Json<WeatherReport>, AppError> {
    let client = state
        .weather
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Weather lookup is not configured".to_owned()))?;
    Ok(Json(client.report().await?))
}

// ---------------------------------------------------------------------------
// Context & settings
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/context",
    responses(
        (status = 200, description = "Theme, settings, pump state and activity log", body = ContextSnapshot),
    ),
    tag = "context"
)]
pub async fn get_context(State(state): State<AppState>) -> Json<ContextSnapshot> {
    Json(state.context.snapshot().await)
}

/// Flip between light and dark.
#[utoipa::path(
    post,
    path = "/context/theme",
    responses(
        (status = 200, description = "New theme", body = ThemeDto),
    ),
    tag = "context"
)]
pub async fn toggle_theme(State(state): State<AppState>) -> Json<ThemeDto> {
    Json(ThemeDto { theme: state.context.toggle_theme().await })
}

/// Switch the pump on or off. Refused unless settings are in manual mode.
#[utoipa::path(
    post,
    path = "/context/pump",
    responses(
        (status = 200, description = "New pump state", body = PumpDto),
        (status = 400, description = "Pump is under automatic control"),
    ),
    tag = "context"
)]
pub async fn toggle_pump(State(state): State<AppState>) -> Result<Json<PumpDto>, AppError> {
    let pump_on = state.context.toggle_pump().await.map_err(AppError::BadRequest)?;
    info!(pump_on, "Pump switched manually");
    Ok(Json(PumpDto { pump_on }))
}

#[utoipa::path(
    get,
    path = "/settings",
    responses(
        (status = 200, description = "Current settings", body = Settings),
    ),
    tag = "context"
)]
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.context.settings().await)
}

#[utoipa::path(
    put,
    path = "/settings",
    request_body = Settings,
    responses(
        (status = 200, description = "Saved settings", body = Settings),
        (status = 400, description = "Invalid settings"),
    ),
    tag = "context"
)]
pub async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, AppError> {
    let saved = state
        .context
        .replace_settings(settings)
        .await
        .map_err(AppError::BadRequest)?;
    info!("Settings saved");
    Ok(Json(saved))
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        get_dashboard,
        get_latest_reading,
        get_reading_history,
        stream_dashboard,
        get_session,
        login,
        register,
        password_reset,
        logout,
        get_weather,
        get_context,
        toggle_theme,
        toggle_pump,
        get_settings,
        put_settings,
        health,
    ),
    components(schemas(
        DashboardView,
        ReadingDto,
        SessionDto,
        CredentialsRequest,
        PasswordResetRequest,
        MessageDto,
        ThemeDto,
        PumpDto,
        WeatherReport,
        ContextSnapshot,
        ActivityEntry,
        Settings,
    )),
    tags(
        (name = "readings", description = "Live sensor readings"),
        (name = "session",  description = "Sign-in and feed lifecycle"),
        (name = "weather",  description = "Outdoor weather and air quality"),
        (name = "context",  description = "Theme, settings and manual pump control"),
        (name = "system",   description = "System endpoints"),
    ),
    info(
        title = "AquaSense API",
        version = "0.1.0",
        description = "REST API for the AquaSense sensor dashboard"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{pin::pin, sync::Arc, time::Duration};

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use futures_util::{future::BoxFuture, FutureExt};
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        api::router,
        auth::IdentityProvider,
        context::DashboardContext,
        reading_cache::ReadingCache,
        session::{Identity, SessionPhase},
        source::{FeedPublisher, ReadingSource},
    };

    struct FakeAuth;

    impl IdentityProvider for FakeAuth {
        fn sign_in<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<Identity, AuthError>> {
            async move {
                match (email, password) {
                    ("alice@example.com", "secret") => Ok(Identity {
                        uid: "alice".into(),
                        email: Some(email.into()),
                        id_token: Some("token".into()),
                    }),
                    ("alice@example.com", _) => Err(AuthError::WrongPassword),
                    _ => Err(AuthError::from_provider_code("EMAIL_NOT_FOUND")),
                }
            }
            .boxed()
        }

        fn sign_up<'a>(&'a self, email: &'a str, _password: &'a str) -> BoxFuture<'a, Result<Identity, AuthError>> {
            async move {
                if email == "alice@example.com" {
                    Err(AuthError::EmailExists)
                } else {
                    Ok(Identity::new("newbie"))
                }
            }
            .boxed()
        }

        fn send_password_reset<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
            async move {
                if email.contains('@') {
                    Ok(())
                } else {
                    Err(AuthError::InvalidEmail)
                }
            }
            .boxed()
        }
    }

    /// Publishes one fixed reading, then idles until aborted.
    struct OneShotSource;

    impl ReadingSource for OneShotSource {
        fn name(&self) -> &'static str {
            "one_shot"
        }

        fn open(&self, _identity: &Identity, publisher: FeedPublisher) -> BoxFuture<'static, ()> {
            async move {
                publisher
                    .publish_raw(&json!({
                        "temperature": 35, "humidity": 50, "soil_moisture_level": 40,
                        "is_rain": false, "timestamp": 1_700_000_000_000_i64
                    }))
                    .await;
                futures_util::future::pending::<()>().await;
            }
            .boxed()
        }
    }

    fn state() -> AppState {
        AppState {
            controller: SubscriptionController::new(Arc::new(OneShotSource), ReadingCache::new()),
            auth: Arc::new(FakeAuth),
            weather: None,
            context: DashboardContext::new(),
        }
    }

    fn test_server(state: AppState) -> TestServer {
        TestServer::new(router(state)).unwrap()
    }

    async fn wait_for_reading(state: &AppState) {
        for _ in 0..200 {
            if state.controller.cache().latest().await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no reading published");
    }

    async fn sign_in(server: &TestServer) {
        server
            .post("/session/login")
            .json(&json!({ "email": "alice@example.com", "password": "secret" }))
            .await
            .assert_status_ok();
    }

    // -----------------------------------------------------------------------
    // GET /dashboard, /readings/*
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn dashboard_is_idle_before_sign_in() {
        let server = test_server(state());
        let body: Value = server.get("/dashboard").await.json();
        assert_eq!(body["phase"], "idle");
        assert!(body["reading"].is_null());
        assert!(body["derived"].is_null());
    }

    #[tokio::test]
    async fn dashboard_shows_derived_state_after_sign_in() {
        let state = state();
        let server = test_server(state.clone());
        sign_in(&server).await;
        wait_for_reading(&state).await;

        let body: Value = server.get("/dashboard").await.json();
        assert_eq!(body["phase"], "active");
        assert_eq!(body["reading"]["temperature"], 35.0);
        assert_eq!(body["derived"]["gauges"]["temperature"], 70.0);
        assert_eq!(body["derived"]["variant"], "heat");
        assert_eq!(body["derived"]["rainStatus"], "No precipitation");
        assert_eq!(body["raindrops"], json!([]));
    }

    #[tokio::test]
    async fn latest_and_history_follow_the_cache() {
        let state = state();
        let server = test_server(state.clone());

        let body: Value = server.get("/readings/latest").await.json();
        assert!(body.is_null());

        sign_in(&server).await;
        wait_for_reading(&state).await;

        let latest: Value = server.get("/readings/latest").await.json();
        assert_eq!(latest["soilMoisture"], 40.0);
        assert_eq!(latest["timestamp"], 1_700_000_000_000_i64);

        let history: Vec<Value> = server.get("/readings/history").await.json();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn dashboard_updates_emit_current_then_changes() {
        let state = state();
        let mut updates = pin!(dashboard_updates(state.controller.clone()));

        let first = updates.next().await.unwrap();
        assert_eq!(first.phase, SessionPhase::Idle);
        assert!(first.reading.is_none());

        state.controller.on_identity_change(Some(Identity::new("alice"))).await;

        let view = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let view = updates.next().await.unwrap();
                if view.reading.is_some() {
                    return view;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(view.phase, SessionPhase::Active);
        assert_eq!(view.reading.unwrap().temperature, 35.0);
    }

    // -----------------------------------------------------------------------
    // /session
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn login_attaches_feed() {
        let server = test_server(state());
        let resp = server
            .post("/session/login")
            .json(&json!({ "email": " alice@example.com ", "password": "secret" }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["uid"], "alice");
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body["source"], "one_shot");

        let session: Value = server.get("/session").await.json();
        assert_eq!(session["uid"], "alice");
    }

    #[tokio::test]
    async fn login_failures_carry_short_messages() {
        let server = test_server(state());

        let resp = server
            .post("/session/login")
            .json(&json!({ "email": "alice@example.com", "password": "nope" }))
            .await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(resp.json::<Value>()["error"], "Incorrect password");

        let resp = server
            .post("/session/login")
            .json(&json!({ "email": "bob@example.com", "password": "x" }))
            .await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = resp.json();
        assert_eq!(body["error"], "User not found");
        assert!(!body.to_string().contains("EMAIL_NOT_FOUND"));

        let session: Value = server.get("/session").await.json();
        assert!(session["uid"].is_null());
        assert_eq!(session["phase"], "idle");
    }

    #[tokio::test]
    async fn register_signs_in_or_reports_taken_email() {
        let server = test_server(state());

        let resp = server
            .post("/session/register")
            .json(&json!({ "email": "alice@example.com", "password": "secret" }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["error"], "Email already in use");

        let resp = server
            .post("/session/register")
            .json(&json!({ "email": "new@example.com", "password": "secret" }))
            .await;
        resp.assert_status_ok();
        assert_eq!(resp.json::<Value>()["uid"], "newbie");
    }

    #[tokio::test]
    async fn password_reset_requires_email() {
        let server = test_server(state());

        let resp = server.post("/session/password-reset").json(&json!({ "email": "  " })).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["error"], "Please enter your email first");

        let resp = server.post("/session/password-reset").json(&json!({ "email": "nope" })).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["error"], "Invalid email address");

        server
            .post("/session/password-reset")
            .json(&json!({ "email": "alice@example.com" }))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn logout_resets_reading_and_context() {
        let state = state();
        let server = test_server(state.clone());
        sign_in(&server).await;
        wait_for_reading(&state).await;
        server.post("/context/theme").await.assert_status_ok();

        let resp = server.post("/session/logout").await;
        resp.assert_status_ok();
        assert_eq!(resp.json::<Value>()["phase"], "idle");

        let dashboard: Value = server.get("/dashboard").await.json();
        assert!(dashboard["reading"].is_null());
        let context: Value = server.get("/context").await.json();
        assert_eq!(context["theme"], "light");
    }

    // -----------------------------------------------------------------------
    // /weather, /context, /settings
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn weather_unconfigured_is_unavailable() {
        let server = test_server(state());
        let resp = server.get("/weather").await;
        resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.json::<Value>()["error"], "Weather lookup is not configured");
    }

    #[tokio::test]
    async fn theme_toggles() {
        let server = test_server(state());
        let body: Value = server.post("/context/theme").await.json();
        assert_eq!(body["theme"], "dark");
        let body: Value = server.post("/context/theme").await.json();
        assert_eq!(body["theme"], "light");
    }

    #[tokio::test]
    async fn settings_round_trip_and_validation() {
        let server = test_server(state());

        let mut settings: Value = server.get("/settings").await.json();
        assert_eq!(settings["thresholds"]["humidityMax"], 80.0);

        settings["thresholds"]["soilMin"] = json!(25.0);
        let resp = server.put("/settings").json(&settings).await;
        resp.assert_status_ok();
        let saved: Value = server.get("/settings").await.json();
        assert_eq!(saved["thresholds"]["soilMin"], 25.0);

        settings["schedules"][0]["time"] = json!("25:00");
        let resp = server.put("/settings").json(&settings).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pump_switches_only_in_manual_mode() {
        let server = test_server(state());

        let resp = server.post("/context/pump").await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert!(resp.json::<Value>()["error"].as_str().unwrap().contains("manual"));

        let mut settings: Value = server.get("/settings").await.json();
        settings["mode"] = json!("manual");
        server.put("/settings").json(&settings).await.assert_status_ok();

        let body: Value = server.post("/context/pump").await.json();
        assert_eq!(body["pumpOn"], true);

        let context: Value = server.get("/context").await.json();
        assert_eq!(context["pumpOn"], true);
        assert_eq!(context["activity"][0]["action"], "Pump ON");
        assert_eq!(context["activity"][0]["reason"], "Manual override");
        assert_eq!(context["activity"][1]["action"], "Settings saved");

        server.post("/session/logout").await.assert_status_ok();
        let context: Value = server.get("/context").await.json();
        assert_eq!(context["pumpOn"], false);
        assert_eq!(context["activity"], json!([]));
    }

    // -----------------------------------------------------------------------
    // System
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_returns_ok() {
        let server = test_server(state());
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn openapi_spec_is_served() {
        let server = test_server(state());
        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "AquaSense API");
        assert!(body["paths"]["/readings/stream"].is_object());
    }
}
