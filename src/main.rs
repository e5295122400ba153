use axum::{
    Router,
    routing::{get, post, delete},
    middleware::{from_fn, from_fn_with_state},
};

use http::{HeaderValue, Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
    cors::CorsLayer,
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutorbook::{config::Config, db, handlers, middleware_layer, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;

    if let Err(e) = db::run_migrations(&state.db).await {
        tracing::error!("❌ Failed to apply booking schema: {}", e);
        return Err(e.into());
    }

    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let protected_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(50)
            .burst_size(200)
            .use_headers()
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let public_routes = Router::new()
        .route("/api/tutors/{tutor_id}/slots", get(handlers::availability::bookable_slots))
        .route("/api/tutors/{tutor_id}/availability", get(handlers::availability::list_windows))
        .with_state(state.clone());

    let webhook_routes = Router::new()
        .route("/api/payments/outcome", post(handlers::payments::record_outcome))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_webhook_secret,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/api/admin/sessions/{session_id}/cancel",
            post(handlers::admin::cancel_session),
        )
        .route(
            "/api/admin/sessions/{session_id}/reschedule",
            post(handlers::admin::reschedule_session),
        )
        .route_layer(from_fn(middleware_layer::auth::require_admin))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/api/sessions",
            post(handlers::sessions::book_session).get(handlers::sessions::list_sessions),
        )
        .route("/api/sessions/{session_id}", get(handlers::sessions::get_session))
        .route(
            "/api/sessions/{session_id}/confirm-payment",
            post(handlers::sessions::confirm_payment),
        )
        .route(
            "/api/sessions/{session_id}/cancellation-policy",
            get(handlers::sessions::cancellation_policy),
        )
        .route(
            "/api/sessions/{session_id}/reschedule-policy",
            get(handlers::sessions::reschedule_policy),
        )
        .route("/api/sessions/{session_id}/cancel", post(handlers::sessions::cancel_session))
        .route(
            "/api/sessions/{session_id}/reschedule",
            post(handlers::sessions::reschedule_session),
        )
        .route("/api/sessions/{session_id}/complete", post(handlers::sessions::complete_session))
        .route("/api/sessions/{session_id}/no-show", post(handlers::sessions::mark_no_show))
        .route("/api/availability/windows", post(handlers::availability::add_window))
        .route(
            "/api/availability/windows/{window_id}",
            delete(handlers::availability::remove_window),
        )
        .route(
            "/api/availability/blocks",
            post(handlers::availability::add_block).get(handlers::availability::list_blocks),
        )
        .route(
            "/api/availability/blocks/{block_id}",
            delete(handlers::availability::remove_block),
        )
        .layer(tower_governor::GovernorLayer::new(
            protected_governor_conf.clone(),
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .merge(admin_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors);

    let sweep = state.engine.reminders.clone();
    let memory_locks = state.memory_locks.clone();
    let sweep_every = Duration::from_secs(config.reminder_sweep_interval_secs.max(1));
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(sweep_every).await;
            tracing::debug!("⏰ Running reminder sweep...");
            if let Err(e) = sweep.run_once(chrono::Utc::now()).await {
                tracing::error!("❌ Reminder sweep failed: {}", e);
            }
            if let Some(store) = &memory_locks {
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired slot locks");
                }
            }
        }
    });

    let addr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ Reminder sweep started (every {:?})", sweep_every);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
