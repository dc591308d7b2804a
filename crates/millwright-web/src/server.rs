//! Web server implementation

use axum::{
    extract::FromRef,
    middleware,
    routing::get,
    Router,
};
use millwright_auth::{LdapConfig, LdapDirectory, LoginFlow};
use millwright_core::{config::MillwrightConfig, Error, Result};
use millwright_metadata::{MachineRepository, MetadataStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::info;

use crate::metrics::{metrics_handler, metrics_middleware, MetricsRecorder};
use crate::middleware::{only_chief, require_login};
use crate::routes::{self, auth, dashboard};
use crate::session::{open_session_store, session_layer, spawn_session_sweeper};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MillwrightConfig>,
    pub machines: Arc<dyn MachineRepository>,
    pub login: Arc<LoginFlow>,
    pub metrics: Arc<MetricsRecorder>,
    pub sessions: SqliteStore,
}

impl FromRef<AppState> for Arc<MetricsRecorder> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

/// Millwright web server
pub struct WebServer {
    config: MillwrightConfig,
}

impl WebServer {
    pub fn new(config: MillwrightConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let ldap = LdapConfig::from_section(&self.config.ldap)
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        // Initialize metrics
        let metrics = MetricsRecorder::install()
            .map_err(|e| Error::InternalError(format!("Failed to install metrics recorder: {}", e)))?;
        info!("Prometheus metrics initialized");

        // Initialize metadata store
        let metadata = MetadataStore::new(
            &self.config.database.url,
            self.config.database.max_connections,
        )
        .await?;

        let sessions = open_session_store(metadata.pool().clone()).await?;
        let sweep = Duration::from_secs(self.config.session.sweep_interval_secs.max(1));
        spawn_session_sweeper(sessions.clone(), sweep);

        let directory = Arc::new(LdapDirectory::new(ldap.clone()));
        info!(
            server = %ldap.server_url,
            chief_gid = ldap.chief_group_id,
            "Directory login configured"
        );

        let state = AppState {
            config: Arc::new(self.config.clone()),
            machines: Arc::new(metadata),
            login: Arc::new(LoginFlow::new(directory, ldap)),
            metrics: Arc::new(metrics),
            sessions,
        };

        let app = build_router(state);
        let addr = self.config.listen_address();
        let listener = TcpListener::bind(&addr).await?;

        info!("Millwright listening on http://{}", addr);
        info!("Prometheus metrics at http://{}/metrics", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let chief_only = Router::new()
        .route(
            "/dashboard/status",
            get(dashboard::status_form).post(dashboard::status_submit),
        )
        .route(
            "/dashboard/add",
            get(dashboard::add_form).post(dashboard::add_submit),
        )
        .route(
            "/dashboard/edit/{m_id}",
            get(dashboard::edit_form).post(dashboard::edit_submit),
        )
        .route_layer(middleware::from_fn(only_chief));

    let protected = Router::new()
        .route("/", get(routes::index))
        .route("/dashboard", get(dashboard::root))
        .route("/dashboard/list", get(dashboard::list))
        .route(
            "/dashboard/reports/add",
            get(dashboard::report_form).post(dashboard::report_submit),
        )
        .route("/dashboard/maintenance", get(dashboard::maintenance))
        .route("/dashboard/check-mid/{m_id}", get(dashboard::check_mid))
        .merge(chief_only)
        .route_layer(middleware::from_fn(require_login));

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs.max(1));

    Router::new()
        // Public routes
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .route("/logout", get(auth::logout))
        .route("/ping", get(routes::ping))
        .route("/metrics", get(metrics_handler))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ))
        .layer(session_layer(state.sessions.clone(), &state.config.session))
        .layer(TimeoutLayer::new(timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .with_state(state)
}
