//! Session plumbing: the session store, the principal record and flash
//! messages

use async_trait::async_trait;
use millwright_auth::{AuthError, AuthResult, PrincipalStore, SessionPrincipal};
use millwright_core::config::SessionConfig;
use millwright_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_sessions::cookie::SameSite;
use tower_sessions::session_store::ExpiredDeletion;
use tower_sessions::{Expiry, Session, SessionManagerLayer};
use tower_sessions_sqlx_store::sqlx::SqlitePool;
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{error, info, warn};

/// Session key holding the [`SessionPrincipal`]
pub const PRINCIPAL_KEY: &str = "user";

const FLASH_KEY: &str = "_flash";
const PING_KEY: &str = "_ping";

/// Session store in the application database, with its table created
pub async fn open_session_store(pool: SqlitePool) -> Result<SqliteStore> {
    let store = SqliteStore::new(pool);
    store
        .migrate()
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to create session table: {}", e)))?;
    Ok(store)
}

/// Purge expired sessions every `period`
pub fn spawn_session_sweeper(store: SqliteStore, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Expired session sweeper started");
    tokio::spawn(async move {
        if let Err(e) = store.continuously_delete_expired(period).await {
            error!(error = %e, "Expired session sweeper stopped");
        }
    })
}

/// Session layer with sliding inactivity expiry
pub fn session_layer(store: SqliteStore, config: &SessionConfig) -> SessionManagerLayer<SqliteStore> {
    let ttl = i64::try_from(config.ttl_secs).unwrap_or(i64::MAX);
    let same_site = if config.same_site_lax {
        SameSite::Lax
    } else {
        SameSite::Strict
    };

    SessionManagerLayer::new(store)
        .with_name(config.cookie_name.clone())
        .with_secure(config.secure)
        .with_same_site(same_site)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(ttl)))
}

/// Principal of the current session, if any
pub async fn current_principal(session: &Session) -> Option<SessionPrincipal> {
    match session.get::<SessionPrincipal>(PRINCIPAL_KEY).await {
        Ok(principal) => principal,
        Err(e) => {
            warn!(error = %e, "Failed to read session principal");
            None
        }
    }
}

/// Record activity so the inactivity window restarts
///
/// Sessions without a principal are left alone, so anonymous pings never
/// create a stored session.
pub async fn touch(session: &Session) {
    if current_principal(session).await.is_none() {
        return;
    }
    if let Err(e) = session.insert(PING_KEY, chrono::Utc::now().timestamp()).await {
        warn!(error = %e, "Failed to refresh session");
    }
}

/// Installs the login principal into the request's session
///
/// The session id is cycled first so a pre-login id never carries an
/// authenticated principal.
pub struct SessionPrincipalStore {
    session: Session,
}

impl SessionPrincipalStore {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl PrincipalStore for SessionPrincipalStore {
    async fn install(&self, principal: &SessionPrincipal) -> AuthResult<()> {
        self.session
            .cycle_id()
            .await
            .map_err(|e| AuthError::SessionWrite(e.to_string()))?;

        self.session
            .insert(PRINCIPAL_KEY, principal)
            .await
            .map_err(|e| AuthError::SessionWrite(e.to_string()))
    }
}

// ============================================================================
// Flash messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

/// One-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

pub async fn push_flash(session: &Session, level: FlashLevel, message: impl Into<String>) {
    let mut flashes = match session.get::<Vec<Flash>>(FLASH_KEY).await {
        Ok(flashes) => flashes.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Discarding unreadable flash messages");
            Vec::new()
        }
    };

    flashes.push(Flash {
        level,
        message: message.into(),
    });

    if let Err(e) = session.insert(FLASH_KEY, flashes).await {
        warn!(error = %e, "Failed to store flash message");
    }
}

pub async fn flash_success(session: &Session, message: impl Into<String>) {
    push_flash(session, FlashLevel::Success, message).await
}

pub async fn flash_error(session: &Session, message: impl Into<String>) {
    push_flash(session, FlashLevel::Error, message).await
}

/// Remove and return pending flash messages
pub async fn take_flashes(session: &Session) -> Vec<Flash> {
    match session.remove::<Vec<Flash>>(FLASH_KEY).await {
        Ok(flashes) => flashes.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Failed to read flash messages");
            Vec::new()
        }
    }
}
