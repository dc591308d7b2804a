//! Login and logout

use axum::{
    extract::{rejection::FormRejection, Form, State},
    response::{IntoResponse, Response},
};
use millwright_auth::{AuthError, Credentials};
use std::time::Instant;
use tower_sessions::Session;
use tracing::{debug, error};

use super::found;
use crate::metrics::LoginOutcome;
use crate::server::AppState;
use crate::session::{flash_error, flash_success, take_flashes, SessionPrincipalStore};
use crate::views;

/// GET /login
pub async fn login_page(session: Session) -> Response {
    let flashes = take_flashes(&session).await;
    views::login_page(&flashes).into_response()
}

/// POST /login
pub async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    form: Result<Form<Credentials>, FormRejection>,
) -> Response {
    let start = Instant::now();
    let credentials = match form {
        Ok(Form(credentials)) => credentials,
        Err(rejection) => {
            debug!(error = %rejection, "Malformed login form");
            let err = AuthError::Authentication;
            state
                .metrics
                .record_login(LoginOutcome::from(&err), start.elapsed().as_secs_f64());
            flash_error(&session, err.user_message()).await;
            return found("/login");
        }
    };
    let store = SessionPrincipalStore::new(session.clone());

    let result = state.login.login(credentials, &store).await;
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(principal) => {
            state.metrics.record_login(LoginOutcome::Success, elapsed);
            flash_success(&session, format!("Welcome {}", principal.common_name())).await;
            found("/")
        }
        Err(e) => {
            state
                .metrics
                .record_login(LoginOutcome::from(&e), elapsed);
            if !matches!(e, AuthError::Authentication) {
                error!(error = %e, "Login could not be completed");
            }
            flash_error(&session, e.user_message()).await;
            found("/login")
        }
    }
}

/// GET /logout
pub async fn logout(session: Session) -> Response {
    if let Err(e) = session.flush().await {
        error!(error = %e, "Failed to destroy session");
    }
    found("/login")
}
