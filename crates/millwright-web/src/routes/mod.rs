//! Route handlers

pub mod auth;
pub mod dashboard;

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use millwright_auth::SessionPrincipal;
use tower_sessions::Session;

use crate::session::{take_flashes, touch};
use crate::views;

/// 302 Found to `location`
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// GET /
pub async fn index(session: Session, Extension(principal): Extension<SessionPrincipal>) -> Response {
    let flashes = take_flashes(&session).await;
    views::index_page(&principal, &flashes).into_response()
}

/// GET /ping
///
/// Called periodically by open pages to keep an idle session alive.
pub async fn ping(session: Session) -> StatusCode {
    touch(&session).await;
    StatusCode::OK
}
