//! Authorization gates
//!
//! Both gates are pure reads of the session principal; the directory is not
//! consulted per request, so a revoked chief keeps the flag until their
//! next login.

use axum::{
    body::Body,
    extract::Extension,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use millwright_auth::SessionPrincipal;
use tower_sessions::Session;
use tracing::debug;
use url::Url;

use crate::routes::found;
use crate::session::{current_principal, flash_error};

pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in to continue";
pub const PERMISSION_DENIED_MESSAGE: &str = "Permission denied";

/// Redirect to `/login` unless the session holds a principal
///
/// The principal is passed on to handlers as a request extension.
pub async fn require_login(session: Session, mut request: Request<Body>, next: Next) -> Response {
    match current_principal(&session).await {
        Some(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        None => {
            debug!(path = %request.uri().path(), "Anonymous request to protected page");
            flash_error(&session, LOGIN_REQUIRED_MESSAGE).await;
            found("/login")
        }
    }
}

/// Reject non-chiefs, sending them back where they came from
///
/// Must run inside [`require_login`].
pub async fn only_chief(
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if principal.is_chief() {
        return next.run(request).await;
    }

    debug!(
        uid = %principal.uid(),
        path = %request.uri().path(),
        "Chief-only page denied"
    );
    flash_error(&session, PERMISSION_DENIED_MESSAGE).await;

    let target = referer_path(request.headers(), request.uri().path());
    found(&target)
}

/// Path (and query) of the Referer header, or `/`
///
/// Only the path is kept, so a forged Referer cannot redirect off-site. A
/// referer pointing at the denied page itself also falls back to `/`.
pub fn referer_path(headers: &HeaderMap, current_path: &str) -> String {
    headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Url::parse(value).ok())
        .filter(|url| url.path() != current_path)
        .map(|url| match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        })
        .unwrap_or_else(|| "/".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_str(referer).unwrap());
        headers
    }

    #[test]
    fn test_referer_path() {
        assert_eq!(
            referer_path(&headers("http://mill.local/dashboard/list"), "/dashboard/add"),
            "/dashboard/list"
        );
        assert_eq!(
            referer_path(&headers("http://mill.local/dashboard/maintenance?page=2"), "/dashboard/add"),
            "/dashboard/maintenance?page=2"
        );
    }

    #[test]
    fn test_referer_fallbacks() {
        assert_eq!(referer_path(&HeaderMap::new(), "/dashboard/add"), "/");
        assert_eq!(referer_path(&headers("not a url"), "/dashboard/add"), "/");
        assert_eq!(
            referer_path(&headers("http://mill.local/dashboard/add"), "/dashboard/add"),
            "/"
        );
    }

    #[test]
    fn test_referer_drops_foreign_host() {
        assert_eq!(
            referer_path(&headers("https://evil.example/phish"), "/dashboard/add"),
            "/phish"
        );
    }
}
