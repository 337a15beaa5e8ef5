use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::extractors::MaybeUser;

/// Where a visitor belongs given their session state, or `None` to let the
/// page render.
pub fn gate_redirect(user: &MaybeUser) -> Option<&'static str> {
    match &user.0 {
        None => Some("/login"),
        Some(user) if !user.has_profile() => Some("/username"),
        Some(_) => None,
    }
}

/// Middleware for pages that need a signed-in user with a handle.
pub async fn require_profile(user: MaybeUser, request: Request, next: Next) -> Response {
    match gate_redirect(&user) {
        Some(to) => {
            tracing::debug!(path = %request.uri().path(), to, "Gate redirect");
            Redirect::to(to).into_response()
        }
        None => next.run(request).await,
    }
}
