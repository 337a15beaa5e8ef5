pub mod assets;
pub mod auth;
pub mod feed;
pub mod home;
pub mod media;
pub mod posts;
pub mod profile;
pub mod views;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::gate::require_profile;
use crate::state::AppState;

/// The whole application router.
///
/// Full pages (`/`, `/profile/...`) sit behind the profile gate and redirect
/// visitors who are signed out or have no handle yet. Fragment and form
/// endpoints answer 401 on their own through the `CurrentUser` extractor.
pub fn app(state: AppState) -> Router {
    let gated = Router::new()
        .route("/", get(home::index))
        .merge(profile::pages())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_profile));

    let avatar_limit = state.config.media.max_upload_bytes + 64 * 1024;

    Router::new()
        .merge(gated)
        .merge(auth::router())
        .merge(profile::editors(avatar_limit))
        .merge(feed::router())
        .merge(posts::router(state.config.post_body_limit()))
        .route("/media/{*key}", get(media::serve))
        .route("/assets/{*path}", get(assets::serve))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
