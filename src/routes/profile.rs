use askama::Template;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser, WantsFragment};
use crate::feed::Timeline;
use crate::posts;
use crate::profiles::{self, Username};
use crate::routes::home::Html;
use crate::routes::views::{timeline_page, PostView};
use crate::state::AppState;
use crate::storage::{BlobKey, MediaKind};

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub viewer_username: String,
    pub display_name: String,
    pub username: String,
    pub photo_url: Option<String>,
    pub joined: String,
    pub post_count: usize,
    pub is_owner: bool,
    pub posts: Vec<PostView>,
    pub next_cursor: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/username.html")]
pub struct UsernameTemplate {
    pub error: Option<String>,
    pub username: String,
}

#[derive(Template)]
#[template(path = "pages/avatar.html")]
pub struct AvatarTemplate {
    pub viewer_username: String,
    pub photo_url: Option<String>,
    pub error: Option<String>,
    pub min_px: u32,
    pub max_mb: usize,
}

#[derive(Deserialize)]
pub struct UsernameForm {
    pub username: String,
}

/// Gated pages. Mounted behind the profile gate by the app router.
pub fn pages() -> Router<AppState> {
    Router::new()
        .route("/profile", get(own_profile))
        .route("/profile/{username}", get(show))
}

/// Handle setup and avatar upload. These check the session themselves and
/// stay outside `/profile/` so no handle can shadow them.
pub fn editors(avatar_body_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/username", get(username_page).post(set_username))
        .route(
            "/settings/avatar",
            get(avatar_page)
                .post(upload_avatar)
                .layer(DefaultBodyLimit::max(avatar_body_limit)),
        )
}

// -- Profile page --

/// GET /profile — the viewer's own page
async fn own_profile(user: CurrentUser) -> AppResult<Redirect> {
    let username = user.username.ok_or(AppError::NotFound)?;
    Ok(Redirect::to(&format!("/profile/{}", username)))
}

/// GET /profile/{username}
async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Html<ProfileTemplate>> {
    let conn = state.db.get()?;
    let profile = profiles::by_username(&conn, &username)?.ok_or(AppError::NotFound)?;
    let is_owner = profile.uid == user.id;

    let mut timeline = Timeline::new(posts::by_author(&conn, &profile.uid)?, None);
    if is_owner {
        // Cards keep the avatar they were written with; only the owner's own
        // page shows the current one.
        timeline.patch_author_photo(&user.id, user.photo_url.as_deref());
    }
    let post_count = timeline.len();
    let page = timeline_page(&conn, &user, timeline)?;

    Ok(Html(ProfileTemplate {
        viewer_username: user.username.clone().unwrap_or_default(),
        display_name: profile.display_name,
        username: profile.username,
        photo_url: profile.photo_url,
        joined: profile.created_at.format("%B %Y").to_string(),
        post_count,
        is_owner,
        posts: page.posts,
        next_cursor: page.next_cursor,
    }))
}

// -- Username --

/// GET /username
async fn username_page(MaybeUser(user): MaybeUser) -> Response {
    match user {
        None => Redirect::to("/login").into_response(),
        Some(user) if user.has_profile() => Redirect::to("/").into_response(),
        Some(_) => Html(UsernameTemplate {
            error: None,
            username: String::new(),
        })
        .into_response(),
    }
}

/// POST /username — claim a handle, once
async fn set_username(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Form(form): Form<UsernameForm>,
) -> AppResult<Response> {
    let Some(user) = user else {
        return Ok(Redirect::to("/login").into_response());
    };
    if user.has_profile() {
        return Ok(Redirect::to("/").into_response());
    }

    let rejected = |status: StatusCode, message: String| {
        (
            status,
            Html(UsernameTemplate {
                error: Some(message),
                username: form.username.trim().to_string(),
            }),
        )
            .into_response()
    };

    let username = match Username::parse(&form.username) {
        Ok(username) => username,
        Err(message) => return Ok(rejected(StatusCode::BAD_REQUEST, message.to_string())),
    };

    let created = {
        let conn = state.db.get()?;
        profiles::create(&conn, &user.id, &username)
    };
    match created {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(AppError::Conflict(message)) => Ok(rejected(StatusCode::CONFLICT, message)),
        Err(e) => Err(e),
    }
}

// -- Avatar --

fn avatar_template(state: &AppState, user: &CurrentUser, error: Option<String>) -> AvatarTemplate {
    AvatarTemplate {
        viewer_username: user.username.clone().unwrap_or_default(),
        photo_url: user.photo_url.clone(),
        error,
        min_px: state.config.media.min_avatar_px,
        max_mb: state.config.media.max_avatar_bytes / (1024 * 1024),
    }
}

/// GET /settings/avatar
async fn avatar_page(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> Response {
    match user {
        None => Redirect::to("/login").into_response(),
        Some(user) if !user.has_profile() => Redirect::to("/username").into_response(),
        Some(user) => Html(avatar_template(&state, &user, None)).into_response(),
    }
}

/// Check an uploaded picture against the avatar rules.
pub fn validate_avatar(data: &[u8], max_bytes: usize, min_px: u32) -> AppResult<MediaKind> {
    if data.is_empty() {
        return Err(AppError::BadRequest("Choose a picture to upload".into()));
    }
    if data.len() > max_bytes {
        return Err(AppError::TooLarge(format!(
            "Profile pictures are at most {} MB",
            max_bytes / (1024 * 1024)
        )));
    }
    let kind = MediaKind::sniff(data)
        .ok_or_else(|| AppError::BadRequest("Profile pictures must be PNG, JPEG or GIF".into()))?;
    let (width, height) = kind
        .dimensions(data)
        .ok_or_else(|| AppError::BadRequest("Could not read the picture's size".into()))?;
    if width < min_px || height < min_px {
        return Err(AppError::BadRequest(format!(
            "Profile pictures must be at least {}x{} pixels",
            min_px, min_px
        )));
    }
    Ok(kind)
}

/// The stored blob behind `previous_url` when it is not `current`.
fn superseded_avatar(previous_url: Option<&str>, current: &BlobKey) -> Option<BlobKey> {
    let previous = BlobKey::from_url(previous_url?).ok()?;
    (previous != *current).then_some(previous)
}

async fn read_avatar(mut multipart: Multipart) -> AppResult<Bytes> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("avatar") {
            return Ok(field.bytes().await?);
        }
    }
    Ok(Bytes::new())
}

/// Store the picture and point the account and profile at it. Returns the
/// new URL, versioned so browsers drop the cached image.
async fn replace_avatar(state: &AppState, user: &CurrentUser, multipart: Multipart) -> AppResult<String> {
    let data = read_avatar(multipart).await?;
    let media = &state.config.media;
    let kind = validate_avatar(&data, media.max_avatar_bytes, media.min_avatar_px)?;

    let key = BlobKey::for_avatar(&user.id, kind)?;
    state.blobs.put(&key, data).await?;

    let url = format!("{}?v={}", key.url(), Utc::now().timestamp_millis());
    {
        let mut conn = state.db.get()?;
        profiles::set_photo_url(&mut conn, &user.id, &url)?;
    }
    tracing::info!(user_id = %user.id, key = %key, "Profile picture replaced");

    // A picture in another format lives under a different key.
    if let Some(previous) = superseded_avatar(user.photo_url.as_deref(), &key) {
        if let Err(e) = state.blobs.delete(&previous).await {
            tracing::warn!(key = %previous, "Failed to remove old profile picture: {}", e);
        }
    }
    Ok(url)
}

/// POST /settings/avatar — multipart `avatar`
async fn upload_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    WantsFragment(fragment): WantsFragment,
    multipart: Multipart,
) -> AppResult<Response> {
    let username = user.username.clone().ok_or(AppError::Forbidden)?;

    match replace_avatar(&state, &user, multipart).await {
        Ok(url) if fragment => Ok(Json(serde_json::json!({ "photo_url": url })).into_response()),
        Ok(_) => Ok(Redirect::to(&format!("/profile/{}", username)).into_response()),
        Err(e) if fragment => Err(e),
        Err(AppError::BadRequest(message)) => Ok((
            StatusCode::BAD_REQUEST,
            Html(avatar_template(&state, &user, Some(message))),
        )
            .into_response()),
        Err(AppError::TooLarge(message)) => Ok((
            StatusCode::PAYLOAD_TOO_LARGE,
            Html(avatar_template(&state, &user, Some(message))),
        )
            .into_response()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::media::fixtures;

    const MB: usize = 1024 * 1024;

    #[test]
    fn avatar_accepts_large_enough_images() {
        assert_eq!(validate_avatar(&fixtures::png(400, 400), 2 * MB, 400).unwrap(), MediaKind::Png);
        assert_eq!(validate_avatar(&fixtures::jpeg(800, 600), 2 * MB, 400).unwrap(), MediaKind::Jpeg);
        assert_eq!(validate_avatar(&fixtures::gif(500, 401), 2 * MB, 400).unwrap(), MediaKind::Gif);
    }

    #[test]
    fn avatar_rejects_small_images() {
        let result = validate_avatar(&fixtures::png(399, 800), 2 * MB, 400);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn avatar_rejects_oversized_files() {
        let result = validate_avatar(&fixtures::png(400, 400), 10, 400);
        assert!(matches!(result, Err(AppError::TooLarge(_))));
    }

    #[test]
    fn avatar_rejects_non_images() {
        let result = validate_avatar(b"GIF? no, just text", 2 * MB, 400);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(matches!(validate_avatar(b"", 2 * MB, 400), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn superseded_avatar_only_for_a_different_key() {
        let png = BlobKey::for_avatar("u1", MediaKind::Png).unwrap();
        let gif = BlobKey::for_avatar("u1", MediaKind::Gif).unwrap();

        let old_png = format!("{}?v=1", png.url());
        assert_eq!(superseded_avatar(Some(&old_png), &gif), Some(png.clone()));
        assert_eq!(superseded_avatar(Some(&old_png), &png), None);
        assert_eq!(superseded_avatar(None, &gif), None);
        assert_eq!(superseded_avatar(Some("https://elsewhere.example/a.png"), &gif), None);
    }

    #[test]
    fn profile_page_renders_counts_and_owner_controls() {
        let html = ProfileTemplate {
            viewer_username: "alice".into(),
            display_name: "Alice".into(),
            username: "alice".into(),
            photo_url: None,
            joined: "March 2026".into(),
            post_count: 3,
            is_owner: true,
            posts: vec![],
            next_cursor: None,
        }
        .render()
        .unwrap();
        assert!(html.contains("3 posts"));
        assert!(html.contains("Joined March 2026"));
        assert!(html.contains("/settings/avatar"));
    }
}
