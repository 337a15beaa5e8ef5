use askama::Template;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use chrono::Utc;

use crate::db::models::Post;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, WantsFragment};
use crate::feed::FeedEvent;
use crate::posts;
use crate::routes::home::Html;
use crate::routes::views::{post_card, PostView};
use crate::state::AppState;
use crate::storage::{self, BlobKey, MediaKind};

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/edit_post.html")]
pub struct EditPostTemplate {
    pub post: PostView,
    pub max_chars: usize,
    pub max_attachments: usize,
}

#[derive(Template)]
#[template(path = "pages/delete_post.html")]
pub struct DeletePostTemplate {
    pub post_id: String,
}

// --- Uploads ---

pub struct MediaUpload {
    pub file_name: String,
    pub kind: MediaKind,
    pub data: Bytes,
}

/// Fields of the create and edit forms.
#[derive(Default)]
pub struct PostSubmission {
    pub content: String,
    pub keep_media: Vec<String>,
    pub uploads: Vec<MediaUpload>,
}

impl PostSubmission {
    pub async fn read(mut multipart: Multipart, max_upload_bytes: usize) -> AppResult<Self> {
        let mut submission = PostSubmission::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "content" => submission.content = field.text().await?,
                "keep_media" => submission.keep_media.push(field.text().await?),
                "media" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let data = field.bytes().await?;
                    // browsers send an empty part for an untouched file input
                    if data.is_empty() && file_name.is_empty() {
                        continue;
                    }
                    if data.len() > max_upload_bytes {
                        return Err(AppError::TooLarge(format!(
                            "{} is larger than {} MB",
                            file_name,
                            max_upload_bytes / (1024 * 1024)
                        )));
                    }
                    let kind = MediaKind::sniff(&data).ok_or_else(|| {
                        AppError::BadRequest("Only PNG, JPEG and GIF images can be attached".into())
                    })?;
                    submission.uploads.push(MediaUpload { file_name, kind, data });
                }
                other => tracing::debug!(field = other, "Ignoring unknown form field"),
            }
        }

        Ok(submission)
    }
}

fn validate_content(raw: &str, max_chars: usize) -> AppResult<String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Post cannot be empty".into()));
    }
    if content.chars().count() > max_chars {
        return Err(AppError::BadRequest(format!(
            "Post must be {} characters or less",
            max_chars
        )));
    }
    Ok(content.to_string())
}

fn check_attachment_count(count: usize, max: usize) -> AppResult<()> {
    if count > max {
        return Err(AppError::BadRequest(format!(
            "A post can carry at most {} images",
            max
        )));
    }
    Ok(())
}

/// Store uploads as `posts/<uid>/...` blobs and return their URLs. On
/// failure, blobs already written by this call are removed again.
async fn store_uploads(state: &AppState, uid: &str, uploads: Vec<MediaUpload>) -> AppResult<Vec<String>> {
    let millis = Utc::now().timestamp_millis();
    let mut urls = Vec::with_capacity(uploads.len());

    for (index, upload) in uploads.into_iter().enumerate() {
        let name = if upload.file_name.is_empty() {
            format!("upload.{}", upload.kind.extension())
        } else {
            upload.file_name
        };
        let stored = match BlobKey::for_post_media(uid, millis, index, &name) {
            Ok(key) => state.blobs.put(&key, upload.data).await.map(|_| key.url()),
            Err(e) => Err(e),
        };
        match stored {
            Ok(url) => urls.push(url),
            Err(e) => {
                discard_media(state, &urls).await;
                return Err(e.into());
            }
        }
    }

    Ok(urls)
}

/// Best-effort cleanup of blobs that no post references.
async fn discard_media(state: &AppState, urls: &[String]) {
    if let Err(e) = storage::delete_urls(state.blobs.as_ref(), urls).await {
        tracing::warn!("Failed to clean up media: {}", e);
    }
}

fn load_own_post(state: &AppState, user: &CurrentUser, id: &str) -> AppResult<Post> {
    let conn = state.db.get()?;
    let post = posts::get(&conn, id)?.ok_or(AppError::NotFound)?;
    if post.author_id != user.id {
        return Err(AppError::Forbidden);
    }
    Ok(post)
}

fn card_or_redirect(state: &AppState, user: &CurrentUser, post: Post, fragment: bool) -> AppResult<Response> {
    if !fragment {
        return Ok(Redirect::to("/").into_response());
    }
    let conn = state.db.get()?;
    Ok(Html(post_card(&conn, user, post)?).into_response())
}

// --- Router ---

pub fn router(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/{id}", axum::routing::delete(delete_post))
        .route("/posts/{id}/edit", get(edit_page).post(edit_post))
        .route("/posts/{id}/delete", get(delete_page).post(delete_post))
        .route("/posts/{id}/like", post(toggle_like))
        .layer(DefaultBodyLimit::max(body_limit))
}

// --- Handlers ---

/// POST /posts — multipart `content` plus up to N `media` files
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    WantsFragment(fragment): WantsFragment,
    multipart: Multipart,
) -> AppResult<Response> {
    let limits = &state.config.media;
    let submission = PostSubmission::read(multipart, limits.max_upload_bytes).await?;
    let content = validate_content(&submission.content, state.config.posts.max_chars)?;
    check_attachment_count(submission.uploads.len(), limits.max_attachments)?;

    let media_urls = store_uploads(&state, &user.id, submission.uploads).await?;

    let post = Post {
        id: uuid::Uuid::now_v7().to_string(),
        author_id: user.id.clone(),
        content,
        media_urls,
        created_at: Utc::now(),
        likes: 0,
        author_display_name: if user.display_name.is_empty() {
            "Unknown".to_string()
        } else {
            user.display_name.clone()
        },
        author_username: user.username.clone().unwrap_or_else(|| "unknown".to_string()),
        author_photo_url: user.photo_url.clone(),
    };

    let inserted = {
        let conn = state.db.get()?;
        posts::insert(&conn, &post)
    };
    if let Err(e) = inserted {
        discard_media(&state, &post.media_urls).await;
        return Err(e.into());
    }

    tracing::info!(post_id = %post.id, author_id = %post.author_id, media = post.media_urls.len(), "Post created");
    state.feed.publish(FeedEvent::Created(post.clone()));

    let response = card_or_redirect(&state, &user, post, fragment)?;
    Ok(if fragment {
        (StatusCode::CREATED, response).into_response()
    } else {
        response
    })
}

/// GET /posts/{id}/edit
async fn edit_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Html<EditPostTemplate>> {
    let post = load_own_post(&state, &user, &id)?;
    Ok(Html(EditPostTemplate {
        post: PostView::new(post, &user.id, false),
        max_chars: state.config.posts.max_edit_chars,
        max_attachments: state.config.media.max_attachments,
    }))
}

/// POST /posts/{id}/edit — new content, the kept subset of existing media,
/// and any new uploads
async fn edit_post(
    State(state): State<AppState>,
    user: CurrentUser,
    WantsFragment(fragment): WantsFragment,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    let existing = load_own_post(&state, &user, &id)?;

    let limits = &state.config.media;
    let submission = PostSubmission::read(multipart, limits.max_upload_bytes).await?;
    let content = validate_content(&submission.content, state.config.posts.max_edit_chars)?;

    let (kept, removed): (Vec<String>, Vec<String>) = existing
        .media_urls
        .iter()
        .cloned()
        .partition(|url| submission.keep_media.contains(url));
    check_attachment_count(kept.len() + submission.uploads.len(), limits.max_attachments)?;

    let added = store_uploads(&state, &user.id, submission.uploads).await?;
    let media_urls: Vec<String> = kept.into_iter().chain(added.iter().cloned()).collect();
    let author_username = user.username.clone().unwrap_or_else(|| "unknown".to_string());

    let updated = {
        let conn = state.db.get()?;
        posts::update(&conn, &id, &content, &media_urls, &author_username)
    };
    let updated = match updated {
        Ok(Some(post)) => post,
        Ok(None) => {
            discard_media(&state, &added).await;
            return Err(AppError::NotFound);
        }
        Err(e) => {
            discard_media(&state, &added).await;
            return Err(e.into());
        }
    };

    tracing::info!(post_id = %id, removed = removed.len(), added = added.len(), "Post edited");
    state.feed.publish(FeedEvent::Updated(updated.clone()));

    // The edit is committed; a blob that will not go away is only logged.
    discard_media(&state, &removed).await;

    card_or_redirect(&state, &user, updated, fragment)
}

/// GET /posts/{id}/delete — confirmation
async fn delete_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Html<DeletePostTemplate>> {
    let post = load_own_post(&state, &user, &id)?;
    Ok(Html(DeletePostTemplate { post_id: post.id }))
}

/// POST /posts/{id}/delete and DELETE /posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    WantsFragment(fragment): WantsFragment,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let post = load_own_post(&state, &user, &id)?;

    storage::delete_urls(state.blobs.as_ref(), &post.media_urls).await?;
    let removed = {
        let conn = state.db.get()?;
        posts::delete(&conn, &post.id)?
    };
    if !removed {
        return Err(AppError::NotFound);
    }

    tracing::info!(post_id = %post.id, "Post deleted");
    state.feed.publish(FeedEvent::Deleted { id: post.id });

    if fragment {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(Redirect::to("/").into_response())
    }
}

/// POST /posts/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    WantsFragment(fragment): WantsFragment,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let (post, liked) = {
        let mut conn = state.db.get()?;
        posts::toggle_like(&mut conn, &id, &user.id)?.ok_or(AppError::NotFound)?
    };

    tracing::debug!(post_id = %post.id, liked, likes = post.likes, "Like toggled");
    state.feed.publish(FeedEvent::Updated(post.clone()));

    card_or_redirect(&state, &user, post, fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(validate_content("  hi  ", 140).unwrap(), "hi");
        assert!(validate_content("   ", 140).is_err());
        assert!(validate_content(&"x".repeat(141), 140).is_err());
        // limits count characters, not bytes
        assert!(validate_content(&"가".repeat(140), 140).is_ok());
    }

    #[test]
    fn attachment_count_is_capped() {
        assert!(check_attachment_count(4, 4).is_ok());
        assert!(matches!(check_attachment_count(5, 4), Err(AppError::BadRequest(_))));
    }
}
