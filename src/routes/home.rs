use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::posts;
use crate::routes::views::{timeline_page, PostView};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub viewer_username: String,
    pub photo_url: Option<String>,
    pub max_chars: usize,
    pub max_attachments: usize,
    pub posts: Vec<PostView>,
    pub next_cursor: Option<String>,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// GET / — composer plus the head of the live timeline. Gated.
pub async fn index(State(state): State<AppState>, user: CurrentUser) -> AppResult<Html<HomeTemplate>> {
    let page = {
        let conn = state.db.get()?;
        let timeline = posts::page(&conn, None, state.config.feed.page_size)?;
        timeline_page(&conn, &user, timeline)?
    };

    Ok(Html(HomeTemplate {
        viewer_username: user.username.clone().unwrap_or_default(),
        photo_url: user.photo_url.clone(),
        max_chars: state.config.posts.max_chars,
        max_attachments: state.config.media.max_attachments,
        posts: page.posts,
        next_cursor: page.next_cursor,
    }))
}
