use std::convert::Infallible;

use askama::Template;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed::{Cursor, FeedEvent};
use crate::posts;
use crate::routes::home::Html;
use crate::routes::views::{post_card, timeline_page, TimelinePageTemplate};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PageQuery {
    pub after: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed/page", get(page))
        .route("/feed/live", get(live))
}

/// GET /feed/page?after=<cursor> — the next run of cards after a cursor
async fn page(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<TimelinePageTemplate>> {
    let after = query
        .after
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(Cursor::decode)
        .transpose()?;

    let conn = state.db.get()?;
    let timeline = posts::page(&conn, after.as_ref(), state.config.feed.page_size)?;
    Ok(Html(timeline_page(&conn, &user, timeline)?))
}

/// GET /feed/live — server-sent events mirroring the posts collection.
///
/// The stream opens with a `snapshot` of the head page, then carries one
/// `created`/`updated`/`deleted` event per committed change. A subscriber
/// that lags behind the hub gets a fresh `snapshot` instead of the events it
/// missed. Closing the connection drops the subscription.
async fn live(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before reading the snapshot so no commit falls in between.
    let rx = state.feed.subscribe();
    let snapshot = snapshot_event(&state, &user)?;
    tracing::debug!(user_id = %user.id, subscribers = state.feed.subscriber_count(), "Live feed opened");

    let updates = BroadcastStream::new(rx).map(move |msg| {
        let event = match msg {
            Ok(event) => change_event(&state, &user, event),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!(user_id = %user.id, missed, "Live feed subscriber lagged, resyncing");
                snapshot_event(&state, &user)
            }
        };
        Ok::<_, Infallible>(event.unwrap_or_else(|e| {
            tracing::error!("Live feed event failed: {}", e);
            Event::default().comment("error")
        }))
    });

    let stream = stream::once(async move { Ok::<_, Infallible>(snapshot) }).chain(updates);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn snapshot_event(state: &AppState, user: &CurrentUser) -> AppResult<Event> {
    let conn = state.db.get()?;
    let timeline = posts::page(&conn, None, state.config.feed.page_size)?;
    let html = render(timeline_page(&conn, user, timeline)?)?;
    Ok(Event::default().event("snapshot").data(html))
}

fn change_event(state: &AppState, user: &CurrentUser, event: FeedEvent) -> AppResult<Event> {
    let name = event.name();
    match event {
        FeedEvent::Created(post) | FeedEvent::Updated(post) => {
            let id = post.id.clone();
            let conn = state.db.get()?;
            let html = render(post_card(&conn, user, post)?)?;
            Ok(Event::default().event(name).id(id).data(html))
        }
        FeedEvent::Deleted { id } => Ok(Event::default().event(name).id(id.clone()).data(id)),
    }
}

fn render<T: Template>(template: T) -> AppResult<String> {
    template
        .render()
        .map_err(|e| AppError::Internal(format!("Template render error: {}", e)))
}
