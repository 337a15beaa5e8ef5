//! View models and fragment templates shared by the feed, post and profile
//! routes.

use askama::Template;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db::models::Post;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::feed::Timeline;
use crate::posts;

pub struct PostView {
    pub id: String,
    pub author_display_name: String,
    pub author_username: String,
    pub author_photo_url: Option<String>,
    pub content: String,
    pub media_urls: Vec<String>,
    pub created_at: String,
    pub created_at_iso: String,
    pub likes: i64,
    pub liked: bool,
    pub is_author: bool,
}

impl PostView {
    pub fn new(post: Post, viewer_id: &str, liked: bool) -> Self {
        Self {
            is_author: post.author_id == viewer_id,
            created_at: format_relative_time(&post.created_at),
            created_at_iso: post.created_at.to_rfc3339(),
            id: post.id,
            author_display_name: post.author_display_name,
            author_username: post.author_username,
            author_photo_url: post.author_photo_url,
            content: post.content,
            media_urls: post.media_urls,
            likes: post.likes,
            liked,
        }
    }
}

#[derive(Template)]
#[template(path = "components/post_card.html")]
pub struct PostCardTemplate {
    pub post: PostView,
}

/// A run of post cards followed by the "load more" control.
#[derive(Template)]
#[template(path = "components/timeline_page.html")]
pub struct TimelinePageTemplate {
    pub posts: Vec<PostView>,
    pub next_cursor: Option<String>,
}

/// Build viewer-specific views, looking up which posts the viewer liked.
pub fn post_views(conn: &Connection, viewer: &CurrentUser, posts: Vec<Post>) -> AppResult<Vec<PostView>> {
    let liked = {
        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        posts::liked_ids(conn, &viewer.id, &ids)?
    };

    Ok(posts
        .into_iter()
        .map(|post| {
            let is_liked = liked.contains(&post.id);
            PostView::new(post, &viewer.id, is_liked)
        })
        .collect())
}

pub fn post_card(conn: &Connection, viewer: &CurrentUser, post: Post) -> AppResult<PostCardTemplate> {
    let post = post_views(conn, viewer, vec![post])?
        .pop()
        .ok_or_else(|| crate::error::AppError::Internal("empty post view".into()))?;
    Ok(PostCardTemplate { post })
}

pub fn timeline_page(conn: &Connection, viewer: &CurrentUser, timeline: Timeline) -> AppResult<TimelinePageTemplate> {
    let next_cursor = timeline.next_cursor().map(|c| c.encode());
    let posts = post_views(conn, viewer, timeline.into_posts())?;
    Ok(TimelinePageTemplate { posts, next_cursor })
}

pub fn format_relative_time(dt: &DateTime<Utc>) -> String {
    let diff = Utc::now().signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    dt.format("%b %-d, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::sample_post;
    use chrono::{Duration, TimeZone};

    #[test]
    fn format_relative_time_just_now() {
        assert_eq!(format_relative_time(&Utc::now()), "just now");
    }

    #[test]
    fn format_relative_time_minutes() {
        let dt = Utc::now() - Duration::minutes(5);
        assert_eq!(format_relative_time(&dt), "5m ago");
    }

    #[test]
    fn format_relative_time_hours() {
        let dt = Utc::now() - Duration::hours(3);
        assert_eq!(format_relative_time(&dt), "3h ago");
    }

    #[test]
    fn format_relative_time_days() {
        let dt = Utc::now() - Duration::days(2);
        assert_eq!(format_relative_time(&dt), "2d ago");
    }

    #[test]
    fn format_relative_time_old_date() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(&dt), "Jan 15, 2025");
    }

    #[test]
    fn post_view_marks_authorship() {
        let post = sample_post("p1", "u1");
        assert!(PostView::new(post.clone(), "u1", false).is_author);
        assert!(!PostView::new(post, "u2", true).is_author);
    }

    #[test]
    fn post_card_escapes_content() {
        let mut post = sample_post("p1", "u1");
        post.content = "<script>alert(1)</script>".into();
        let html = PostCardTemplate {
            post: PostView::new(post, "u2", false),
        }
        .render()
        .unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("/posts/p1/edit"));
    }

    #[test]
    fn post_card_shows_author_menu_and_media() {
        let mut post = sample_post("p1", "u1");
        post.media_urls = vec!["/media/posts/u1/1-0-a.png".into()];
        let html = PostCardTemplate {
            post: PostView::new(post, "u1", true),
        }
        .render()
        .unwrap();
        assert!(html.contains("/posts/p1/edit"));
        assert!(html.contains("/posts/p1/delete"));
        assert!(html.contains("/media/posts/u1/1-0-a.png"));
    }

    #[test]
    fn timeline_page_renders_load_more_only_with_cursor() {
        let with_more = TimelinePageTemplate {
            posts: vec![],
            next_cursor: Some("abcd".into()),
        }
        .render()
        .unwrap();
        assert!(with_more.contains("/feed/page?after=abcd"));

        let done = TimelinePageTemplate {
            posts: vec![],
            next_cursor: None,
        }
        .render()
        .unwrap();
        assert!(!done.contains("/feed/page"));
    }
}
