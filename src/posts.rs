//! Post persistence. Every function takes a borrowed connection so callers
//! decide how long they hold a pooled connection.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::format_timestamp;
use crate::db::models::{Post, POST_COLUMNS};
use crate::feed::{Cursor, Timeline};

pub fn insert(conn: &Connection, post: &Post) -> Result<(), rusqlite::Error> {
    let media_json = media_to_json(&post.media_urls)?;
    conn.execute(
        "INSERT INTO posts (id, author_id, content, media_urls, created_at, likes,
                            author_display_name, author_username, author_photo_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            post.id,
            post.author_id,
            post.content,
            media_json,
            format_timestamp(&post.created_at),
            post.likes,
            post.author_display_name,
            post.author_username,
            post.author_photo_url,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Post>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
        params![id],
        Post::from_row,
    )
    .optional()
}

/// Overwrite the editable fields of a post and return the stored result.
pub fn update(
    conn: &Connection,
    id: &str,
    content: &str,
    media_urls: &[String],
    author_username: &str,
) -> Result<Option<Post>, rusqlite::Error> {
    let media_json = media_to_json(media_urls)?;
    let changed = conn.execute(
        "UPDATE posts SET content = ?1, media_urls = ?2, author_username = ?3 WHERE id = ?4",
        params![content, media_json, author_username, id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get(conn, id)
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool, rusqlite::Error> {
    let removed = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

/// One page of the global timeline, newest first, starting after `after`.
///
/// One extra row is fetched to learn whether a further page exists; the
/// returned cursor is `None` once the collection is exhausted.
pub fn page(
    conn: &Connection,
    after: Option<&Cursor>,
    limit: usize,
) -> Result<Timeline, rusqlite::Error> {
    let fetch = (limit + 1) as i64;
    let mut posts: Vec<Post> = match after {
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM posts ORDER BY created_at DESC, id DESC LIMIT ?1",
                POST_COLUMNS
            ))?;
            let rows = stmt.query_map(params![fetch], Post::from_row)?;
            rows.collect::<Result<_, _>>()?
        }
        Some(cursor) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM posts
                 WHERE created_at < ?1 OR (created_at = ?1 AND id < ?2)
                 ORDER BY created_at DESC, id DESC LIMIT ?3",
                POST_COLUMNS
            ))?;
            let rows = stmt.query_map(params![cursor.created_at, cursor.id, fetch], Post::from_row)?;
            rows.collect::<Result<_, _>>()?
        }
    };

    let next = if posts.len() > limit {
        posts.truncate(limit);
        posts.last().map(Cursor::after)
    } else {
        None
    };

    Ok(Timeline::new(posts, next))
}

/// Every post written by one author, newest first.
pub fn by_author(conn: &Connection, author_id: &str) -> Result<Vec<Post>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts WHERE author_id = ?1 ORDER BY created_at DESC, id DESC",
        POST_COLUMNS
    ))?;
    let rows = stmt.query_map(params![author_id], Post::from_row)?;
    rows.collect()
}

/// Flip `user_id`'s like on a post. Returns the updated post and whether it
/// is now liked, or `None` when the post does not exist.
pub fn toggle_like(
    conn: &mut Connection,
    post_id: &str,
    user_id: &str,
) -> Result<Option<(Post, bool)>, rusqlite::Error> {
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |r| r.get(0),
    )?;
    if !exists {
        return Ok(None);
    }

    let removed = tx.execute(
        "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
        params![post_id, user_id],
    )?;
    let liked = removed == 0;
    if liked {
        tx.execute(
            "INSERT INTO post_likes (post_id, user_id) VALUES (?1, ?2)",
            params![post_id, user_id],
        )?;
    }

    tx.execute(
        "UPDATE posts SET likes = (SELECT COUNT(*) FROM post_likes WHERE post_id = ?1) WHERE id = ?1",
        params![post_id],
    )?;

    let post = tx.query_row(
        &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
        params![post_id],
        Post::from_row,
    )?;
    tx.commit()?;

    Ok(Some((post, liked)))
}

/// The subset of `post_ids` that `user_id` has liked.
pub fn liked_ids(
    conn: &Connection,
    user_id: &str,
    post_ids: &[&str],
) -> Result<HashSet<String>, rusqlite::Error> {
    let mut stmt =
        conn.prepare_cached("SELECT COUNT(*) > 0 FROM post_likes WHERE post_id = ?1 AND user_id = ?2")?;
    let mut liked = HashSet::new();
    for id in post_ids {
        let hit: bool = stmt.query_row(params![id, user_id], |r| r.get(0))?;
        if hit {
            liked.insert(id.to_string());
        }
    }
    Ok(liked)
}

fn media_to_json(media_urls: &[String]) -> Result<String, rusqlite::Error> {
    serde_json::to_string(media_urls).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}
