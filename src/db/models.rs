use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::db::parse_timestamp;

/// An account: the identity half of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public profile. `uid` equals the owning account id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub username: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub likes: i64,
    pub author_display_name: String,
    pub author_username: String,
    pub author_photo_url: Option<String>,
}

pub(crate) const POST_COLUMNS: &str = "id, author_id, content, media_urls, created_at, likes, \
     author_display_name, author_username, author_photo_url";

pub(crate) const PROFILE_COLUMNS: &str = "uid, username, display_name, photo_url, created_at";

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp: {}", raw).into(),
        )
    })
}

impl Post {
    /// Map a row selected with [`POST_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let media_json: String = row.get(3)?;
        let media_urls: Vec<String> = serde_json::from_str(&media_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        Ok(Post {
            id: row.get(0)?,
            author_id: row.get(1)?,
            content: row.get(2)?,
            media_urls,
            created_at: timestamp_column(row, 4)?,
            likes: row.get(5)?,
            author_display_name: row.get(6)?,
            author_username: row.get(7)?,
            author_photo_url: row.get(8)?,
        })
    }
}

impl UserProfile {
    /// Map a row selected with [`PROFILE_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(UserProfile {
            uid: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            photo_url: row.get(3)?,
            created_at: timestamp_column(row, 4)?,
        })
    }
}

impl User {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            display_name: row.get(3)?,
            photo_url: row.get(4)?,
            created_at: timestamp_column(row, 5)?,
        })
    }
}
