use std::fmt;

use crate::db::models::Post;
use crate::db::{format_timestamp, parse_timestamp};
use crate::error::AppError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor is not valid hex")]
    Encoding,

    #[error("cursor is malformed")]
    Malformed,
}

impl From<CursorError> for AppError {
    fn from(err: CursorError) -> Self {
        AppError::BadRequest(format!("Invalid cursor: {}", err))
    }
}

/// Opaque continuation token pointing at the last post of a page.
///
/// Pages are ordered by `(created_at, id)` descending, so the position of
/// the last post is enough to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: String,
    pub id: String,
}

impl Cursor {
    pub fn after(post: &Post) -> Self {
        Self {
            created_at: format_timestamp(&post.created_at),
            id: post.id.clone(),
        }
    }

    pub fn encode(&self) -> String {
        hex::encode(format!("{}|{}", self.created_at, self.id))
    }

    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let raw = hex::decode(token.trim()).map_err(|_| CursorError::Encoding)?;
        let raw = String::from_utf8(raw).map_err(|_| CursorError::Malformed)?;
        let (created_at, id) = raw.split_once('|').ok_or(CursorError::Malformed)?;

        if id.is_empty() || parse_timestamp(created_at).is_none() {
            return Err(CursorError::Malformed);
        }

        Ok(Self {
            created_at: created_at.to_string(),
            id: id.to_string(),
        })
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
