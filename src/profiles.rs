//! Public profiles: the handle chosen after signup and the avatar.

use rusqlite::ffi::ErrorCode;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{UserProfile, PROFILE_COLUMNS};
use crate::db::now_timestamp;
use crate::error::{AppError, AppResult};

pub const MAX_USERNAME_LEN: usize = 30;

/// A validated handle: ASCII letters, digits and underscores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Result<Self, &'static str> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("Choose a username");
        }
        if raw.len() > MAX_USERNAME_LEN {
            return Err("Usernames are at most 30 characters");
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err("Only letters, numbers and underscores are allowed");
        }
        Ok(Username(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn by_uid(conn: &Connection, uid: &str) -> Result<Option<UserProfile>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE uid = ?1", PROFILE_COLUMNS),
        params![uid],
        UserProfile::from_row,
    )
    .optional()
}

pub fn by_username(conn: &Connection, username: &str) -> Result<Option<UserProfile>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE username = ?1", PROFILE_COLUMNS),
        params![username],
        UserProfile::from_row,
    )
    .optional()
}

/// Create the profile for `uid`, copying display name and avatar from the
/// account. A handle can be set once; later attempts are conflicts.
pub fn create(conn: &Connection, uid: &str, username: &Username) -> AppResult<UserProfile> {
    if by_uid(conn, uid)?.is_some() {
        return Err(AppError::Conflict("Username is already set".into()));
    }

    let inserted = conn.execute(
        "INSERT INTO profiles (uid, username, display_name, photo_url, created_at)
         SELECT id, ?2, display_name, photo_url, ?3 FROM users WHERE id = ?1",
        params![uid, username.as_str(), now_timestamp()],
    );

    match inserted {
        Ok(0) => Err(AppError::NotFound),
        Ok(_) => {
            tracing::info!(uid, username = username.as_str(), "Profile created");
            by_uid(conn, uid)?.ok_or(AppError::NotFound)
        }
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(AppError::Conflict("That username is taken".into()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Point the account and the profile at a new avatar. Posts keep whatever
/// avatar they were written with.
pub fn set_photo_url(conn: &mut Connection, uid: &str, photo_url: &str) -> Result<(), rusqlite::Error> {
    let tx = conn.transaction()?;
    tx.execute("UPDATE users SET photo_url = ?1 WHERE id = ?2", params![photo_url, uid])?;
    tx.execute("UPDATE profiles SET photo_url = ?1 WHERE uid = ?2", params![photo_url, uid])?;
    tx.commit()
}
