use rand::Rng;
use rusqlite::params;

use crate::error::AppResult;
use crate::state::DbPool;

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: &str, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    tracing::info!(user_id, "Session created");
    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Remove sessions whose expiry has passed. Returns how many were removed.
pub fn purge_expired(pool: &DbPool) -> AppResult<usize> {
    let conn = pool.get()?;
    let removed = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )?;
    Ok(removed)
}

pub fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name,
        token,
        max_age_hours * 3600
    )
}

pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now_timestamp, test_pool};

    fn seed_user(pool: &DbPool) {
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO users (id, email, password_hash, display_name, created_at)
                 VALUES ('u1', 'u1@example.com', 'x', 'U One', ?1)",
                params![now_timestamp()],
            )
            .unwrap();
    }

    fn session_count(pool: &DbPool) -> i64 {
        pool.get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn create_then_delete_session() {
        let pool = test_pool();
        seed_user(&pool);
        let token = create_session(&pool, "u1", 1).unwrap();
        assert_eq!(session_count(&pool), 1);
        delete_session(&pool, &token).unwrap();
        assert_eq!(session_count(&pool), 0);
    }

    #[test]
    fn purge_removes_only_expired_sessions() {
        let pool = test_pool();
        seed_user(&pool);
        create_session(&pool, "u1", 1).unwrap();
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO sessions (id, user_id, token, expires_at)
                 VALUES ('old', 'u1', 'stale', datetime('now', '-1 hours'))",
                [],
            )
            .unwrap();

        assert_eq!(purge_expired(&pool).unwrap(), 1);
        assert_eq!(session_count(&pool), 1);
    }

    #[test]
    fn cookies_carry_name_and_lifetime() {
        assert_eq!(
            session_cookie("wren_session", "tok", 2),
            "wren_session=tok; HttpOnly; SameSite=Lax; Path=/; Max-Age=7200"
        );
        assert!(clear_session_cookie("wren_session").contains("Max-Age=0"));
    }
}
