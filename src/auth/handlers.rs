use askama::Template;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::Form;
use rusqlite::ffi::ErrorCode;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::auth::password::{hash_password, validate_signup, verify_password};
use crate::auth::session;
use crate::db::models::User;
use crate::db::now_timestamp;
use crate::error::{AppError, AppResult};
use crate::extractors::{cookie_value, MaybeUser};
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub email: String,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub error: Option<String>,
    pub name: String,
    pub email: String,
}

// -- Forms --

#[derive(Deserialize)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Redirect that also installs a fresh session cookie.
fn signed_in_redirect(state: &AppState, token: &str, to: &str) -> Response {
    let cookie = session::session_cookie(
        &state.config.auth.cookie_name,
        token,
        state.config.auth.session_hours,
    );
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Redirect::to(to),
    )
        .into_response()
}

async fn run_blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {}", e)))?
}

// -- Signup --

/// GET /signup
pub async fn signup_page(MaybeUser(user): MaybeUser) -> AppResult<Response> {
    if let Some(user) = user {
        let to = if user.has_profile() { "/" } else { "/username" };
        return Ok(Redirect::to(to).into_response());
    }

    Ok(Html(SignupTemplate {
        error: None,
        name: String::new(),
        email: String::new(),
    })
    .into_response())
}

/// POST /signup — create an account, sign in, continue to handle setup
pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    let name = form.name.trim().to_string();
    let email = form.email.trim().to_lowercase();

    let rejected = |status: StatusCode, message: &str| {
        (
            status,
            Html(SignupTemplate {
                error: Some(message.to_string()),
                name: name.clone(),
                email: email.clone(),
            }),
        )
            .into_response()
    };

    if let Err(message) = validate_signup(&name, &email, &form.password) {
        return Ok(rejected(StatusCode::BAD_REQUEST, message));
    }

    let taken: bool = {
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
            params![email],
            |r| r.get(0),
        )?
    };
    if taken {
        return Ok(rejected(StatusCode::CONFLICT, "That email is already in use"));
    }

    let cost = state.config.auth.bcrypt_cost;
    let password = form.password;
    let password_hash = run_blocking(move || hash_password(&password, cost)).await?;

    let user_id = uuid::Uuid::now_v7().to_string();
    let inserted = {
        let conn = state.db.get()?;
        insert_user(&conn, &user_id, &email, &password_hash, &name)
    };
    match inserted {
        Ok(()) => {}
        Err(AppError::Conflict(message)) => {
            return Ok(rejected(StatusCode::CONFLICT, message.as_str()));
        }
        Err(e) => return Err(e),
    }
    tracing::info!(user_id = %user_id, "Account created");

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    Ok(signed_in_redirect(&state, &token, "/username"))
}

/// Insert a new account. A concurrent signup that claimed the same email
/// first surfaces as a conflict.
fn insert_user(
    conn: &Connection,
    id: &str,
    email: &str,
    password_hash: &str,
    display_name: &str,
) -> AppResult<()> {
    let inserted = conn.execute(
        "INSERT INTO users (id, email, password_hash, display_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, email, password_hash, display_name, now_timestamp()],
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(AppError::Conflict("That email is already in use".into()))
        }
        Err(e) => Err(e.into()),
    }
}

// -- Login --

/// GET /login
pub async fn login_page(MaybeUser(user): MaybeUser) -> AppResult<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    Ok(Html(LoginTemplate {
        error: None,
        email: String::new(),
    })
    .into_response())
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_lowercase();

    let user: Option<User> = {
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT id, email, password_hash, display_name, photo_url, created_at
             FROM users WHERE email = ?1",
            params![email],
            User::from_row,
        )
        .optional()?
    };

    let verified = match user {
        Some(user) => {
            let password = form.password;
            let hash = user.password_hash.clone();
            let ok = run_blocking(move || Ok(verify_password(&password, &hash))).await?;
            ok.then_some(user)
        }
        None => None,
    };

    let Some(user) = verified else {
        tracing::info!("Failed login attempt");
        return Ok((
            StatusCode::UNAUTHORIZED,
            Html(LoginTemplate {
                error: Some("Invalid email or password".to_string()),
                email,
            }),
        )
            .into_response());
    };

    let token = session::create_session(&state.db, &user.id, state.config.auth.session_hours)?;
    Ok(signed_in_redirect(&state, &token, "/"))
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = cookie_value(&headers, cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        AppendHeaders([(header::SET_COOKIE, session::clear_session_cookie(cookie_name))]),
        Redirect::to("/login"),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn insert_user_maps_duplicate_email_to_conflict() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "u1", "alice@example.com", "hash", "Alice").unwrap();

        // Lost race: the pre-check passed but another signup committed first.
        let second = insert_user(&conn, "u2", "ALICE@example.com", "hash", "Alice Again");
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[test]
    fn insert_user_stores_account() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "u1", "alice@example.com", "hash", "Alice").unwrap();

        let name: String = conn
            .query_row("SELECT display_name FROM users WHERE id = 'u1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Alice");
    }
}
