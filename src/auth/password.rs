use crate::error::AppResult;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Check a password against a stored bcrypt hash. A corrupt hash never
/// verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Input rules for a new account. Returns the message shown on the form.
pub fn validate_signup(name: &str, email: &str, password: &str) -> Result<(), &'static str> {
    let name_len = name.trim().chars().count();
    if !(2..=20).contains(&name_len) {
        return Err("Name must be 2 to 20 characters");
    }

    let email = email.trim();
    let looks_like_email = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
        .unwrap_or(false);
    if !looks_like_email {
        return Err("Enter a valid email address");
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err("Password must be at least 6 characters");
    }

    Ok(())
}
