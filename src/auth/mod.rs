mod login;
mod logout;

use axum::{routing::post, Router};

use crate::{appresult::AppError, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
}

pub const MAX_USERNAME_CHARS: usize = 20;

/// Letters, digits, `_` and `-`, starting with a letter.
pub fn validate_username(username: &str) -> Result<(), AppError> {
    let mut chars = username.chars();
    let Some(first) = chars.next() else {
        return Err(AppError::invalid("username", "Username required"));
    };

    if username.chars().count() > MAX_USERNAME_CHARS
        || !first.is_ascii_alphabetic()
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::invalid("username", "Invalid username"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a_b-c9").is_ok());
        assert!(validate_username(&"a".repeat(20)).is_ok());

        assert!(validate_username("").is_err());
        assert!(validate_username("9lives").is_err());
        assert!(validate_username("no spaces").is_err());
        assert!(validate_username(&"a".repeat(21)).is_err());
    }
}
