//! Sign-in and sign-up form checks, applied before the auth provider is called.

use super::error::{ApiError, ApiResult};

pub const MIN_PASSWORD_CHARS: usize = 8;

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

pub fn validate_sign_in(email: &str, password: &str) -> ApiResult<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::invalid_credentials(
            "Email and password are required",
        ));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::invalid_credentials(
            "Password must be at least 8 characters long",
        ));
    }
    Ok(())
}

pub fn validate_sign_up(email: &str, password: &str, username: &str) -> ApiResult<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::invalid_credentials(
            "Email and password are required",
        ));
    }
    if username.trim().is_empty() {
        return Err(ApiError::invalid_credentials(
            "Username is required for signup",
        ));
    }
    validate_sign_in(email, password)?;

    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let special = password.chars().any(|c| SPECIAL_CHARS.contains(c));
    if !(upper && lower && digit && special) {
        return Err(ApiError::invalid_credentials(
            "Password must contain uppercase, lowercase, number, and special character",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_requires_fields() {
        assert!(validate_sign_in("", "password1").is_err());
        assert!(validate_sign_in("a@b.c", "").is_err());
        let err = validate_sign_in("a@b.c", "short").unwrap_err();
        assert!(err.message.contains("at least 8"));
        assert!(validate_sign_in("a@b.c", "longenough").is_ok());
    }

    #[test]
    fn test_sign_up_strength() {
        assert!(validate_sign_up("a@b.c", "Abcdef1!", "ann").is_ok());

        let err = validate_sign_up("a@b.c", "abcdef1!", "ann").unwrap_err();
        assert!(err.message.contains("uppercase"));
        assert!(validate_sign_up("a@b.c", "Abcdefg!", "ann").is_err());
        assert!(validate_sign_up("a@b.c", "Abcdefg1", "ann").is_err());
        // '_' is not in the accepted special set
        assert!(validate_sign_up("a@b.c", "Abcdef1_", "ann").is_err());
    }

    #[test]
    fn test_sign_up_requires_username() {
        let err = validate_sign_up("a@b.c", "Abcdef1!", " ").unwrap_err();
        assert_eq!(err.message, "Username is required for signup");
    }
}
