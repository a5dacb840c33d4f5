use crate::error::{AppError, Result};

/// Validates the credential pair submitted to the setup endpoint.
///
/// The portal is the real authority on whether the pair works; this only
/// rejects input that can never log in or that the token format cannot
/// carry.
///
/// # Arguments
///
/// * `username` - The student id to validate.
/// * `password` - The portal password to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the pair is worth submitting.
pub fn validate_credentials(username: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(AppError::Validation("请填写学号".to_string()));
    }

    if username.len() > 64 {
        return Err(AppError::Validation("学号过长".to_string()));
    }

    if username.contains(':') {
        return Err(AppError::Validation("学号不能包含 ':'".to_string()));
    }

    if password.is_empty() {
        return Err(AppError::Validation("请填写密码".to_string()));
    }

    if password.len() > 128 {
        return Err(AppError::Validation("密码过长".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_plain_student_id_and_password() {
        assert!(validate_credentials("3210100000", "hunter2").is_ok());
    }

    #[test]
    fn rejects_blank_fields() {
        assert!(validate_credentials("", "hunter2").is_err());
        assert!(validate_credentials("   ", "hunter2").is_err());
        assert!(validate_credentials("3210100000", "").is_err());
    }

    #[test]
    fn rejects_a_colon_in_the_student_id() {
        let err = validate_credentials("3210:1000", "hunter2").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_oversized_fields() {
        assert!(validate_credentials(&"9".repeat(65), "hunter2").is_err());
        assert!(validate_credentials("3210100000", &"p".repeat(129)).is_err());
    }
}
