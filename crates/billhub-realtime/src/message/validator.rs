//! Frame-level validation rules applied before parsing.

use billhub_core::error::AppError;

/// Rejects empty or oversized inbound frames.
pub fn validate_frame(raw: &str, max_size: usize) -> Result<(), AppError> {
    if raw.len() > max_size {
        return Err(AppError::validation(format!(
            "Message exceeds maximum size of {max_size} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    Ok(())
}

/// Checks chat content against the configured length limit.
pub fn validate_content(content: &str, max_chars: usize) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::validation("Message content must not be empty"));
    }
    if content.chars().count() > max_chars {
        return Err(AppError::validation(format!(
            "Message content exceeds {max_chars} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_limits() {
        assert!(validate_frame(r#"{"event":"pong"}"#, 64).is_ok());
        assert!(validate_frame("   ", 64).is_err());
        assert!(validate_frame(&"x".repeat(65), 64).is_err());
    }

    #[test]
    fn test_content_limits() {
        assert!(validate_content("hello", 5).is_ok());
        assert!(validate_content("héllo!", 5).is_err());
        assert!(validate_content(" \n ", 5).is_err());
    }
}
