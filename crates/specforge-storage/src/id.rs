//! Session identifier validation.
//!
//! Session ids become file names, so anything outside a conservative
//! character set is rejected before it reaches the filesystem.

use crate::error::{Error, Result};

/// Longest accepted session id.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Accept ids made of ASCII letters, digits, `-` and `_`.
///
/// # Example
/// ```
/// use specforge_storage::validate_session_id;
/// assert!(validate_session_id("3f2a-91_b").is_ok());
/// assert!(validate_session_id("../etc/passwd").is_err());
/// ```
pub fn validate_session_id(id: &str) -> Result<&str> {
    if id.is_empty() {
        return Err(Error::InvalidInput("session id is empty".to_string()));
    }

    if id.len() > MAX_SESSION_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "session id longer than {} characters",
            MAX_SESSION_ID_LEN
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidInput(format!(
            "session id contains invalid characters: {}",
            id
        )));
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_uuid() {
        assert!(validate_session_id("0b6f7a9e-2c1d-4c3a-9f55-0a1b2c3d4e5f").is_ok());
    }

    #[test]
    fn test_rejects_traversal_and_separators() {
        assert!(validate_session_id("..").is_err());
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id("a\\b").is_err());
        assert!(validate_session_id("a.json").is_err());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id(&"x".repeat(129)).is_err());
    }
}
