//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: UUID-based identifier for one accepted connection
//! - `Username`: validated name fitting the 10-byte header field
//! - `RoomName`: validated name fitting the 8-byte header field

use uuid::Uuid;

use crate::codec::{ROOM_FIELD_LEN, USER_FIELD_LEN};
use crate::error::ChatError;

/// Unique session identifier (newtype pattern)
///
/// One per accepted connection. Registry removals carry it so that a
/// session can only evict its own registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate(kind: &str, value: &str, max: usize) -> Result<(), ChatError> {
    if value.is_empty() {
        return Err(ChatError::InvalidName(format!("{} must not be empty", kind)));
    }
    if value.len() > max {
        return Err(ChatError::InvalidName(format!(
            "{} '{}' is {} bytes (max {})",
            kind,
            value,
            value.len(),
            max
        )));
    }
    if value.contains('\0') {
        return Err(ChatError::InvalidName(format!("{} contains NUL", kind)));
    }
    Ok(())
}

/// Username (1..=10 bytes, no NUL)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    pub fn new(name: impl Into<String>) -> Result<Self, ChatError> {
        let name = name.into();
        validate("username", &name, USER_FIELD_LEN)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room name (1..=8 bytes, no NUL)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomName(String);

impl RoomName {
    pub fn new(name: impl Into<String>) -> Result<Self, ChatError> {
        let name = name.into();
        validate("room name", &name, ROOM_FIELD_LEN)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_username_limits() {
        assert!(Username::new("alice").is_ok());
        assert!(Username::new("0123456789").is_ok());
        assert!(matches!(
            Username::new("01234567890"),
            Err(ChatError::InvalidName(_))
        ));
        assert!(matches!(Username::new(""), Err(ChatError::InvalidName(_))));
        assert!(matches!(Username::new("a\0b"), Err(ChatError::InvalidName(_))));
    }

    #[test]
    fn test_room_name_limits() {
        assert!(RoomName::new("general").is_ok());
        assert!(RoomName::new("12345678").is_ok());
        assert!(matches!(
            RoomName::new("123456789"),
            Err(ChatError::InvalidName(_))
        ));
    }

    #[test]
    fn test_multibyte_length_is_bytes() {
        // 4 chars, 12 bytes
        assert!(Username::new("日本語語").is_err());
        assert!(RoomName::new("日本").is_ok());
    }
}
