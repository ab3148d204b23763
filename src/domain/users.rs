//! Username rules.

use thiserror::Error;

pub const MAX_USERNAME_CHARS: usize = 150;

/// First path segments owned by the router; a user with one of these names
/// would have an unreachable profile.
pub const RESERVED_USERNAMES: &[&str] = &[
    "new", "follow", "group", "about", "auth", "media", "static", "_health",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsernameError {
    #[error("This field is required.")]
    Empty,
    #[error("Ensure this value has at most 150 characters (it has {len}).")]
    TooLong { len: usize },
    #[error(
        "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
    )]
    InvalidCharacters,
    #[error("This username is reserved.")]
    Reserved,
}

pub fn validate_username(username: &str) -> Result<(), UsernameError> {
    if username.is_empty() {
        return Err(UsernameError::Empty);
    }
    let len = username.chars().count();
    if len > MAX_USERNAME_CHARS {
        return Err(UsernameError::TooLong { len });
    }
    if !username
        .chars()
        .all(|ch| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(UsernameError::InvalidCharacters);
    }
    if RESERVED_USERNAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(username))
    {
        return Err(UsernameError::Reserved);
    }
    Ok(())
}
