//! Errors for local board mutations.

use thiserror::Error;

/// A local edit that cannot be applied to the board.
///
/// Placement rule failures are not errors; see [`crate::Violation`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    /// No user with this id owns characters on the board.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// The user has no character with this name.
    #[error("unknown character {name} for user {user_id}")]
    UnknownCharacter { user_id: String, name: String },

    /// The user already owns a character with this name.
    #[error("character {name} already exists for user {user_id}")]
    DuplicateCharacter { user_id: String, name: String },

    /// A raid with this name already exists.
    #[error("raid already exists: {0}")]
    DuplicateRaid(String),

    /// No raid with this name exists.
    #[error("unknown raid: {0}")]
    UnknownRaid(String),

    /// A name was empty after trimming.
    #[error("{0} name cannot be empty")]
    EmptyName(&'static str),

    /// A list index does not point at an existing item.
    #[error("{list} index {index} out of range (len {len})")]
    IndexOutOfRange {
        list: &'static str,
        index: usize,
        len: usize,
    },
}
