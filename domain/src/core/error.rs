//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Cycle interval must cover at least one day")]
    EmptyWindow,

    #[error("Roster has no persons")]
    EmptyRoster,

    #[error("Unknown person: {0}")]
    UnknownPerson(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            DomainError::EmptyWindow.to_string(),
            "Cycle interval must cover at least one day"
        );
        assert_eq!(
            DomainError::UnknownPerson("alice".to_string()).to_string(),
            "Unknown person: alice"
        );
    }
}
