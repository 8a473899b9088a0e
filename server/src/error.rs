//! Error types for the session core and the room layer.

use thiserror::Error;

/// Reasons a connection is refused entry to a room. The display text is
/// sent to the client verbatim before its connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Room is full")]
    RoomFull,
    #[error("Game already in progress")]
    GameInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot deal roles to {0} players, a round needs 4 or 5")]
    InvalidPlayerCount(usize),
    #[error("player list contains duplicate identities")]
    DuplicatePlayer,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error("Room is unavailable, try again")]
    RoomUnavailable,
    #[error("Room id and player id are required")]
    MissingIdentity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_messages() {
        assert_eq!(AdmissionError::RoomFull.to_string(), "Room is full");
        assert_eq!(
            AdmissionError::GameInProgress.to_string(),
            "Game already in progress"
        );
    }

    #[test]
    fn test_join_error_keeps_admission_message() {
        let err: JoinError = AdmissionError::RoomFull.into();
        assert_eq!(err.to_string(), "Room is full");
    }
}
