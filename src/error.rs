use std::io;

use thiserror::Error;

/// Taxonomy class of a [`QuizError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Lookup,
    Conflict,
    State,
    Resource,
}

/// Every recoverable failure a client request can run into.
///
/// These never tear down a room or the registry; they are reported back to
/// the connection that caused them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizError {
    #[error("Nickname must not be empty")]
    EmptyNickname,
    #[error("Room PIN must not be empty")]
    EmptyPin,
    #[error("Connection is already a member of room {0}")]
    AlreadyInRoom(String),
    #[error("You are not a player in room {0}")]
    NotInRoom(String),
    #[error("Room {0} does not exist")]
    RoomNotFound(String),
    #[error("Room {0} no longer exists")]
    RoomNotFoundOnRejoin(String),
    #[error("Nickname {0} is already taken in this room")]
    NicknameTaken(String),
    #[error("An answer for this question was already submitted")]
    DuplicateSubmission,
    #[error("Question {0} is not open for answers")]
    StaleQuestion(String),
    #[error("Quiz is already in progress")]
    QuizAlreadyStarted,
    #[error("Quiz has already ended")]
    QuizAlreadyEnded,
    #[error("Only the host can start the quiz")]
    NotHost,
    #[error("Room has no host, the quiz cannot be started")]
    HostMissing,
    #[error("Room {0} is closing")]
    RoomClosed(String),
    #[error("Question bank is empty")]
    EmptyQuestionBank,
    #[error("No free room PIN is available")]
    RegistryFull,
    #[error("Question index {index} is out of range for {count} questions")]
    IndexOutOfRange { index: usize, count: usize },
}

impl QuizError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuizError::EmptyNickname
            | QuizError::EmptyPin
            | QuizError::AlreadyInRoom(_)
            | QuizError::NotInRoom(_) => ErrorKind::Validation,
            QuizError::RoomNotFound(_) | QuizError::RoomNotFoundOnRejoin(_) => ErrorKind::Lookup,
            QuizError::NicknameTaken(_) | QuizError::DuplicateSubmission => ErrorKind::Conflict,
            QuizError::StaleQuestion(_)
            | QuizError::QuizAlreadyStarted
            | QuizError::QuizAlreadyEnded
            | QuizError::NotHost
            | QuizError::HostMissing
            | QuizError::RoomClosed(_) => ErrorKind::State,
            QuizError::EmptyQuestionBank
            | QuizError::RegistryFull
            | QuizError::IndexOutOfRange { .. } => ErrorKind::Resource,
        }
    }
}

/// Failures while bringing the server up. These end the process.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid value {value:?} for {name}")]
    InvalidSetting { name: &'static str, value: String },
    #[error("Could not read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("Question pack is malformed: {0}")]
    PackFormat(#[from] serde_json::Error),
    #[error("Question pack is invalid: {0}")]
    PackInvalid(String),
    #[error("TLS identity could not be loaded: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("Logger could not be initialized: {0}")]
    Logger(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(QuizError::EmptyNickname.kind(), ErrorKind::Validation);
        assert_eq!(
            QuizError::RoomNotFoundOnRejoin("AB".into()).kind(),
            ErrorKind::Lookup
        );
        assert_eq!(QuizError::DuplicateSubmission.kind(), ErrorKind::Conflict);
        assert_eq!(QuizError::HostMissing.kind(), ErrorKind::State);
        assert_eq!(QuizError::RegistryFull.kind(), ErrorKind::Resource);
    }

    #[test]
    fn messages_name_the_room() {
        assert_eq!(
            QuizError::RoomNotFound("XXXX".into()).to_string(),
            "Room XXXX does not exist"
        );
    }
}
