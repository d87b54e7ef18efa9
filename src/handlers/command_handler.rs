use log::{info, warn};

use crate::{
    error::QuizError,
    handlers::room_handler::{spawn_room, ClientRequest, RoomHandle},
    helpers::{normalize_nickname, normalize_pin},
    models::communication::{Command, Response},
    server_messages::send_message,
    state::ServerState,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    pub pin: String,
    pub nickname: String,
}

/// Per-connection context. A connection is in at most one room at a time.
#[derive(Debug)]
pub struct ConnectionSession {
    pub connection_id: String,
    pub membership: Option<Membership>,
}

impl ConnectionSession {
    pub fn new(connection_id: String) -> ConnectionSession {
        ConnectionSession {
            connection_id,
            membership: None,
        }
    }

    /// A membership whose room has been retired no longer binds the connection.
    fn ensure_free(&mut self, state: &ServerState) -> Result<(), QuizError> {
        match &self.membership {
            Some(membership) if state.registry.get_room(&membership.pin).is_some() => {
                Err(QuizError::AlreadyInRoom(membership.pin.clone()))
            }
            Some(_) => {
                self.membership = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn member_room(&mut self, state: &ServerState, pin: &str) -> Result<RoomHandle, QuizError> {
        let pin = normalize_pin(pin)?;
        match &self.membership {
            Some(membership) if membership.pin == pin => (),
            _ => return Err(QuizError::NotInRoom(pin)),
        }
        match state.registry.get_room(&pin) {
            Some(room) => Ok(room),
            None => {
                self.membership = None;
                Err(QuizError::RoomNotFound(pin))
            }
        }
    }

    fn forget_closed_room(&mut self, result: &Result<(), QuizError>) {
        if let Err(QuizError::RoomClosed(pin)) = result {
            if self.membership.as_ref().map(|m| &m.pin) == Some(pin) {
                self.membership = None;
            }
        }
    }
}

pub async fn execute_command(command: Command, state: &ServerState, session: &mut ConnectionSession) {
    let connection_id = session.connection_id.clone();
    let result = match command {
        Command::create_room { nickname } => create_room(&nickname, state, session),
        Command::join_room_pin { nickname, roomPin } => {
            info!("Join Room request from: {}", &connection_id);
            join_room(&nickname, &roomPin, state, session).await
        }
        Command::rejoin_room_check { roomPin, nickname } => {
            info!("Rejoin request from: {}", &connection_id);
            rejoin_room(&nickname, &roomPin, state, session).await
        }
        Command::start_quiz_for_room { roomPin } => {
            info!("Start quiz request from: {}", &connection_id);
            match session.member_room(state, &roomPin) {
                Ok(room) => room.request(&connection_id, ClientRequest::Start).await,
                Err(error) => Err(error),
            }
        }
        Command::submit_answer {
            roomPin,
            questionId,
            selectedOptionId,
        } => match session.member_room(state, &roomPin) {
            Ok(room) => {
                room.request(
                    &connection_id,
                    ClientRequest::Submit {
                        question_id: questionId,
                        selected_option_id: selectedOptionId,
                    },
                )
                .await
            }
            Err(error) => Err(error),
        },
        Command::leave_room { roomPin } => {
            info!("Leave request from: {}", &connection_id);
            let result = match session.member_room(state, &roomPin) {
                Ok(room) => room.request(&connection_id, ClientRequest::Leave).await,
                Err(error) => Err(error),
            };
            if !matches!(result, Err(QuizError::NotInRoom(_))) {
                session.membership = None;
            }
            result
        }
        Command::heartbeat => {
            info!("Heartbeat from: {}", &connection_id);
            Ok(())
        }
    };

    session.forget_closed_room(&result);
    if let Err(error) = result {
        warn!(
            "Command from {} failed ({:?}): {}",
            &connection_id,
            error.kind(),
            error
        );
        send_message(&error_response(error), &state.peers, &connection_id);
    }
}

pub fn error_response(error: QuizError) -> Response {
    match error {
        QuizError::RoomNotFoundOnRejoin(pin) => Response::room_not_found_on_rejoin {
            message: QuizError::RoomNotFoundOnRejoin(pin.clone()).to_string(),
            roomPin: pin,
        },
        error => Response::room_error {
            message: error.to_string(),
        },
    }
}

fn create_room(
    nickname: &str,
    state: &ServerState,
    session: &mut ConnectionSession,
) -> Result<(), QuizError> {
    info!("Create Room request from: {}", &session.connection_id);
    let nickname = normalize_nickname(nickname)?;
    session.ensure_free(state)?;

    let room = state.registry.create_room(|pin| {
        spawn_room(state, pin, nickname.clone(), session.connection_id.clone())
    })?;
    session.membership = Some(Membership {
        pin: room.pin().to_string(),
        nickname,
    });
    Ok(())
}

async fn join_room(
    nickname: &str,
    pin: &str,
    state: &ServerState,
    session: &mut ConnectionSession,
) -> Result<(), QuizError> {
    let nickname = normalize_nickname(nickname)?;
    let pin = normalize_pin(pin)?;
    session.ensure_free(state)?;

    let room = state
        .registry
        .get_room(&pin)
        .ok_or_else(|| QuizError::RoomNotFound(pin.clone()))?;
    room.request(
        &session.connection_id,
        ClientRequest::Join {
            nickname: nickname.clone(),
        },
    )
    .await?;
    session.membership = Some(Membership { pin, nickname });
    Ok(())
}

/// Explicit reconnection. Identical whether the transport reconnected or the
/// page was reloaded; only the PIN and nickname matter.
async fn rejoin_room(
    nickname: &str,
    pin: &str,
    state: &ServerState,
    session: &mut ConnectionSession,
) -> Result<(), QuizError> {
    let nickname = normalize_nickname(nickname)?;
    let pin = normalize_pin(pin)?;
    let room = state
        .registry
        .get_room(&pin)
        .ok_or_else(|| QuizError::RoomNotFoundOnRejoin(pin.clone()))?;

    let target = Membership {
        pin: pin.clone(),
        nickname: nickname.clone(),
    };
    if let Some(previous) = &session.membership {
        if *previous != target {
            if let Some(old_room) = state.registry.get_room(&previous.pin) {
                old_room.disconnect(&session.connection_id);
            }
            session.membership = None;
        }
    }

    match room
        .request(&session.connection_id, ClientRequest::Rejoin { nickname })
        .await
    {
        Ok(()) => {
            session.membership = Some(target);
            Ok(())
        }
        // the room was retired between lookup and request
        Err(QuizError::RoomClosed(_)) => {
            session.membership = None;
            Err(QuizError::RoomNotFoundOnRejoin(pin))
        }
        Err(error) => Err(error),
    }
}

/// Transport closed: the room keeps the player's slot for its grace period.
pub fn handle_disconnect(state: &ServerState, session: &mut ConnectionSession) {
    if let Some(membership) = session.membership.take() {
        match state.registry.get_room(&membership.pin) {
            Some(room) => room.disconnect(&session.connection_id),
            None => info!(
                "Room {} of {} is already gone",
                &membership.pin, &session.connection_id
            ),
        }
    }
}
