use std::{fmt, sync::Arc, time::Instant};

use futures_channel::{
    mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    oneshot,
};
use futures_util::StreamExt;
use log::{info, warn};
use tokio::task::JoinHandle;

use crate::{
    error::QuizError,
    handlers::{
        game_handler::CloseReason,
        timeout_handler::{schedule_player_removal, schedule_question_close, schedule_room_retirement},
    },
    models::lobby::Room,
    registry::RoomRegistry,
    server_messages::{broadcast_message_room_all, Effect, Outbox, PeerMap},
    state::ServerState,
};

pub type RoomSender = UnboundedSender<RoomCommand>;

/// Operations a client can ask of a room.
#[derive(Debug)]
pub enum ClientRequest {
    Join { nickname: String },
    Rejoin { nickname: String },
    Start,
    Submit {
        question_id: String,
        selected_option_id: String,
    },
    Leave,
}

#[derive(Debug)]
pub enum RoomCommand {
    Client {
        connection_id: String,
        request: ClientRequest,
        reply: oneshot::Sender<Result<(), QuizError>>,
    },
    Disconnect {
        connection_id: String,
    },
    QuestionDeadline {
        generation: u64,
    },
    GraceExpired {
        nickname: String,
        connection_id: String,
    },
    RetirementDue {
        epoch: u64,
    },
    Shutdown,
}

/// Address of a running room actor.
#[derive(Clone)]
pub struct RoomHandle {
    pin: String,
    tx: RoomSender,
}

impl fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomHandle").field("pin", &self.pin).finish()
    }
}

impl RoomHandle {
    pub fn new(pin: String, tx: RoomSender) -> RoomHandle {
        RoomHandle { pin, tx }
    }

    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Runs `request` on the room and waits until it has been applied.
    pub async fn request(&self, connection_id: &str, request: ClientRequest) -> Result<(), QuizError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .unbounded_send(RoomCommand::Client {
                connection_id: connection_id.to_string(),
                request,
                reply,
            })
            .map_err(|_| QuizError::RoomClosed(self.pin.clone()))?;
        response
            .await
            .map_err(|_| QuizError::RoomClosed(self.pin.clone()))?
    }

    pub fn disconnect(&self, connection_id: &str) {
        let _ = self.tx.unbounded_send(RoomCommand::Disconnect {
            connection_id: connection_id.to_string(),
        });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.unbounded_send(RoomCommand::Shutdown);
    }
}

/// Room clock. Read through tokio so paused test clocks apply.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub fn spawn_room(
    state: &ServerState,
    pin: String,
    host_nickname: String,
    host_connection_id: String,
) -> RoomHandle {
    let (tx, rx) = unbounded();
    let room = Room::new(
        pin.clone(),
        host_nickname,
        host_connection_id,
        state.bank.clone(),
        state.settings.clone(),
    );
    let actor = RoomActor {
        room,
        rx,
        tx: tx.clone(),
        peers: state.peers.clone(),
        registry: state.registry.clone(),
        close_timer: None,
    };
    tokio::spawn(actor.run());
    RoomHandle::new(pin, tx)
}

/// Owns one room and applies its commands one at a time.
struct RoomActor {
    room: Room,
    rx: UnboundedReceiver<RoomCommand>,
    tx: RoomSender,
    peers: PeerMap,
    registry: Arc<RoomRegistry>,
    close_timer: Option<JoinHandle<()>>,
}

impl RoomActor {
    async fn run(mut self) {
        let mut outbox = Outbox::new();
        self.room.announce_created(&mut outbox);
        self.apply(outbox);

        while let Some(command) = self.rx.next().await {
            let now = now();
            let mut outbox = Outbox::new();
            match command {
                RoomCommand::Client {
                    connection_id,
                    request,
                    reply,
                } => {
                    let result = self.handle_request(&connection_id, request, now, &mut outbox);
                    if let Err(error) = &result {
                        warn!(
                            "Room {}: request from {} rejected: {}",
                            self.room.pin(),
                            &connection_id,
                            error
                        );
                    }
                    self.apply(outbox);
                    let _ = reply.send(result);
                    continue;
                }
                RoomCommand::Disconnect { connection_id } => {
                    self.room.disconnect(&connection_id, now, &mut outbox)
                }
                RoomCommand::QuestionDeadline { generation } => {
                    self.room
                        .close_question(generation, CloseReason::Deadline, now, &mut outbox)
                }
                RoomCommand::GraceExpired {
                    nickname,
                    connection_id,
                } => self
                    .room
                    .expire_grace(&nickname, &connection_id, now, &mut outbox),
                RoomCommand::RetirementDue { epoch } => {
                    if self.room.retirement_due(epoch) {
                        self.registry.retire_room(self.room.pin());
                        break;
                    }
                }
                RoomCommand::Shutdown => {
                    info!("Room {} shutting down", self.room.pin());
                    break;
                }
            }
            self.apply(outbox);
        }

        self.cancel_close_timer();
    }

    fn handle_request(
        &mut self,
        connection_id: &str,
        request: ClientRequest,
        now: Instant,
        outbox: &mut Outbox,
    ) -> Result<(), QuizError> {
        match request {
            ClientRequest::Join { nickname } => {
                self.room
                    .join(nickname, connection_id.to_string(), now, outbox)
            }
            ClientRequest::Rejoin { nickname } => {
                self.room
                    .rejoin(nickname, connection_id.to_string(), now, outbox)
            }
            ClientRequest::Start => self.room.start_quiz(connection_id, now, outbox),
            ClientRequest::Submit {
                question_id,
                selected_option_id,
            } => self.room.submit_answer(
                connection_id,
                &question_id,
                &selected_option_id,
                now,
                outbox,
            ),
            ClientRequest::Leave => self.room.leave(connection_id, now, outbox),
        }
    }

    fn apply(&mut self, outbox: Outbox) {
        for effect in outbox.into_effects() {
            match effect {
                Effect::Send {
                    recipients,
                    response,
                } => broadcast_message_room_all(&response, &self.peers, &recipients),
                Effect::ScheduleClose {
                    generation,
                    deadline,
                } => {
                    self.cancel_close_timer();
                    self.close_timer = Some(schedule_question_close(
                        self.tx.clone(),
                        generation,
                        deadline,
                    ));
                }
                Effect::CancelClose => self.cancel_close_timer(),
                Effect::SchedulePlayerRemoval {
                    nickname,
                    connection_id,
                    after,
                } => {
                    schedule_player_removal(self.tx.clone(), nickname, connection_id, after);
                }
                Effect::ScheduleRetirement { epoch, after } => {
                    schedule_room_retirement(self.tx.clone(), epoch, after);
                }
            }
        }
    }

    fn cancel_close_timer(&mut self) {
        if let Some(timer) = self.close_timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        helpers::lock,
        models::{
            communication::Response,
            game::{test_pack, QuestionBank, ScoringPolicy},
            lobby::{QuizState, RoomSettings},
        },
    };
    use std::time::Duration;
    use tokio::time;
    use tungstenite::Message;

    fn test_state() -> ServerState {
        ServerState::new(
            QuestionBank::from_pack(test_pack()).unwrap(),
            RoomSettings {
                scoring: ScoringPolicy::flat(100),
                ..RoomSettings::default()
            },
            5,
        )
    }

    fn connect(state: &ServerState, connection_id: &str) -> UnboundedReceiver<Message> {
        let (tx, rx) = unbounded();
        lock(&state.peers).insert(connection_id.to_string(), tx);
        rx
    }

    async fn next_response(rx: &mut UnboundedReceiver<Message>) -> Response {
        let frame = rx.next().await.expect("connection queue closed");
        serde_json::from_str(frame.to_text().unwrap()).unwrap()
    }

    async fn wait_for<F>(rx: &mut UnboundedReceiver<Message>, wanted: F) -> Response
    where
        F: Fn(&Response) -> bool,
    {
        loop {
            let response = next_response(rx).await;
            if wanted(&response) {
                return response;
            }
        }
    }

    fn create(state: &ServerState, nickname: &str, connection_id: &str) -> RoomHandle {
        state
            .registry
            .create_room(|pin| spawn_room(state, pin, nickname.to_string(), connection_id.to_string()))
            .unwrap()
    }

    fn join(nickname: &str) -> ClientRequest {
        ClientRequest::Join {
            nickname: nickname.to_string(),
        }
    }

    fn submit(question_id: &str, option: &str) -> ClientRequest {
        ClientRequest::Submit {
            question_id: question_id.to_string(),
            selected_option_id: option.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_player_quiz_with_timeout() {
        let state = test_state();
        let mut ana = connect(&state, "conn-ana");
        let mut bea = connect(&state, "conn-bea");
        let room = create(&state, "Ana", "conn-ana");
        assert!(matches!(
            next_response(&mut ana).await,
            Response::room_created { isHost: true, .. }
        ));

        room.request("conn-bea", join("Bea")).await.unwrap();
        assert_eq!(
            room.request("conn-other", join("Bea")).await,
            Err(QuizError::NicknameTaken("Bea".into()))
        );
        room.request("conn-ana", ClientRequest::Start).await.unwrap();
        wait_for(&mut bea, |r| matches!(r, Response::new_question { questionNumber: 1, .. })).await;

        time::advance(Duration::from_secs(3)).await;
        room.request("conn-ana", submit("q1", "B")).await.unwrap();
        match wait_for(&mut ana, |r| matches!(r, Response::answer_feedback { .. })).await {
            Response::answer_feedback {
                isCorrect,
                currentScore,
                ..
            } => assert!(isCorrect && currentScore == 100),
            _ => unreachable!(),
        }

        // Bea never answers; the deadline closes the question
        match wait_for(&mut bea, |r| matches!(r, Response::time_up { .. })).await {
            Response::time_up {
                correctOptionId, ..
            } => assert_eq!(correctOptionId, "B"),
            _ => unreachable!(),
        }
        wait_for(&mut bea, |r| matches!(r, Response::new_question { questionNumber: 2, .. })).await;

        room.request("conn-bea", submit("q2", "A")).await.unwrap();
        room.request("conn-ana", submit("q2", "B")).await.unwrap();
        match wait_for(&mut ana, |r| matches!(r, Response::quiz_ended { .. })).await {
            Response::quiz_ended { results, .. } => {
                assert_eq!(results[0].nickname, "Ana");
                assert_eq!(results[0].final_score, 100);
                assert_eq!(results[1].nickname, "Bea");
                assert_eq!(results[1].final_score, 100);
            }
            _ => unreachable!(),
        }

        assert_eq!(
            room.request("conn-ana", submit("q2", "A")).await,
            Err(QuizError::QuizAlreadyEnded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_submission_after_close_is_stale() {
        let state = test_state();
        let _ana = connect(&state, "conn-ana");
        let _bea = connect(&state, "conn-bea");
        let room = create(&state, "Ana", "conn-ana");
        room.request("conn-bea", join("Bea")).await.unwrap();
        room.request("conn-ana", ClientRequest::Start).await.unwrap();

        time::sleep(Duration::from_secs(21)).await;
        assert_eq!(
            room.request("conn-ana", submit("q1", "B")).await,
            Err(QuizError::StaleQuestion("q1".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn host_disconnect_blocks_start() {
        let state = test_state();
        let _ana = connect(&state, "conn-ana");
        let mut bea = connect(&state, "conn-bea");
        let room = create(&state, "Ana", "conn-ana");
        room.request("conn-bea", join("Bea")).await.unwrap();

        room.disconnect("conn-ana");
        wait_for(&mut bea, |r| matches!(r, Response::host_left { .. })).await;
        assert_eq!(
            room.request("conn-bea", ClientRequest::Start).await,
            Err(QuizError::HostMissing)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_mid_question_gets_remaining_time() {
        let state = test_state();
        let _ana = connect(&state, "conn-ana");
        let _bea = connect(&state, "conn-bea");
        let room = create(&state, "Ana", "conn-ana");
        room.request("conn-bea", join("Bea")).await.unwrap();
        room.request("conn-ana", ClientRequest::Start).await.unwrap();

        time::advance(Duration::from_secs(5)).await;
        room.disconnect("conn-bea");
        let mut bea_again = connect(&state, "conn-bea-2");
        room.request(
            "conn-bea-2",
            ClientRequest::Rejoin {
                nickname: "Bea".to_string(),
            },
        )
        .await
        .unwrap();

        match wait_for(&mut bea_again, |r| matches!(r, Response::room_snapshot { .. })).await {
            Response::room_snapshot {
                quizState,
                timeRemainingMs,
                ..
            } => {
                assert_eq!(quizState, QuizState::InProgress);
                let remaining = timeRemainingMs.unwrap();
                assert!(remaining <= 15_000);
                assert!(remaining > 0);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn grace_period_expiry_removes_player() {
        let state = test_state();
        let mut ana = connect(&state, "conn-ana");
        let _bea = connect(&state, "conn-bea");
        let room = create(&state, "Ana", "conn-ana");
        room.request("conn-bea", join("Bea")).await.unwrap();

        room.disconnect("conn-bea");
        match wait_for(&mut ana, |r| matches!(r, Response::player_left { .. })).await {
            Response::player_left {
                nickname,
                remainingPlayers,
                ..
            } => {
                assert_eq!(nickname, "Bea");
                assert_eq!(remainingPlayers.len(), 1);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_room_is_retired() {
        let state = test_state();
        let _ana = connect(&state, "conn-ana");
        let room = create(&state, "Ana", "conn-ana");
        let pin = room.pin().to_string();

        room.request("conn-ana", ClientRequest::Leave).await.unwrap();
        assert!(state.registry.get_room(&pin).is_some());

        time::sleep(Duration::from_secs(11)).await;
        assert!(state.registry.get_room(&pin).is_none());
        assert_eq!(
            room.request("conn-ana", join("Ana")).await,
            Err(QuizError::RoomClosed(pin))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ended_room_is_retired_after_results_retention() {
        let state = test_state();
        let mut ana = connect(&state, "conn-ana");
        let room = create(&state, "Ana", "conn-ana");
        let pin = room.pin().to_string();

        room.request("conn-ana", ClientRequest::Start).await.unwrap();
        room.request("conn-ana", submit("q1", "B")).await.unwrap();
        room.request("conn-ana", submit("q2", "A")).await.unwrap();
        wait_for(&mut ana, |r| matches!(r, Response::quiz_ended { .. })).await;

        assert_eq!(
            room.request(
                "conn-cid",
                ClientRequest::Rejoin {
                    nickname: "Cid".to_string()
                }
            )
            .await,
            Err(QuizError::RoomNotFoundOnRejoin(pin.clone()))
        );

        time::sleep(Duration::from_secs(59)).await;
        assert!(state.registry.get_room(&pin).is_some());

        time::sleep(Duration::from_secs(2)).await;
        assert!(state.registry.get_room(&pin).is_none());
        assert_eq!(
            room.request(
                "conn-ana",
                ClientRequest::Rejoin {
                    nickname: "Ana".to_string()
                }
            )
            .await,
            Err(QuizError::RoomClosed(pin))
        );
    }
}
