use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use log::info;
use serde::{Deserialize, Serialize};

use super::{
    communication::{PlayerView, Response},
    game::{AnswerRecord, PlayerResult, QuestionBank, ScoringPolicy, Submission},
};
use crate::{
    error::QuizError,
    server_messages::{Effect, Outbox},
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuizState {
    Lobby,
    InProgress,
    Ended,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePhase {
    AwaitingAnswers,
    Closed,
}

/// One open-submit-close cycle. `generation` is bumped for every cycle and
/// stamps the deadline timer that belongs to it.
#[derive(Debug)]
pub struct QuestionCycle {
    pub index: usize,
    pub generation: u64,
    pub question_id: String,
    pub opened_at: Instant,
    pub deadline: Instant,
    pub phase: CyclePhase,
    pub submissions: HashMap<String, Submission>,
}

#[derive(Clone, Debug)]
pub struct RoomSettings {
    pub scoring: ScoringPolicy,
    pub player_grace: Duration,
    pub room_grace: Duration,
    pub results_retention: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        RoomSettings {
            scoring: ScoringPolicy::default(),
            player_grace: Duration::from_secs(10),
            room_grace: Duration::from_secs(10),
            results_retention: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Player {
    pub nickname: String,
    pub connection_id: String,
    pub connected: bool,
    pub score: u32,
    pub has_answered_current_question: bool,
    pub answers: Vec<AnswerRecord>,
}

impl Player {
    fn new(nickname: String, connection_id: String) -> Player {
        Player {
            nickname,
            connection_id,
            connected: true,
            score: 0,
            has_answered_current_question: false,
            answers: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Room {
    pub(crate) pin: String,
    pub(crate) host_nickname: Option<String>,
    pub(crate) host_connection_id: Option<String>,
    pub(crate) players: Vec<Player>,
    pub(crate) state: QuizState,
    pub(crate) cycle: Option<QuestionCycle>,
    pub(crate) generation: u64,
    pub(crate) results: Option<Vec<PlayerResult>>,
    pub(crate) retirement_epoch: u64,
    pub(crate) retirement_pending: bool,
    pub(crate) bank: QuestionBank,
    pub(crate) settings: RoomSettings,
}

impl Room {
    pub fn new(
        pin: String,
        host_nickname: String,
        host_connection_id: String,
        bank: QuestionBank,
        settings: RoomSettings,
    ) -> Room {
        Room {
            pin,
            host_nickname: Some(host_nickname.clone()),
            host_connection_id: Some(host_connection_id.clone()),
            players: vec![Player::new(host_nickname, host_connection_id)],
            state: QuizState::Lobby,
            cycle: None,
            generation: 0,
            results: None,
            retirement_epoch: 0,
            retirement_pending: false,
            bank,
            settings,
        }
    }

    pub fn announce_created(&self, outbox: &mut Outbox) {
        let host = &self.players[0];
        outbox.send(
            &host.connection_id,
            Response::room_created {
                roomPin: self.pin.clone(),
                nickname: host.nickname.clone(),
                isHost: true,
                players: self.roster(),
            },
        );
    }

    pub fn pin(&self) -> &str {
        &self.pin
    }

    pub fn state(&self) -> QuizState {
        self.state
    }

    pub fn host_connection_id(&self) -> Option<&str> {
        self.host_connection_id.as_deref()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, nickname: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.nickname == nickname)
    }

    pub fn results(&self) -> Option<&[PlayerResult]> {
        self.results.as_deref()
    }

    pub fn current_question_index(&self) -> Option<usize> {
        self.cycle.as_ref().map(|cycle| cycle.index)
    }

    pub fn current_deadline(&self) -> Option<Instant> {
        self.cycle.as_ref().map(|cycle| cycle.deadline)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_host(&self, connection_id: &str) -> bool {
        self.host_connection_id.as_deref() == Some(connection_id)
    }

    pub fn roster(&self) -> Vec<PlayerView> {
        self.players
            .iter()
            .map(|player| PlayerView {
                nickname: player.nickname.clone(),
                score: player.score,
                isHost: self.is_host(&player.connection_id),
                connected: player.connected,
            })
            .collect()
    }

    pub(crate) fn connected_ids(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|player| player.connected)
            .map(|player| player.connection_id.clone())
            .collect()
    }

    pub(crate) fn broadcast(&self, outbox: &mut Outbox, response: Response) {
        outbox.send_all(self.connected_ids(), response);
    }

    pub(crate) fn broadcast_except(&self, outbox: &mut Outbox, connection_id: &str, response: Response) {
        let recipients = self
            .connected_ids()
            .into_iter()
            .filter(|id| id != connection_id)
            .collect();
        outbox.send_all(recipients, response);
    }

    pub(crate) fn player_index_by_connection(&self, connection_id: &str) -> Option<usize> {
        self.players
            .iter()
            .position(|player| player.connection_id == connection_id)
    }

    pub(crate) fn player_index_by_nickname(&self, nickname: &str) -> Option<usize> {
        self.players
            .iter()
            .position(|player| player.nickname == nickname)
    }

    pub fn join(
        &mut self,
        nickname: String,
        connection_id: String,
        now: Instant,
        outbox: &mut Outbox,
    ) -> Result<(), QuizError> {
        self.admit_player(&nickname, &connection_id)?;

        outbox.send(
            &connection_id,
            Response::room_joined {
                roomPin: self.pin.clone(),
                nickname: nickname.clone(),
                isHost: false,
                players: self.roster(),
                quizActive: self.state == QuizState::InProgress,
            },
        );
        self.broadcast_except(
            outbox,
            &connection_id,
            Response::player_joined_room {
                roomPin: self.pin.clone(),
                players: self.roster(),
            },
        );
        if self.state == QuizState::InProgress {
            outbox.send(&connection_id, self.snapshot(&nickname, now));
        }
        Ok(())
    }

    pub(crate) fn admit_player(&mut self, nickname: &str, connection_id: &str) -> Result<(), QuizError> {
        if self.state == QuizState::Ended {
            return Err(QuizError::QuizAlreadyEnded);
        }
        if self.player_index_by_nickname(nickname).is_some() {
            return Err(QuizError::NicknameTaken(nickname.to_string()));
        }

        info!("{} joined room {}", nickname, &self.pin);
        self.players
            .push(Player::new(nickname.to_string(), connection_id.to_string()));
        self.cancel_retirement();
        Ok(())
    }

    pub fn leave(
        &mut self,
        connection_id: &str,
        now: Instant,
        outbox: &mut Outbox,
    ) -> Result<(), QuizError> {
        let index = self
            .player_index_by_connection(connection_id)
            .ok_or_else(|| QuizError::NotInRoom(self.pin.clone()))?;
        if self.is_host(connection_id) {
            self.revoke_host(outbox);
        }
        self.remove_player(index, now, outbox);
        Ok(())
    }

    pub(crate) fn revoke_host(&mut self, outbox: &mut Outbox) {
        info!("Host left room {}", &self.pin);
        self.host_connection_id = None;
        self.broadcast(
            outbox,
            Response::host_left {
                roomPin: self.pin.clone(),
            },
        );
    }

    pub(crate) fn remove_player(&mut self, index: usize, now: Instant, outbox: &mut Outbox) {
        let player = self.players.remove(index);
        info!("Removing {} from room {}", &player.nickname, &self.pin);
        if self.host_nickname.as_deref() == Some(player.nickname.as_str()) {
            self.host_nickname = None;
        }
        if let Some(cycle) = self.cycle.as_mut() {
            cycle.submissions.remove(&player.nickname);
        }

        self.broadcast(
            outbox,
            Response::player_left {
                roomPin: self.pin.clone(),
                nickname: player.nickname,
                remainingPlayers: self.roster(),
            },
        );

        if self.players.is_empty() {
            if self.state != QuizState::Ended {
                self.schedule_retirement(self.settings.room_grace, outbox);
            }
        } else {
            self.close_if_all_answered(now, outbox);
        }
    }

    pub(crate) fn schedule_retirement(&mut self, after: Duration, outbox: &mut Outbox) {
        self.retirement_epoch += 1;
        self.retirement_pending = true;
        outbox.push(Effect::ScheduleRetirement {
            epoch: self.retirement_epoch,
            after,
        });
    }

    pub(crate) fn cancel_retirement(&mut self) {
        if self.retirement_pending && self.state != QuizState::Ended {
            self.retirement_epoch += 1;
            self.retirement_pending = false;
        }
    }

    pub fn retirement_due(&self, epoch: u64) -> bool {
        self.retirement_pending && epoch == self.retirement_epoch
    }
}
