use std::time::Instant;

use log::{debug, info};

use crate::{
    error::QuizError,
    models::{
        communication::Response,
        lobby::{CyclePhase, QuizState, Room},
    },
    server_messages::{Effect, Outbox},
};

impl Room {
    pub fn snapshot(&self, nickname: &str, now: Instant) -> Response {
        let player = self.player(nickname);

        let open_cycle = self.cycle.as_ref().filter(|cycle| {
            self.state == QuizState::InProgress && cycle.phase == CyclePhase::AwaitingAnswers
        });
        let (question, question_number, time_remaining) = match open_cycle {
            Some(cycle) => (
                self.bank.at(cycle.index).ok().map(|question| question.public_view()),
                Some(cycle.index + 1),
                Some(cycle.deadline.saturating_duration_since(now).as_millis() as u64),
            ),
            None => (None, None, None),
        };

        Response::room_snapshot {
            roomPin: self.pin.clone(),
            nickname: nickname.to_string(),
            isHost: player
                .map(|player| self.is_host(&player.connection_id))
                .unwrap_or(false),
            quizState: self.state,
            question,
            questionNumber: question_number,
            totalQuestions: self.bank.question_count(),
            timeRemainingMs: time_remaining,
            hasAnswered: player
                .map(|player| player.has_answered_current_question)
                .unwrap_or(false),
            currentScore: player.map(|player| player.score).unwrap_or(0),
            players: self.roster(),
            results: self.results.clone(),
        }
    }

    pub fn rejoin(
        &mut self,
        nickname: String,
        connection_id: String,
        now: Instant,
        outbox: &mut Outbox,
    ) -> Result<(), QuizError> {
        match self.player_index_by_nickname(&nickname) {
            Some(index) => {
                let player = &mut self.players[index];
                if player.connected && player.connection_id != connection_id {
                    return Err(QuizError::NicknameTaken(nickname));
                }
                let previous = std::mem::replace(&mut player.connection_id, connection_id.clone());
                player.connected = true;

                let was_host = self.host_connection_id.as_deref() == Some(previous.as_str());
                let reclaims_host = self.host_connection_id.is_none()
                    && self.host_nickname.as_deref() == Some(nickname.as_str());
                if was_host || reclaims_host {
                    self.host_connection_id = Some(connection_id.clone());
                }
                self.cancel_retirement();
                info!(
                    "{} rebound to {} in room {}",
                    &nickname, &connection_id, &self.pin
                );
            }
            None if self.state == QuizState::Ended => {
                return Err(QuizError::RoomNotFoundOnRejoin(self.pin.clone()));
            }
            None => self.admit_player(&nickname, &connection_id)?,
        }

        self.broadcast_except(
            outbox,
            &connection_id,
            Response::player_joined_room {
                roomPin: self.pin.clone(),
                players: self.roster(),
            },
        );
        outbox.send(&connection_id, self.snapshot(&nickname, now));
        Ok(())
    }

    pub fn disconnect(&mut self, connection_id: &str, now: Instant, outbox: &mut Outbox) {
        let index = match self.player_index_by_connection(connection_id) {
            Some(index) if self.players[index].connected => index,
            _ => return,
        };
        self.players[index].connected = false;
        let nickname = self.players[index].nickname.clone();
        info!("{} disconnected from room {}", &nickname, &self.pin);

        if self.is_host(connection_id) {
            self.revoke_host(outbox);
        }
        outbox.push(Effect::SchedulePlayerRemoval {
            nickname,
            connection_id: connection_id.to_string(),
            after: self.settings.player_grace,
        });
        self.close_if_all_answered(now, outbox);
    }

    pub fn expire_grace(
        &mut self,
        nickname: &str,
        connection_id: &str,
        now: Instant,
        outbox: &mut Outbox,
    ) {
        match self.player_index_by_nickname(nickname) {
            Some(index)
                if !self.players[index].connected
                    && self.players[index].connection_id == connection_id =>
            {
                self.remove_player(index, now, outbox)
            }
            _ => debug!("Grace expiry for {} in room {} ignored", nickname, &self.pin),
        }
    }
}
