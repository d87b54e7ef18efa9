use std::{collections::HashMap, time::Instant};

use log::{debug, error, info};

use crate::{
    error::QuizError,
    models::{
        communication::{Response, ScoreEntry},
        game::{recommendation, AnswerRecord, PlayerResult, Submission},
        lobby::{CyclePhase, QuestionCycle, QuizState, Room},
    },
    server_messages::{Effect, Outbox},
};

const SCOREBOARD_SIZE: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    AllAnswered,
    Deadline,
}

impl Room {
    pub fn start_quiz(
        &mut self,
        connection_id: &str,
        now: Instant,
        outbox: &mut Outbox,
    ) -> Result<(), QuizError> {
        match self.state {
            QuizState::Lobby => (),
            QuizState::InProgress => return Err(QuizError::QuizAlreadyStarted),
            QuizState::Ended => return Err(QuizError::QuizAlreadyEnded),
        }
        if self.player_index_by_connection(connection_id).is_none() {
            return Err(QuizError::NotInRoom(self.pin.clone()));
        }
        match self.host_connection_id.as_deref() {
            None => return Err(QuizError::HostMissing),
            Some(host) if host != connection_id => return Err(QuizError::NotHost),
            Some(_) => (),
        }
        if self.bank.question_count() == 0 {
            return Err(QuizError::EmptyQuestionBank);
        }

        info!(
            "Starting quiz in room {} with {} players",
            &self.pin,
            self.players.len()
        );
        self.state = QuizState::InProgress;
        self.broadcast(
            outbox,
            Response::quiz_started {
                roomPin: self.pin.clone(),
            },
        );
        self.open_question(0, now, outbox)
    }

    fn open_question(&mut self, index: usize, now: Instant, outbox: &mut Outbox) -> Result<(), QuizError> {
        let bank = self.bank.clone();
        let question = bank.at(index)?;

        for player in self.players.iter_mut() {
            player.has_answered_current_question = false;
        }
        self.generation += 1;
        let deadline = now + question.time_limit();
        self.cycle = Some(QuestionCycle {
            index,
            generation: self.generation,
            question_id: question.id.clone(),
            opened_at: now,
            deadline,
            phase: CyclePhase::AwaitingAnswers,
            submissions: HashMap::new(),
        });

        info!(
            "Room {}: question {}/{} open",
            &self.pin,
            index + 1,
            bank.question_count()
        );
        self.broadcast(
            outbox,
            Response::new_question {
                question: question.public_view(),
                questionNumber: index + 1,
                totalQuestions: bank.question_count(),
                timeLimit: question.time_limit_seconds,
            },
        );
        outbox.push(Effect::ScheduleClose {
            generation: self.generation,
            deadline,
        });
        Ok(())
    }

    /// Records and scores one answer. A submission that arrives after the
    /// deadline closes the question itself and is rejected as stale.
    pub fn submit_answer(
        &mut self,
        connection_id: &str,
        question_id: &str,
        selected_option_id: &str,
        now: Instant,
        outbox: &mut Outbox,
    ) -> Result<(), QuizError> {
        match self.state {
            QuizState::InProgress => (),
            QuizState::Lobby => return Err(QuizError::StaleQuestion(question_id.to_string())),
            QuizState::Ended => return Err(QuizError::QuizAlreadyEnded),
        }
        let player_index = self
            .player_index_by_connection(connection_id)
            .ok_or_else(|| QuizError::NotInRoom(self.pin.clone()))?;

        let bank = self.bank.clone();
        let cycle = match self.cycle.as_mut() {
            Some(cycle)
                if cycle.phase == CyclePhase::AwaitingAnswers && cycle.question_id == question_id =>
            {
                cycle
            }
            _ => return Err(QuizError::StaleQuestion(question_id.to_string())),
        };
        if now >= cycle.deadline {
            let generation = cycle.generation;
            self.close_question(generation, CloseReason::Deadline, now, outbox);
            return Err(QuizError::StaleQuestion(question_id.to_string()));
        }

        let player = &mut self.players[player_index];
        let already_answered = cycle
            .submissions
            .get(&player.nickname)
            .map_or(false, |previous| previous.question_id == cycle.question_id);
        if player.has_answered_current_question || already_answered {
            return Err(QuizError::DuplicateSubmission);
        }

        let question = bank.at(cycle.index)?;
        let submission = Submission {
            nickname: player.nickname.clone(),
            question_id: question.id.clone(),
            selected_option_id: selected_option_id.to_string(),
            submitted_at: now,
        };
        let is_correct = submission.selected_option_id == question.correct_option_id;
        let points_earned = self.settings.scoring.award(
            is_correct,
            submission.submitted_at.saturating_duration_since(cycle.opened_at),
            question.time_limit(),
        );

        player.score += points_earned;
        player.has_answered_current_question = true;
        player.answers.push(AnswerRecord {
            is_correct,
            skill_area: question.skill_area.clone(),
        });
        cycle.submissions.insert(submission.nickname.clone(), submission);
        info!(
            "Room {}: {} answered {} ({}), +{} = {}",
            &self.pin,
            &player.nickname,
            &question.id,
            if is_correct { "correct" } else { "wrong" },
            points_earned,
            player.score
        );

        outbox.send(
            connection_id,
            Response::answer_feedback {
                questionId: question.id.clone(),
                isCorrect: is_correct,
                correctOptionId: question.correct_option_id.clone(),
                selectedOptionId: selected_option_id.to_string(),
                pointsEarned: points_earned,
                currentScore: player.score,
            },
        );
        self.broadcast(
            outbox,
            Response::scores_update {
                scores: self.scoreboard(),
            },
        );

        self.close_if_all_answered(now, outbox);
        Ok(())
    }

    pub(crate) fn close_if_all_answered(&mut self, now: Instant, outbox: &mut Outbox) {
        let generation = match self.cycle.as_ref() {
            Some(cycle) if self.state == QuizState::InProgress && cycle.phase == CyclePhase::AwaitingAnswers => {
                cycle.generation
            }
            _ => return,
        };
        let mut present = self.players.iter().filter(|player| player.connected).peekable();
        if present.peek().is_none() {
            return;
        }
        if present.all(|player| player.has_answered_current_question) {
            self.close_question(generation, CloseReason::AllAnswered, now, outbox);
        }
    }

    /// Closes the cycle stamped `generation`; anything else is a no-op, which
    /// makes a late or superseded timer harmless.
    pub fn close_question(
        &mut self,
        generation: u64,
        reason: CloseReason,
        now: Instant,
        outbox: &mut Outbox,
    ) {
        let cycle = match self.cycle.as_mut() {
            Some(cycle) if cycle.generation == generation && cycle.phase == CyclePhase::AwaitingAnswers => {
                cycle
            }
            _ => {
                debug!(
                    "Room {}: close for generation {} ignored",
                    &self.pin, generation
                );
                return;
            }
        };
        cycle.phase = CyclePhase::Closed;
        let index = cycle.index;
        let submissions = std::mem::take(&mut cycle.submissions);
        outbox.push(Effect::CancelClose);
        info!(
            "Room {}: question {} closed ({:?})",
            &self.pin,
            index + 1,
            reason
        );

        if reason == CloseReason::Deadline {
            if let Ok(question) = self.bank.at(index) {
                let unanswered = self
                    .players
                    .iter()
                    .filter(|player| player.connected && !submissions.contains_key(&player.nickname))
                    .map(|player| player.connection_id.clone())
                    .collect::<Vec<_>>();
                for connection_id in unanswered {
                    outbox.send(
                        &connection_id,
                        Response::time_up {
                            questionId: question.id.clone(),
                            correctOptionId: question.correct_option_id.clone(),
                        },
                    );
                }
            }
        }

        let next = index + 1;
        if next < self.bank.question_count() {
            if let Err(error) = self.open_question(next, now, outbox) {
                error!("Room {}: could not open question {}: {}", &self.pin, next, error);
                self.finish_quiz(outbox);
            }
        } else {
            self.finish_quiz(outbox);
        }
    }

    fn finish_quiz(&mut self, outbox: &mut Outbox) {
        info!("Room {}: quiz ended, computing results", &self.pin);
        self.state = QuizState::Ended;
        self.cycle = None;
        self.generation += 1;

        let results = self.compute_results();
        self.results = Some(results.clone());
        self.broadcast(
            outbox,
            Response::quiz_ended {
                roomPin: self.pin.clone(),
                results,
            },
        );
        self.schedule_retirement(self.settings.results_retention, outbox);
    }

    pub fn compute_results(&self) -> Vec<PlayerResult> {
        let mut results: Vec<PlayerResult> = self
            .players
            .iter()
            .map(|player| PlayerResult {
                nickname: player.nickname.clone(),
                connection_id: player.connection_id.clone(),
                final_score: player.score,
                recommendation: recommendation(&player.answers, &self.bank),
            })
            .collect();
        results.sort_by(|a, b| b.final_score.cmp(&a.final_score));
        results
    }

    pub fn scoreboard(&self) -> Vec<ScoreEntry> {
        let mut scores: Vec<ScoreEntry> = self
            .players
            .iter()
            .map(|player| ScoreEntry {
                nickname: player.nickname.clone(),
                score: player.score,
            })
            .collect();
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores.truncate(SCOREBOARD_SIZE);
        scores
    }
}
