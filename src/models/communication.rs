#![allow(non_camel_case_types, non_snake_case)]

use serde::{Deserialize, Serialize};

use super::{
    game::{PlayerResult, QuestionView},
    lobby::QuizState,
};

/// Roster entry, in join order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlayerView {
    pub nickname: String,
    pub score: u32,
    pub isHost: bool,
    pub connected: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScoreEntry {
    pub nickname: String,
    pub score: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum Response {
    room_created {
        roomPin: String,
        nickname: String,
        isHost: bool,
        players: Vec<PlayerView>,
    },
    room_joined {
        roomPin: String,
        nickname: String,
        isHost: bool,
        players: Vec<PlayerView>,
        quizActive: bool,
    },
    room_error {
        message: String,
    },
    room_not_found_on_rejoin {
        roomPin: String,
        message: String,
    },
    player_joined_room {
        roomPin: String,
        players: Vec<PlayerView>,
    },
    player_left {
        roomPin: String,
        nickname: String,
        remainingPlayers: Vec<PlayerView>,
    },
    host_left {
        roomPin: String,
    },
    quiz_started {
        roomPin: String,
    },
    new_question {
        question: QuestionView,
        questionNumber: usize,
        totalQuestions: usize,
        timeLimit: u64,
    },
    answer_feedback {
        questionId: String,
        isCorrect: bool,
        correctOptionId: String,
        selectedOptionId: String,
        pointsEarned: u32,
        currentScore: u32,
    },
    scores_update {
        scores: Vec<ScoreEntry>,
    },
    time_up {
        questionId: String,
        correctOptionId: String,
    },
    quiz_ended {
        roomPin: String,
        results: Vec<PlayerResult>,
    },
    room_snapshot {
        roomPin: String,
        nickname: String,
        isHost: bool,
        quizState: QuizState,
        question: Option<QuestionView>,
        questionNumber: Option<usize>,
        totalQuestions: usize,
        timeRemainingMs: Option<u64>,
        hasAnswered: bool,
        currentScore: u32,
        players: Vec<PlayerView>,
        results: Option<Vec<PlayerResult>>,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum Command {
    create_room {
        nickname: String,
    },
    join_room_pin {
        nickname: String,
        roomPin: String,
    },
    rejoin_room_check {
        roomPin: String,
        nickname: String,
    },
    start_quiz_for_room {
        roomPin: String,
    },
    submit_answer {
        roomPin: String,
        questionId: String,
        selectedOptionId: String,
    },
    leave_room {
        roomPin: String,
    },
    heartbeat,
}
