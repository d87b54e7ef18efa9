use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::error::{QuizError, StartupError};

const BUILTIN_PACK: &str = include_str!("../../packs/engineering.json");

fn default_time_limit() -> u64 {
    20
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuizOption {
    pub id: String,
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<QuizOption>,
    pub correct_option_id: String,
    #[serde(default = "default_time_limit")]
    pub time_limit_seconds: u64,
    #[serde(default)]
    pub skill_area: String,
    #[serde(default)]
    pub difficulty: String,
}

impl Question {
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_seconds)
    }

    /// The question as players see it before it closes.
    pub fn public_view(&self) -> QuestionView {
        QuestionView {
            id: self.id.clone(),
            text: self.text.clone(),
            options: self.options.clone(),
            skill_area: self.skill_area.clone(),
            difficulty: self.difficulty.clone(),
        }
    }
}

/// Broadcast form of a [`Question`]; carries no correct option.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub options: Vec<QuizOption>,
    pub skill_area: String,
    pub difficulty: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Pack {
    pub name: String,
    pub questions: Vec<Question>,
    /// Skill area to course suggestion, used for end-of-quiz recommendations.
    #[serde(default)]
    pub recommendations: HashMap<String, String>,
}

impl Pack {
    pub fn from_file(path: &Path) -> Result<Pack, StartupError> {
        let data = fs::read_to_string(path).map_err(|source| StartupError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn builtin() -> Result<Pack, StartupError> {
        Ok(serde_json::from_str(BUILTIN_PACK)?)
    }

    fn validate(&self) -> Result<(), StartupError> {
        let mut question_ids = HashSet::new();
        for question in &self.questions {
            if !question_ids.insert(question.id.as_str()) {
                return Err(StartupError::PackInvalid(format!(
                    "duplicate question id {}",
                    question.id
                )));
            }
            if question.options.len() < 2 {
                return Err(StartupError::PackInvalid(format!(
                    "question {} needs at least two options",
                    question.id
                )));
            }
            let mut option_ids = HashSet::new();
            if !question
                .options
                .iter()
                .all(|option| option_ids.insert(option.id.as_str()))
            {
                return Err(StartupError::PackInvalid(format!(
                    "question {} has duplicate option ids",
                    question.id
                )));
            }
            if !option_ids.contains(question.correct_option_id.as_str()) {
                return Err(StartupError::PackInvalid(format!(
                    "question {} names unknown correct option {}",
                    question.id, question.correct_option_id
                )));
            }
            if question.time_limit_seconds == 0 {
                return Err(StartupError::PackInvalid(format!(
                    "question {} has a zero time limit",
                    question.id
                )));
            }
        }
        Ok(())
    }
}

/// Read-only, ordered question sequence shared by every room.
#[derive(Clone, Debug)]
pub struct QuestionBank {
    name: Arc<str>,
    questions: Arc<[Question]>,
    recommendations: Arc<HashMap<String, String>>,
}

impl QuestionBank {
    pub fn from_pack(pack: Pack) -> Result<QuestionBank, StartupError> {
        pack.validate()?;
        Ok(QuestionBank {
            name: pack.name.into(),
            questions: pack.questions.into(),
            recommendations: Arc::new(pack.recommendations),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn at(&self, index: usize) -> Result<&Question, QuizError> {
        self.questions.get(index).ok_or(QuizError::IndexOutOfRange {
            index,
            count: self.questions.len(),
        })
    }

    pub fn suggestion_for(&self, skill_area: &str) -> Option<&str> {
        self.recommendations.get(skill_area).map(String::as_str)
    }
}

/// Point award for a correct answer:
/// `base_points + floor(max_speed_bonus * remaining / limit)`,
/// with `remaining` clamped at zero. Wrong answers earn nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoringPolicy {
    pub base_points: u32,
    pub max_speed_bonus: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy {
            base_points: 100,
            max_speed_bonus: 50,
        }
    }
}

impl ScoringPolicy {
    pub fn flat(points: u32) -> ScoringPolicy {
        ScoringPolicy {
            base_points: points,
            max_speed_bonus: 0,
        }
    }

    pub fn award(&self, is_correct: bool, elapsed: Duration, limit: Duration) -> u32 {
        if !is_correct {
            return 0;
        }
        let limit_ms = limit.as_millis();
        if limit_ms == 0 {
            return self.base_points;
        }
        let remaining_ms = limit_ms.saturating_sub(elapsed.as_millis());
        let bonus = u128::from(self.max_speed_bonus) * remaining_ms / limit_ms;
        self.base_points + bonus as u32
    }
}

/// The single accepted answer of one player for one question.
#[derive(Clone, Debug)]
pub struct Submission {
    pub nickname: String,
    pub question_id: String,
    pub selected_option_id: String,
    pub submitted_at: Instant,
}

/// What a player answered, kept for the end-of-quiz recommendation.
#[derive(Clone, Debug)]
pub struct AnswerRecord {
    pub is_correct: bool,
    pub skill_area: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub nickname: String,
    pub connection_id: String,
    pub final_score: u32,
    pub recommendation: String,
}

pub fn recommendation(answers: &[AnswerRecord], bank: &QuestionBank) -> String {
    if answers.is_empty() {
        return "No answers recorded.".to_string();
    }

    // first-correct order, so ties go to the area answered correctly first
    let mut correct_by_area: Vec<(&str, u32)> = Vec::new();
    for answer in answers.iter().filter(|answer| answer.is_correct) {
        if answer.skill_area.is_empty() {
            continue;
        }
        match correct_by_area
            .iter_mut()
            .find(|(area, _)| *area == answer.skill_area)
        {
            Some((_, count)) => *count += 1,
            None => correct_by_area.push((answer.skill_area.as_str(), 1)),
        }
    }
    if correct_by_area.is_empty() {
        return "No correct answers to suggest an area.".to_string();
    }

    // stable sort keeps first-correct order among equal counts
    correct_by_area.sort_by(|a, b| b.1.cmp(&a.1));
    let best_area = correct_by_area[0].0;
    let suggestion = bank.suggestion_for(best_area).unwrap_or("related areas");
    let top_areas = correct_by_area
        .iter()
        .take(3)
        .map(|(area, count)| format!("{}: {} correct", area, count))
        .collect::<Vec<_>>()
        .join("; ");

    format!(
        "You stood out in '{}'. Courses such as {} may interest you. Your strongest areas: {}.",
        best_area, suggestion, top_areas
    )
}

#[cfg(test)]
pub fn test_pack() -> Pack {
    let question = |id: &str, correct: &str, skill_area: &str| Question {
        id: id.to_string(),
        text: format!("Is {} correct?", correct),
        options: vec![
            QuizOption {
                id: "A".to_string(),
                text: "Option A".to_string(),
            },
            QuizOption {
                id: "B".to_string(),
                text: "Option B".to_string(),
            },
        ],
        correct_option_id: correct.to_string(),
        time_limit_seconds: 20,
        skill_area: skill_area.to_string(),
        difficulty: "Easy".to_string(),
    };

    Pack {
        name: "test pack".to_string(),
        questions: vec![question("q1", "B", "Logic"), question("q2", "A", "Networks")],
        recommendations: HashMap::from([("Logic".to_string(), "Computer Science".to_string())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(skill_area: &str, is_correct: bool) -> AnswerRecord {
        AnswerRecord {
            is_correct,
            skill_area: skill_area.to_string(),
        }
    }

    #[test]
    fn builtin_pack_is_valid() {
        let bank = QuestionBank::from_pack(Pack::builtin().unwrap()).unwrap();
        assert!(bank.question_count() > 0);
        assert!(bank.at(0).is_ok());
    }

    #[test]
    fn at_rejects_out_of_range() {
        let bank = QuestionBank::from_pack(test_pack()).unwrap();
        assert_eq!(bank.at(1).unwrap().correct_option_id, "A");
        assert_eq!(
            bank.at(2).unwrap_err(),
            QuizError::IndexOutOfRange { index: 2, count: 2 }
        );
    }

    #[test]
    fn pack_validation_rejects_unknown_correct_option() {
        let mut pack = test_pack();
        pack.questions[0].correct_option_id = "Z".to_string();
        assert!(matches!(
            QuestionBank::from_pack(pack),
            Err(StartupError::PackInvalid(_))
        ));
    }

    #[test]
    fn pack_validation_rejects_duplicate_question_ids() {
        let mut pack = test_pack();
        pack.questions[1].id = "q1".to_string();
        assert!(QuestionBank::from_pack(pack).is_err());
    }

    #[test]
    fn empty_pack_loads() {
        let mut pack = test_pack();
        pack.questions.clear();
        let bank = QuestionBank::from_pack(pack).unwrap();
        assert_eq!(bank.question_count(), 0);
    }

    #[test]
    fn public_view_hides_correct_option() {
        let pack = test_pack();
        let json = serde_json::to_string(&pack.questions[0].public_view()).unwrap();
        assert!(!json.contains("correctOptionId"));
    }

    #[test]
    fn award_adds_speed_bonus() {
        let policy = ScoringPolicy::default();
        let limit = Duration::from_secs(20);
        assert_eq!(policy.award(true, Duration::ZERO, limit), 150);
        assert_eq!(policy.award(true, Duration::from_secs(3), limit), 142);
        assert_eq!(policy.award(true, Duration::from_secs(30), limit), 100);
        assert_eq!(policy.award(false, Duration::ZERO, limit), 0);
    }

    #[test]
    fn flat_award_ignores_speed() {
        let policy = ScoringPolicy::flat(100);
        assert_eq!(
            policy.award(true, Duration::from_secs(3), Duration::from_secs(20)),
            100
        );
    }

    #[test]
    fn recommendation_picks_strongest_area() {
        let bank = QuestionBank::from_pack(test_pack()).unwrap();
        let answers = vec![
            record("Networks", true),
            record("Logic", true),
            record("Logic", true),
            record("Networks", false),
        ];
        let text = recommendation(&answers, &bank);
        assert!(text.starts_with("You stood out in 'Logic'"));
        assert!(text.contains("Computer Science"));
        assert!(text.contains("Logic: 2 correct; Networks: 1 correct"));
    }

    #[test]
    fn recommendation_ties_go_to_first_correct_area() {
        let bank = QuestionBank::from_pack(test_pack()).unwrap();
        let answers = vec![record("Networks", true), record("Logic", true)];
        let text = recommendation(&answers, &bank);
        assert!(text.starts_with("You stood out in 'Networks'"));
        assert!(text.contains("related areas"));
    }

    #[test]
    fn recommendation_without_answers() {
        let bank = QuestionBank::from_pack(test_pack()).unwrap();
        assert_eq!(recommendation(&[], &bank), "No answers recorded.");
        assert_eq!(
            recommendation(&[record("Logic", false)], &bank),
            "No correct answers to suggest an area."
        );
    }
}
