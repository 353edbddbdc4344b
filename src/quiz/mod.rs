pub mod change;
pub mod editor;
pub mod error;
pub mod notify;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod unlock;

use std::fmt;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A best attempt at or above this percentage perfects its tier.
pub const PERFECT_PERCENTAGE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Easy,
    Medium,
    Difficult,
    Pro,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Easy, Tier::Medium, Tier::Difficult, Tier::Pro];

    pub fn previous(self) -> Option<Tier> {
        let idx = Self::ALL.iter().position(|t| *t == self)?;
        idx.checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn next(self) -> Option<Tier> {
        let idx = Self::ALL.iter().position(|t| *t == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    pub fn is_last(self) -> bool {
        self.next().is_none()
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Easy => "Easy",
            Tier::Medium => "Medium",
            Tier::Difficult => "Difficult",
            Tier::Pro => "Pro",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub tier: Tier,
    pub questions: Vec<Question>,
    /// Milliseconds since epoch of the last committed edit, 0 if never edited.
    pub last_updated: i64,
}

impl Quiz {
    pub fn new(tier: Tier, questions: Vec<Question>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tier,
            questions,
            last_updated: 0,
        }
    }

    pub fn question_ids(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.id.clone()).collect()
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub image: Option<String>,
    pub correct_answer: String,
    pub wrong_answers: Vec<String>,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        correct_answer: impl Into<String>,
        wrong_answers: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            image: None,
            correct_answer: correct_answer.into(),
            wrong_answers,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn is_correct(&self, selected: &str) -> bool {
        self.correct_answer == selected
    }

    pub fn shuffled_options(&self) -> Vec<String> {
        let mut options = Vec::with_capacity(self.wrong_answers.len() + 1);
        options.push(self.correct_answer.clone());
        options.extend(self.wrong_answers.iter().cloned());
        options.shuffle(&mut rand::thread_rng());
        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub question_id: String,
    pub selected: String,
    pub is_correct: bool,
}

impl QuizAnswer {
    pub fn new(question_id: impl Into<String>, selected: impl Into<String>, is_correct: bool) -> Self {
        Self {
            question_id: question_id.into(),
            selected: selected.into(),
            is_correct,
        }
    }
}

/// One completed run. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: String,
    pub user_id: String,
    pub tier: Tier,
    pub score: u32,
    pub total: u32,
    pub percentage: f64,
    pub completed_at: i64,
    pub answers: Vec<QuizAnswer>,
}

impl QuizAttempt {
    pub fn is_perfect(&self) -> bool {
        self.percentage >= PERFECT_PERCENTAGE
    }
}

pub fn percentage(score: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(score) / f64::from(total) * 100.0
}

/// Highest percentage wins; ties go to the earliest completion.
pub fn best_attempt(attempts: &[QuizAttempt]) -> Option<&QuizAttempt> {
    attempts.iter().fold(None, |best: Option<&QuizAttempt>, a| match best {
        Some(b) if b.percentage > a.percentage => Some(b),
        Some(b) if b.percentage == a.percentage && b.completed_at <= a.completed_at => Some(b),
        _ => Some(a),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizProgress {
    pub user_id: String,
    pub tier: Tier,
    pub current_question_index: usize,
    pub score: u32,
    pub question_order: Vec<String>,
    pub answers: Vec<QuizAnswer>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationCategory {
    QuizUpdated,
    QuizRemoved,
    SessionReset,
    PerfectScore,
    AllTiersComplete,
    QuizCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    High,
}

impl NotificationCategory {
    pub fn priority(self) -> Priority {
        match self {
            NotificationCategory::QuizCompleted => Priority::Low,
            _ => Priority::High,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            NotificationCategory::QuizUpdated => "quiz_updated",
            NotificationCategory::QuizRemoved => "quiz_removed",
            NotificationCategory::SessionReset => "session_reset",
            NotificationCategory::PerfectScore => "perfect_score",
            NotificationCategory::AllTiersComplete => "all_tiers_complete",
            NotificationCategory::QuizCompleted => "quiz_completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Learner,
    Editor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role,
        }
    }
}
