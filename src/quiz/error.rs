use thiserror::Error;

use super::Tier;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store {operation} failed: {reason}")]
    Unavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("document could not be (de)serialized")]
    Serialization(#[from] serde_json::Error),

    #[error("seed rejected: {0}")]
    InvalidSeed(String),
}

impl StoreError {
    pub fn unavailable(operation: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            operation,
            reason: reason.into(),
        }
    }
}

/// Why a learner may not start a session on a tier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("{tier} is locked until {previous} is completed with a perfect score")]
    LockedNeedPreviousPerfect { tier: Tier, previous: Tier },

    #[error("{tier} is already perfected")]
    AlreadyPerfected { tier: Tier },

    #[error("{tier} has no questions")]
    EmptyTier { tier: Tier },

    #[error("no quiz exists for {tier}")]
    QuizNotFound { tier: Tier },
}

impl RejectReason {
    pub fn user_message(&self) -> String {
        match self {
            RejectReason::LockedNeedPreviousPerfect { tier, previous } => format!(
                "Score 100% on the {previous} quiz to unlock {tier}."
            ),
            RejectReason::AlreadyPerfected { tier } => format!(
                "You already scored 100% on {tier}. It stays completed until its questions change."
            ),
            RejectReason::EmptyTier { tier } | RejectReason::QuizNotFound { tier } => {
                format!("The {tier} quiz has no questions yet. Check back later.")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionError {
    #[error("question id {0} appears more than once")]
    DuplicateId(String),

    #[error("question {0} has an empty prompt")]
    EmptyPrompt(String),

    #[error("question {0}: correct answer must be a single word")]
    AnswerNotSingleToken(String),

    #[error("question {id}: answer {answer:?} exceeds {max} characters")]
    AnswerTooLong { id: String, answer: String, max: usize },

    #[error("question {id}: expected 1 to 3 wrong answers, got {count}")]
    WrongAnswerCount { id: String, count: usize },

    #[error("question {id}: wrong answer {answer:?} is listed twice")]
    DuplicateWrongAnswer { id: String, answer: String },

    #[error("question {id}: wrong answer {answer:?} matches the correct answer")]
    WrongAnswerIsCorrect { id: String, answer: String },

    #[error("no question with id {0}")]
    UnknownQuestion(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("expected an answer for question {expected}, got {got}")]
    UnexpectedQuestion { expected: String, got: String },

    #[error("the previous answer is still being revealed")]
    RevealPending,

    #[error("there is no committed answer to advance past")]
    NothingToReveal,

    #[error("the session is already completed")]
    SessionCompleted,

    #[error("the {tier} quiz changed during the session, start it again")]
    ContentChanged { tier: Tier },
}

#[derive(Debug, Error)]
#[error("could not enumerate notification recipients")]
pub struct FanoutError(#[source] pub StoreError);

#[derive(Debug, Error)]
pub enum QuizError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("rejected: {0}")]
    Rejected(#[from] RejectReason),

    #[error("invalid question: {0}")]
    InvalidQuestion(#[from] QuestionError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl QuizError {
    pub fn user_message(&self) -> String {
        match self {
            QuizError::Store(_) => "Something went wrong while saving. Please try again.".to_string(),
            QuizError::Rejected(reason) => reason.user_message(),
            QuizError::InvalidQuestion(err) => err.to_string(),
            QuizError::Session(err) => err.to_string(),
        }
    }
}

pub type Result<T, E = QuizError> = std::result::Result<T, E>;
