pub mod config;
pub mod quiz;

pub use config::EngineConfig;
pub use quiz::error::{QuizError, RejectReason};
pub use quiz::{Quiz, Question, QuizAnswer, QuizAttempt, QuizProgress, Tier};
