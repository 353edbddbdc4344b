use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use super::change::{classify_edit, Classification};
use super::error::{QuestionError, Result};
use super::reconcile::{policy_for, ContentChange, ReconcileReport, Reconciler};
use super::store::{Clock, ContentStore};
use super::{Question, Quiz, Tier};
use crate::config::EngineConfig;

#[derive(Debug)]
pub struct EditReceipt {
    pub quiz: Quiz,
    pub change: ContentChange,
    /// `None` when the classification invalidates nothing.
    pub reconciliation: Option<JoinHandle<ReconcileReport>>,
}

impl EditReceipt {
    pub fn classification(&self) -> Classification {
        self.change.classification
    }
}

#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted { reconciliation: JoinHandle<ReconcileReport> },
    AlreadyDeleted,
}

pub struct QuizEditor {
    store: Arc<dyn ContentStore>,
    reconciler: Reconciler,
    clock: Arc<dyn Clock>,
    max_answer_len: usize,
}

impl QuizEditor {
    pub fn new(
        store: Arc<dyn ContentStore>,
        reconciler: Reconciler,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            reconciler,
            clock,
            max_answer_len: config.max_answer_len,
        }
    }

    /// Replaces the question set of `tier`, creating its quiz if there is none.
    pub async fn save_quiz(&self, tier: Tier, questions: Vec<Question>) -> Result<EditReceipt> {
        validate_questions(&questions, self.max_answer_len)?;

        let previous = self.store.get_quiz(tier).await?;
        let (id, old_questions) = match previous {
            Some(quiz) => (quiz.id, quiz.questions),
            None => (Uuid::new_v4().to_string(), Vec::new()),
        };
        let classification = classify_edit(&old_questions, &questions);

        let quiz = Quiz {
            id,
            tier,
            questions,
            last_updated: self.clock.now_millis(),
        };
        self.store.put_quiz(&quiz).await?;

        let change = ContentChange {
            tier,
            classification,
            old_count: old_questions.len(),
            new_count: quiz.total(),
            revision: quiz.last_updated,
        };
        log::info!(
            "saved {tier} quiz: {classification:?}, {} -> {} questions",
            change.old_count,
            change.new_count
        );

        let policy = policy_for(classification);
        let reconciliation = (policy.delete_attempts || policy.delete_progress || policy.fan_out)
            .then(|| self.reconciler.spawn(change.clone()));

        Ok(EditReceipt {
            quiz,
            change,
            reconciliation,
        })
    }

    pub async fn add_question(&self, tier: Tier, question: Question) -> Result<EditReceipt> {
        let mut questions = self.current_questions(tier).await?;
        questions.push(question);
        self.save_quiz(tier, questions).await
    }

    pub async fn update_question(&self, tier: Tier, question: Question) -> Result<EditReceipt> {
        let mut questions = self.current_questions(tier).await?;
        let slot = questions
            .iter_mut()
            .find(|q| q.id == question.id)
            .ok_or_else(|| QuestionError::UnknownQuestion(question.id.clone()))?;
        *slot = question;
        self.save_quiz(tier, questions).await
    }

    pub async fn replace_question(&self, tier: Tier, old_id: &str, question: Question) -> Result<EditReceipt> {
        let mut questions = self.current_questions(tier).await?;
        let slot = questions
            .iter_mut()
            .find(|q| q.id == old_id)
            .ok_or_else(|| QuestionError::UnknownQuestion(old_id.to_string()))?;
        *slot = question;
        self.save_quiz(tier, questions).await
    }

    pub async fn remove_question(&self, tier: Tier, question_id: &str) -> Result<EditReceipt> {
        let mut questions = self.current_questions(tier).await?;
        let before = questions.len();
        questions.retain(|q| q.id != question_id);
        if questions.len() == before {
            return Err(QuestionError::UnknownQuestion(question_id.to_string()).into());
        }
        self.save_quiz(tier, questions).await
    }

    /// Deleting a quiz that is already gone succeeds without side effects.
    pub async fn delete_quiz(&self, tier: Tier) -> Result<DeleteOutcome> {
        if !self.store.delete_quiz(tier).await? {
            log::info!("{tier} quiz already deleted");
            return Ok(DeleteOutcome::AlreadyDeleted);
        }
        log::info!("deleted {tier} quiz");
        let reconciliation = self.reconciler.spawn_deletion(tier, self.clock.now_millis());
        Ok(DeleteOutcome::Deleted { reconciliation })
    }

    async fn current_questions(&self, tier: Tier) -> Result<Vec<Question>> {
        Ok(self
            .store
            .get_quiz(tier)
            .await?
            .map(|quiz| quiz.questions)
            .unwrap_or_default())
    }
}

pub fn validate_questions(questions: &[Question], max_answer_len: usize) -> Result<(), QuestionError> {
    let mut seen = HashSet::new();
    for question in questions {
        if !seen.insert(question.id.as_str()) {
            return Err(QuestionError::DuplicateId(question.id.clone()));
        }
        validate_question(question, max_answer_len)?;
    }
    Ok(())
}

pub fn validate_question(question: &Question, max_answer_len: usize) -> Result<(), QuestionError> {
    let id = &question.id;
    if question.text.trim().is_empty() {
        return Err(QuestionError::EmptyPrompt(id.clone()));
    }

    let correct = question.correct_answer.trim();
    if correct.is_empty() || correct.split_whitespace().count() != 1 {
        return Err(QuestionError::AnswerNotSingleToken(id.clone()));
    }
    check_len(id, correct, max_answer_len)?;

    let count = question.wrong_answers.len();
    if !(1..=3).contains(&count) {
        return Err(QuestionError::WrongAnswerCount { id: id.clone(), count });
    }

    let mut seen = HashSet::new();
    for wrong in &question.wrong_answers {
        let wrong = wrong.trim();
        check_len(id, wrong, max_answer_len)?;
        let folded = wrong.to_lowercase();
        if folded == correct.to_lowercase() {
            return Err(QuestionError::WrongAnswerIsCorrect {
                id: id.clone(),
                answer: wrong.to_string(),
            });
        }
        if !seen.insert(folded) {
            return Err(QuestionError::DuplicateWrongAnswer {
                id: id.clone(),
                answer: wrong.to_string(),
            });
        }
    }
    Ok(())
}

fn check_len(id: &str, answer: &str, max: usize) -> Result<(), QuestionError> {
    if answer.chars().count() > max {
        return Err(QuestionError::AnswerTooLong {
            id: id.to_string(),
            answer: answer.to_string(),
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(wrong: &[&str]) -> Question {
        Question::new(
            "q1",
            "Capital of France?",
            "Paris",
            wrong.iter().map(|w| w.to_string()).collect(),
        )
    }

    #[test]
    fn accepts_a_well_formed_question() {
        assert_eq!(validate_question(&question(&["Lyon", "Nice"]), 40), Ok(()));
    }

    #[test]
    fn rejects_bad_wrong_answer_counts() {
        assert!(matches!(
            validate_question(&question(&[]), 40),
            Err(QuestionError::WrongAnswerCount { count: 0, .. })
        ));
        assert!(matches!(
            validate_question(&question(&["a", "b", "c", "d"]), 40),
            Err(QuestionError::WrongAnswerCount { count: 4, .. })
        ));
    }

    #[test]
    fn wrong_answers_compare_case_insensitively() {
        assert!(matches!(
            validate_question(&question(&["Lyon", "LYON"]), 40),
            Err(QuestionError::DuplicateWrongAnswer { .. })
        ));
        assert!(matches!(
            validate_question(&question(&["paris"]), 40),
            Err(QuestionError::WrongAnswerIsCorrect { .. })
        ));
    }

    #[test]
    fn correct_answer_is_one_bounded_token() {
        let mut q = question(&["Lyon"]);
        q.correct_answer = "New York".into();
        assert_eq!(
            validate_question(&q, 40),
            Err(QuestionError::AnswerNotSingleToken("q1".into()))
        );
        q.correct_answer = "Paris".into();
        assert!(matches!(
            validate_question(&q, 3),
            Err(QuestionError::AnswerTooLong { max: 3, .. })
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let q = question(&["Lyon"]);
        assert_eq!(
            validate_questions(&[q.clone(), q], 40),
            Err(QuestionError::DuplicateId("q1".into()))
        );
    }
}
