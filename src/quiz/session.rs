use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{RejectReason, Result, SessionError};
use super::notify::{NotificationDraft, NotificationFanout};
use super::store::{Clock, ContentStore};
use super::unlock::{derive_unlock_states, UnlockStates};
use super::{percentage, NotificationCategory, Question, Quiz, QuizAnswer, QuizAttempt, QuizProgress, Tier};
use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
    /// The quiz changed underneath the session; it can no longer be answered or saved.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    Fresh,
    Resumed,
    /// Saved progress no longer matched the quiz and was discarded.
    Restarted,
}

#[derive(Debug, Clone)]
pub struct Session {
    questions: Vec<Question>,
    progress: QuizProgress,
    status: SessionStatus,
    origin: SessionOrigin,
    revealing: Option<QuizAnswer>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.progress.user_id
    }

    pub fn tier(&self) -> Tier {
        self.progress.tier
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }

    pub fn progress(&self) -> &QuizProgress {
        &self.progress
    }

    pub fn current_index(&self) -> usize {
        self.progress.current_question_index
    }

    pub fn score(&self) -> u32 {
        self.progress.score
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn question_order(&self) -> &[String] {
        &self.progress.question_order
    }

    pub fn answers(&self) -> &[QuizAnswer] {
        &self.progress.answers
    }

    /// `None` once every question has been answered and advanced past.
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.progress.current_question_index)
    }

    pub fn revealing(&self) -> Option<&QuizAnswer> {
        self.revealing.as_ref()
    }

    pub fn has_answered(&self, question_id: &str) -> bool {
        self.progress.answers.iter().any(|a| a.question_id == question_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub attempt: QuizAttempt,
    /// `None` if the unlock states could not be re-read after the attempt was written.
    pub unlocks: Option<UnlockStates>,
    pub notified: Vec<NotificationCategory>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Ignored,
    Advanced { answer: QuizAnswer },
    Completed(Completion),
}

pub struct SessionEngine {
    store: Arc<dyn ContentStore>,
    fanout: NotificationFanout,
    clock: Arc<dyn Clock>,
    reveal_delay: Duration,
}

impl SessionEngine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        fanout: NotificationFanout,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            fanout,
            clock,
            reveal_delay: config.reveal_delay,
        }
    }

    pub async fn unlock_states(&self, user_id: &str) -> Result<UnlockStates> {
        let best = self.store.best_percentages(user_id).await?;
        Ok(derive_unlock_states(&Tier::ALL, &best))
    }

    pub async fn open_tier(&self, user_id: &str, tier: Tier) -> Result<Session> {
        let quiz = self
            .store
            .get_quiz(tier)
            .await?
            .ok_or(RejectReason::QuizNotFound { tier })?;
        self.start_or_resume(user_id, &quiz).await
    }

    pub async fn start_or_resume(&self, user_id: &str, quiz: &Quiz) -> Result<Session> {
        let tier = quiz.tier;
        self.unlock_states(user_id).await?.check_startable(tier)?;
        if quiz.questions.is_empty() {
            return Err(RejectReason::EmptyTier { tier }.into());
        }

        let saved = match self.store.get_progress(user_id, tier).await? {
            None => return Ok(self.fresh(user_id, quiz, SessionOrigin::Fresh)),
            Some(saved) => saved,
        };

        if matches_quiz(&saved, quiz) {
            log::debug!(
                "resuming {user_id} on {tier} at {}/{}",
                saved.current_question_index,
                quiz.total()
            );
            return Ok(resume(saved, quiz));
        }

        log::info!("discarding stale {tier} progress of {user_id}");
        self.store.delete_progress(user_id, tier).await?;
        self.fanout
            .notify_one(&reset_notice(tier, saved.last_updated), user_id)
            .await;
        Ok(self.fresh(user_id, quiz, SessionOrigin::Restarted))
    }

    /// Returns `None` when the question already has an answer.
    pub fn record_answer(
        &self,
        session: &mut Session,
        question_id: &str,
        selected: &str,
    ) -> Result<Option<QuizAnswer>, SessionError> {
        match session.status {
            SessionStatus::Completed => return Err(SessionError::SessionCompleted),
            SessionStatus::Discarded => {
                return Err(SessionError::ContentChanged { tier: session.tier() })
            }
            SessionStatus::NotStarted | SessionStatus::InProgress => {}
        }
        if session.has_answered(question_id) {
            return Ok(None);
        }
        if session.revealing.is_some() {
            return Err(SessionError::RevealPending);
        }
        let question = session
            .current_question()
            .ok_or(SessionError::SessionCompleted)?;
        if question.id != question_id {
            return Err(SessionError::UnexpectedQuestion {
                expected: question.id.clone(),
                got: question_id.to_string(),
            });
        }

        let answer = QuizAnswer::new(question_id, selected, question.is_correct(selected));
        if answer.is_correct {
            session.progress.score += 1;
        }
        session.progress.answers.push(answer.clone());
        session.revealing = Some(answer.clone());
        session.status = SessionStatus::InProgress;
        Ok(Some(answer))
    }

    /// The stored quiz is re-read first; if it no longer matches the session's
    /// order the session is discarded and nothing is written. On a store error
    /// the session is left as it was so the call can be retried.
    pub async fn advance(&self, session: &mut Session) -> Result<CommitOutcome> {
        if session.status == SessionStatus::Discarded {
            return Err(SessionError::ContentChanged { tier: session.tier() }.into());
        }
        let answer = session.revealing.clone().ok_or(SessionError::NothingToReveal)?;
        self.ensure_current(session).await?;
        let next = session.progress.current_question_index + 1;
        if next >= session.total() {
            let completion = self.complete(session).await?;
            return Ok(CommitOutcome::Completed(completion));
        }

        let mut progress = session.progress.clone();
        progress.current_question_index = next;
        progress.last_updated = self.clock.now_millis();
        self.store.put_progress(&progress).await?;

        session.progress = progress;
        session.revealing = None;
        Ok(CommitOutcome::Advanced { answer })
    }

    pub async fn commit_answer(
        &self,
        session: &mut Session,
        question_id: &str,
        selected: &str,
    ) -> Result<CommitOutcome> {
        if self.record_answer(session, question_id, selected)?.is_none() {
            return Ok(CommitOutcome::Ignored);
        }
        if !self.reveal_delay.is_zero() {
            tokio::time::sleep(self.reveal_delay).await;
        }
        self.advance(session).await
    }

    /// Completed sessions are never saved; returns whether anything was written.
    pub async fn persist_interrupted(&self, session: &Session) -> Result<bool> {
        if matches!(session.status, SessionStatus::Completed | SessionStatus::Discarded) {
            return Ok(false);
        }
        let mut progress = session.progress.clone();
        progress.last_updated = self.clock.now_millis();
        self.store.put_progress(&progress).await?;
        log::debug!(
            "saved {} progress of {} at {}/{}",
            progress.tier,
            progress.user_id,
            progress.current_question_index,
            session.total()
        );
        Ok(true)
    }

    async fn ensure_current(&self, session: &mut Session) -> Result<()> {
        let tier = session.tier();
        let current = self.store.get_quiz(tier).await?;
        if current.is_some_and(|quiz| matches_quiz(&session.progress, &quiz)) {
            return Ok(());
        }

        let user_id = session.user_id().to_string();
        log::info!("{tier} changed during the session of {user_id}, discarding it");
        session.status = SessionStatus::Discarded;
        session.revealing = None;
        if let Err(err) = self.store.delete_progress(&user_id, tier).await {
            log::warn!("failed to clear discarded {tier} progress of {user_id}: {err}");
        }
        self.fanout
            .notify_one(&reset_notice(tier, session.progress.last_updated), &user_id)
            .await;
        Err(SessionError::ContentChanged { tier }.into())
    }

    fn fresh(&self, user_id: &str, quiz: &Quiz, origin: SessionOrigin) -> Session {
        let mut order = quiz.question_ids();
        order.shuffle(&mut rand::thread_rng());
        let progress = QuizProgress {
            user_id: user_id.to_string(),
            tier: quiz.tier,
            current_question_index: 0,
            score: 0,
            question_order: order,
            answers: Vec::new(),
            last_updated: self.clock.now_millis(),
        };
        log::debug!("fresh {} session for {user_id}", quiz.tier);
        Session {
            questions: ordered_questions(&progress.question_order, quiz),
            progress,
            status: SessionStatus::NotStarted,
            origin,
            revealing: None,
        }
    }

    async fn complete(&self, session: &mut Session) -> Result<Completion> {
        let user_id = session.user_id().to_string();
        let tier = session.tier();
        let total = session.total() as u32;
        let score = session.progress.score;

        let attempt = QuizAttempt {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            tier,
            score,
            total,
            percentage: percentage(score, total),
            completed_at: self.clock.now_millis(),
            answers: session.progress.answers.clone(),
        };
        self.store.put_attempt(&attempt).await?;

        session.progress.current_question_index = session.total();
        session.revealing = None;
        session.status = SessionStatus::Completed;
        log::info!("{user_id} completed {tier}: {score}/{total}");

        // Start discards progress whose index reached the end, so a leftover is harmless.
        if let Err(err) = self.store.delete_progress(&user_id, tier).await {
            log::warn!("failed to clear finished {tier} progress of {user_id}: {err}");
        }

        let unlocks = match self.unlock_states(&user_id).await {
            Ok(unlocks) => Some(unlocks),
            Err(err) => {
                log::warn!("could not re-derive unlock states of {user_id}: {err}");
                None
            }
        };

        let mut notified = Vec::new();
        for notice in completion_notices(&attempt, unlocks.as_ref()) {
            if self.fanout.notify_one(&notice, &user_id).await {
                notified.push(notice.category);
            }
        }

        Ok(Completion {
            attempt,
            unlocks,
            notified,
        })
    }
}

fn resume(saved: QuizProgress, quiz: &Quiz) -> Session {
    let pending = saved
        .question_order
        .get(saved.current_question_index)
        .and_then(|id| saved.answers.iter().find(|a| &a.question_id == id))
        .cloned();
    Session {
        questions: ordered_questions(&saved.question_order, quiz),
        progress: saved,
        status: SessionStatus::InProgress,
        origin: SessionOrigin::Resumed,
        revealing: pending,
    }
}

fn ordered_questions(order: &[String], quiz: &Quiz) -> Vec<Question> {
    order.iter().filter_map(|id| quiz.question(id).cloned()).collect()
}

/// The saved order must be a permutation of the quiz's ids, the index must
/// point at an unfinished question and every answer must belong to the quiz.
pub fn matches_quiz(progress: &QuizProgress, quiz: &Quiz) -> bool {
    let current: HashSet<&str> = quiz.questions.iter().map(|q| q.id.as_str()).collect();
    let saved: HashSet<&str> = progress.question_order.iter().map(String::as_str).collect();

    progress.tier == quiz.tier
        && progress.question_order.len() == quiz.total()
        && saved.len() == progress.question_order.len()
        && saved == current
        && progress.current_question_index < quiz.total()
        && progress.answers.len() <= progress.current_question_index + 1
        && progress.score as usize <= progress.answers.len()
        && progress
            .answers
            .iter()
            .all(|a| current.contains(a.question_id.as_str()))
}

fn reset_notice(tier: Tier, key: i64) -> NotificationDraft {
    NotificationDraft::new(
        NotificationCategory::SessionReset,
        format!("{tier} session restarted"),
        format!("The {tier} quiz changed since you last played, so your session was restarted from the beginning."),
        format!("{tier}/reset/{key}"),
    )
}

fn completion_notices(attempt: &QuizAttempt, unlocks: Option<&UnlockStates>) -> Vec<NotificationDraft> {
    let tier = attempt.tier;
    let key = attempt.id.clone();

    if !attempt.is_perfect() {
        let goal = match tier.next() {
            Some(next) => format!("Score 100% to unlock {next}."),
            None => "Score 100% to perfect it.".to_string(),
        };
        return vec![NotificationDraft::new(
            NotificationCategory::QuizCompleted,
            format!("{tier} quiz completed"),
            format!(
                "You scored {}/{} ({:.0}%). {goal}",
                attempt.score, attempt.total, attempt.percentage
            ),
            key,
        )];
    }

    let mut body = format!("You scored 100% on {tier}.");
    if let Some(next) = tier.next() {
        body.push_str(&format!(" {next} is now unlocked."));
    }
    let mut notices = vec![NotificationDraft::new(
        NotificationCategory::PerfectScore,
        "Perfect score!",
        body,
        key.clone(),
    )];
    if tier.is_last() && unlocks.is_some_and(UnlockStates::all_perfected) {
        notices.push(NotificationDraft::new(
            NotificationCategory::AllTiersComplete,
            "All tiers complete",
            "You perfected every quiz tier.",
            key,
        ));
    }
    notices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(ids: &[&str]) -> Quiz {
        let questions = ids
            .iter()
            .map(|id| Question::new(*id, format!("prompt {id}"), "yes", vec!["no".into()]))
            .collect();
        Quiz::new(Tier::Easy, questions)
    }

    fn progress(order: &[&str], index: usize, answers: usize) -> QuizProgress {
        QuizProgress {
            user_id: "ana".into(),
            tier: Tier::Easy,
            current_question_index: index,
            score: 0,
            question_order: order.iter().map(|s| s.to_string()).collect(),
            answers: order
                .iter()
                .take(answers)
                .map(|id| QuizAnswer::new(*id, "no", false))
                .collect(),
            last_updated: 1,
        }
    }

    #[test]
    fn permutation_with_open_index_matches() {
        let q = quiz(&["a", "b", "c"]);
        assert!(matches_quiz(&progress(&["c", "a", "b"], 2, 2), &q));
    }

    #[test]
    fn removed_or_swapped_ids_are_stale() {
        let q = quiz(&["a", "b", "c"]);
        assert!(!matches_quiz(&progress(&["a", "b"], 0, 0), &q));
        assert!(!matches_quiz(&progress(&["a", "b", "d"], 0, 0), &q));
        assert!(!matches_quiz(&progress(&["a", "a", "b"], 0, 0), &q));
    }

    #[test]
    fn finished_index_is_stale() {
        let q = quiz(&["a", "b"]);
        assert!(!matches_quiz(&progress(&["a", "b"], 2, 2), &q));
    }

    #[test]
    fn resume_restores_a_pending_reveal() {
        let q = quiz(&["a", "b", "c"]);
        let session = resume(progress(&["a", "b", "c"], 1, 2), &q);
        assert_eq!(session.revealing().map(|a| a.question_id.as_str()), Some("b"));
        assert_eq!(session.current_question().map(|q| q.id.as_str()), Some("b"));
    }

    #[test]
    fn imperfect_completion_points_at_next_tier() {
        let attempt = QuizAttempt {
            id: "x".into(),
            user_id: "ana".into(),
            tier: Tier::Medium,
            score: 4,
            total: 5,
            percentage: 80.0,
            completed_at: 1,
            answers: Vec::new(),
        };
        let notices = completion_notices(&attempt, None);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].category, NotificationCategory::QuizCompleted);
        assert!(notices[0].body.contains("4/5 (80%)"));
        assert!(notices[0].body.contains("unlock Difficult"));
    }
}
