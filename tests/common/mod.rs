#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use quiz_tiers::config::EngineConfig;
use quiz_tiers::quiz::editor::QuizEditor;
use quiz_tiers::quiz::notify::NotificationFanout;
use quiz_tiers::quiz::reconcile::Reconciler;
use quiz_tiers::quiz::session::{CommitOutcome, Session, SessionEngine};
use quiz_tiers::quiz::store::{ContentStore, ManualClock, MemoryStore};
use quiz_tiers::quiz::{
    NotificationCategory, Question, Quiz, QuizAnswer, QuizAttempt, Role, Tier, UserProfile,
};

pub const LEARNER: &str = "ana";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub editor: QuizEditor,
    pub reconciler: Reconciler,
    pub sessions: SessionEngine,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.add_user(UserProfile::new(LEARNER, "ana@example.com", Role::Learner)).await;
        store.add_user(UserProfile::new("ed", "ed@example.com", Role::Editor)).await;

        let clock = Arc::new(ManualClock::new(1_000));
        let config = EngineConfig::default().with_reveal_delay(Duration::ZERO);
        let fanout = NotificationFanout::new(store.clone(), store.clone(), clock.clone());
        let reconciler = Reconciler::new(store.clone(), fanout.clone());
        let editor = QuizEditor::new(store.clone(), reconciler.clone(), clock.clone(), &config);
        let sessions = SessionEngine::new(store.clone(), fanout, clock.clone(), &config);
        Self {
            store,
            clock,
            editor,
            reconciler,
            sessions,
        }
    }

    pub async fn add_learner(&self, id: &str) {
        self.store
            .add_user(UserProfile::new(id, format!("{id}@example.com"), Role::Learner))
            .await;
    }

    /// Saves `count` questions for `tier` and waits for the resulting reconciliation.
    pub async fn seed(&self, tier: Tier, count: usize) -> Quiz {
        let receipt = self
            .editor
            .save_quiz(tier, questions(tier, 0..count))
            .await
            .expect("seed quiz");
        if let Some(handle) = receipt.reconciliation {
            handle.await.expect("seed reconciliation");
        }
        self.clock.advance(1_000);
        receipt.quiz
    }

    pub async fn perfect(&self, user: &str, tier: Tier) {
        self.store.put_attempt(&attempt(user, tier, 5, 5)).await.expect("put attempt");
    }

    /// Answers every remaining question, getting the ones listed in `wrong` wrong.
    pub async fn play(&self, session: &mut Session, wrong: &[usize]) -> CommitOutcome {
        let mut last = CommitOutcome::Ignored;
        let mut position = 0;
        while let Some(question) = session.current_question().cloned() {
            let selected = if wrong.contains(&position) {
                question.wrong_answers[0].clone()
            } else {
                question.correct_answer.clone()
            };
            last = self
                .sessions
                .commit_answer(session, &question.id, &selected)
                .await
                .expect("commit answer");
            position += 1;
        }
        last
    }

    pub async fn categories_for(&self, user: &str) -> Vec<NotificationCategory> {
        self.store
            .notifications_for(user)
            .await
            .into_iter()
            .map(|n| n.category)
            .collect()
    }
}

pub fn question(tier: Tier, n: usize) -> Question {
    Question::new(
        format!("{tier}-{n}"),
        format!("{tier} question {n}"),
        format!("right{n}"),
        vec![format!("wrong{n}"), format!("other{n}")],
    )
}

pub fn questions(tier: Tier, range: std::ops::Range<usize>) -> Vec<Question> {
    range.map(|n| question(tier, n)).collect()
}

pub fn attempt(user: &str, tier: Tier, score: u32, total: u32) -> QuizAttempt {
    QuizAttempt {
        id: format!("{user}-{tier}-{score}-{total}-{}", rand_suffix()),
        user_id: user.to_string(),
        tier,
        score,
        total,
        percentage: f64::from(score) / f64::from(total) * 100.0,
        completed_at: 500,
        answers: Vec::<QuizAnswer>::new(),
    }
}

fn rand_suffix() -> u64 {
    rand::random()
}
