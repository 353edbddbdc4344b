use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::editor::validate_questions;
use super::error::StoreError;
use super::{best_attempt, Notification, Quiz, QuizAttempt, QuizProgress, Role, Tier, UserProfile};

/// Deletes report how much they removed; deleting something absent is `Ok`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_quiz(&self, tier: Tier) -> Result<Option<Quiz>, StoreError>;
    async fn put_quiz(&self, quiz: &Quiz) -> Result<(), StoreError>;
    /// Returns `false` when there was no quiz for `tier`.
    async fn delete_quiz(&self, tier: Tier) -> Result<bool, StoreError>;

    async fn list_attempts(&self, user_id: &str, tier: Tier) -> Result<Vec<QuizAttempt>, StoreError>;
    async fn list_user_attempts(&self, user_id: &str) -> Result<Vec<QuizAttempt>, StoreError>;
    async fn put_attempt(&self, attempt: &QuizAttempt) -> Result<(), StoreError>;
    /// Deletes every user's attempts for `tier` and nothing else.
    async fn delete_attempts_for_tier(&self, tier: Tier) -> Result<usize, StoreError>;

    async fn get_progress(&self, user_id: &str, tier: Tier) -> Result<Option<QuizProgress>, StoreError>;
    async fn put_progress(&self, progress: &QuizProgress) -> Result<(), StoreError>;
    async fn delete_progress(&self, user_id: &str, tier: Tier) -> Result<bool, StoreError>;
    /// Deletes every user's progress for `tier` and nothing else.
    async fn delete_progress_for_tier(&self, tier: Tier) -> Result<usize, StoreError>;

    async fn list_users_with_role(&self, role: Role) -> Result<Vec<UserProfile>, StoreError>;

    async fn best_attempt(&self, user_id: &str, tier: Tier) -> Result<Option<QuizAttempt>, StoreError> {
        let attempts = self.list_attempts(user_id, tier).await?;
        Ok(best_attempt(&attempts).cloned())
    }

    async fn best_percentages(&self, user_id: &str) -> Result<BTreeMap<Tier, f64>, StoreError> {
        let attempts = self.list_user_attempts(user_id).await?;
        let mut best = BTreeMap::new();
        for attempt in attempts {
            let entry = best.entry(attempt.tier).or_insert(attempt.percentage);
            if attempt.percentage > *entry {
                *entry = attempt.percentage;
            }
        }
        Ok(best)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Created,
    /// A notification with the same id was already written.
    AlreadyPresent,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<Delivery, StoreError>;
}

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self(AtomicI64::new(start))
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Inner {
    quizzes: BTreeMap<Tier, Quiz>,
    attempts: Vec<QuizAttempt>,
    progress: HashMap<(String, Tier), QuizProgress>,
    users: Vec<UserProfile>,
    notifications: Vec<Notification>,
    failing_recipients: HashSet<String>,
    fail_deletes: bool,
}

impl Inner {
    fn check_deletes(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.fail_deletes {
            return Err(StoreError::unavailable(operation, "deletes are disabled"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store holding the quizzes of a JSON array, validated like editor input.
    pub fn from_quizzes_json(json: &str, max_answer_len: usize) -> Result<Self, StoreError> {
        let parsed: Vec<Quiz> = serde_json::from_str(json)?;
        let mut quizzes = BTreeMap::new();
        for quiz in parsed {
            let tier = quiz.tier;
            validate_questions(&quiz.questions, max_answer_len)
                .map_err(|err| StoreError::InvalidSeed(format!("{tier}: {err}")))?;
            if quizzes.insert(tier, quiz).is_some() {
                return Err(StoreError::InvalidSeed(format!("{tier} is listed more than once")));
            }
        }
        let inner = Inner {
            quizzes,
            ..Inner::default()
        };
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    pub async fn add_user(&self, user: UserProfile) {
        self.inner.write().await.users.push(user);
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.read().await.notifications.clone()
    }

    pub async fn notifications_for(&self, recipient: &str) -> Vec<Notification> {
        self.inner
            .read()
            .await
            .notifications
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }

    pub async fn attempt_count(&self, tier: Tier) -> usize {
        self.inner.read().await.attempts.iter().filter(|a| a.tier == tier).count()
    }

    pub async fn progress_count(&self, tier: Tier) -> usize {
        self.inner.read().await.progress.keys().filter(|(_, t)| *t == tier).count()
    }

    pub async fn fail_deliveries_to(&self, recipient: impl Into<String>) {
        self.inner.write().await.failing_recipients.insert(recipient.into());
    }

    pub async fn fail_deletes(&self, fail: bool) {
        self.inner.write().await.fail_deletes = fail;
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_quiz(&self, tier: Tier) -> Result<Option<Quiz>, StoreError> {
        Ok(self.inner.read().await.quizzes.get(&tier).cloned())
    }

    async fn put_quiz(&self, quiz: &Quiz) -> Result<(), StoreError> {
        self.inner.write().await.quizzes.insert(quiz.tier, quiz.clone());
        Ok(())
    }

    async fn delete_quiz(&self, tier: Tier) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.quizzes.remove(&tier).is_some())
    }

    async fn list_attempts(&self, user_id: &str, tier: Tier) -> Result<Vec<QuizAttempt>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.tier == tier)
            .cloned()
            .collect())
    }

    async fn list_user_attempts(&self, user_id: &str) -> Result<Vec<QuizAttempt>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.attempts.iter().filter(|a| a.user_id == user_id).cloned().collect())
    }

    async fn put_attempt(&self, attempt: &QuizAttempt) -> Result<(), StoreError> {
        self.inner.write().await.attempts.push(attempt.clone());
        Ok(())
    }

    async fn delete_attempts_for_tier(&self, tier: Tier) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_deletes("delete_attempts_for_tier")?;
        let before = inner.attempts.len();
        inner.attempts.retain(|a| a.tier != tier);
        Ok(before - inner.attempts.len())
    }

    async fn get_progress(&self, user_id: &str, tier: Tier) -> Result<Option<QuizProgress>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.progress.get(&(user_id.to_string(), tier)).cloned())
    }

    async fn put_progress(&self, progress: &QuizProgress) -> Result<(), StoreError> {
        let key = (progress.user_id.clone(), progress.tier);
        self.inner.write().await.progress.insert(key, progress.clone());
        Ok(())
    }

    async fn delete_progress(&self, user_id: &str, tier: Tier) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_deletes("delete_progress")?;
        Ok(inner.progress.remove(&(user_id.to_string(), tier)).is_some())
    }

    async fn delete_progress_for_tier(&self, tier: Tier) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_deletes("delete_progress_for_tier")?;
        let before = inner.progress.len();
        inner.progress.retain(|(_, t), _| *t != tier);
        Ok(before - inner.progress.len())
    }

    async fn list_users_with_role(&self, role: Role) -> Result<Vec<UserProfile>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().filter(|u| u.role == role).cloned().collect())
    }
}

#[async_trait]
impl NotificationSink for MemoryStore {
    async fn deliver(&self, notification: &Notification) -> Result<Delivery, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.failing_recipients.contains(&notification.recipient) {
            return Err(StoreError::unavailable(
                "deliver",
                format!("recipient {} rejected the write", notification.recipient),
            ));
        }
        if inner.notifications.iter().any(|n| n.id == notification.id) {
            return Ok(Delivery::AlreadyPresent);
        }
        inner.notifications.push(notification.clone());
        Ok(Delivery::Created)
    }
}
