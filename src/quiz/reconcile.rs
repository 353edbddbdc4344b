use std::sync::Arc;

use tokio::task::JoinHandle;

use super::change::Classification;
use super::notify::{Audience, NotificationDraft, NotificationFanout};
use super::store::ContentStore;
use super::{NotificationCategory, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationPolicy {
    pub delete_attempts: bool,
    pub delete_progress: bool,
    pub fan_out: bool,
}

pub fn policy_for(classification: Classification) -> InvalidationPolicy {
    match classification {
        Classification::NoChange | Classification::TextOnly => InvalidationPolicy {
            delete_attempts: false,
            delete_progress: false,
            fan_out: false,
        },
        // In-flight sessions still match the old ids, so they may continue.
        Classification::OnlyAdded => InvalidationPolicy {
            delete_attempts: true,
            delete_progress: false,
            fan_out: true,
        },
        Classification::RemovedOrModified => InvalidationPolicy {
            delete_attempts: true,
            delete_progress: true,
            fan_out: true,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub tier: Tier,
    pub classification: Classification,
    pub old_count: usize,
    pub new_count: usize,
    /// `last_updated` stamped on the quiz by the edit.
    pub revision: i64,
}

impl ContentChange {
    fn event_key(&self) -> String {
        format!("{}/{}", self.tier, self.revision)
    }

    pub fn notice(&self) -> Option<NotificationDraft> {
        let tier = self.tier;
        let (old, new) = (self.old_count, self.new_count);
        let body = match self.classification {
            Classification::NoChange | Classification::TextOnly => return None,
            Classification::OnlyAdded if old == 0 => {
                return Some(NotificationDraft::new(
                    NotificationCategory::QuizUpdated,
                    format!("New {tier} quiz"),
                    format!("A new {tier} quiz with {new} questions is available."),
                    self.event_key(),
                ))
            }
            Classification::OnlyAdded => format!(
                "The {tier} quiz now has {new} questions (was {old}). Your previous best score was reset, \
                 and an unfinished session will start again with the new questions."
            ),
            Classification::RemovedOrModified if old != new => format!(
                "The {tier} quiz changed from {old} to {new} questions. Your progress and best score \
                 were reset, so you will start fresh."
            ),
            Classification::RemovedOrModified => format!(
                "Questions in the {tier} quiz were changed ({new} questions). Your progress and best \
                 score were reset, so you will start fresh."
            ),
        };
        Some(NotificationDraft::new(
            NotificationCategory::QuizUpdated,
            format!("{tier} quiz updated"),
            body,
            self.event_key(),
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted_attempts: usize,
    pub deleted_progress: usize,
    pub notified: usize,
    pub failures: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ContentStore>,
    fanout: NotificationFanout,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ContentStore>, fanout: NotificationFanout) -> Self {
        Self { store, fanout }
    }

    /// Applies the policy for `change`. Deletion and fan-out run concurrently.
    pub async fn reconcile(&self, change: &ContentChange) -> ReconcileReport {
        let policy = policy_for(change.classification);
        log::debug!("reconciling {} edit: {:?} -> {policy:?}", change.tier, change.classification);

        let notice = if policy.fan_out { change.notice() } else { None };
        let (mut report, fanout) = tokio::join!(
            self.invalidate(change.tier, policy.delete_attempts, policy.delete_progress),
            self.announce(notice),
        );
        self.merge_fanout(&mut report, fanout);
        self.log_summary(change.tier, &report);
        report
    }

    pub fn spawn(&self, change: ContentChange) -> JoinHandle<ReconcileReport> {
        let this = self.clone();
        tokio::spawn(async move { this.reconcile(&change).await })
    }

    pub async fn reconcile_deletion(&self, tier: Tier, revision: i64) -> ReconcileReport {
        let notice = NotificationDraft::new(
            NotificationCategory::QuizRemoved,
            format!("{tier} quiz removed"),
            format!("The {tier} quiz was removed along with your progress and scores for it."),
            format!("{tier}/removed/{revision}"),
        );
        let (mut report, fanout) = tokio::join!(self.invalidate(tier, true, true), self.announce(Some(notice)));
        self.merge_fanout(&mut report, fanout);
        self.log_summary(tier, &report);
        report
    }

    pub fn spawn_deletion(&self, tier: Tier, revision: i64) -> JoinHandle<ReconcileReport> {
        let this = self.clone();
        tokio::spawn(async move { this.reconcile_deletion(tier, revision).await })
    }

    async fn invalidate(&self, tier: Tier, attempts: bool, progress: bool) -> ReconcileReport {
        let delete_attempts = async {
            if attempts {
                Some(self.store.delete_attempts_for_tier(tier).await)
            } else {
                None
            }
        };
        let delete_progress = async {
            if progress {
                Some(self.store.delete_progress_for_tier(tier).await)
            } else {
                None
            }
        };
        let (attempts, progress) = tokio::join!(delete_attempts, delete_progress);

        let mut report = ReconcileReport::default();
        match attempts {
            Some(Ok(n)) => report.deleted_attempts = n,
            Some(Err(err)) => {
                log::error!("failed to delete {tier} attempts, best scores may no longer match content: {err}");
                report.failures.push(format!("delete attempts: {err}"));
            }
            None => {}
        }
        match progress {
            Some(Ok(n)) => report.deleted_progress = n,
            Some(Err(err)) => {
                log::error!("failed to delete {tier} progress, stale sessions remain: {err}");
                report.failures.push(format!("delete progress: {err}"));
            }
            None => {}
        }
        report
    }

    async fn announce(&self, notice: Option<NotificationDraft>) -> Option<Result<usize, String>> {
        let notice = notice?;
        Some(
            self.fanout
                .broadcast(&notice, Audience::Learners)
                .await
                .map_err(|err| err.to_string()),
        )
    }

    fn merge_fanout(&self, report: &mut ReconcileReport, fanout: Option<Result<usize, String>>) {
        match fanout {
            Some(Ok(n)) => report.notified = n,
            Some(Err(err)) => {
                log::error!("fan-out failed: {err}");
                report.failures.push(format!("fan-out: {err}"));
            }
            None => {}
        }
    }

    fn log_summary(&self, tier: Tier, report: &ReconcileReport) {
        if report.is_clean() {
            log::info!(
                "reconciled {tier}: {} attempts, {} progress deleted, {} notified",
                report.deleted_attempts,
                report.deleted_progress,
                report.notified
            );
        } else {
            log::error!("reconciliation of {tier} incomplete: {}", report.failures.join("; "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(classification: Classification, old_count: usize, new_count: usize) -> ContentChange {
        ContentChange {
            tier: Tier::Pro,
            classification,
            old_count,
            new_count,
            revision: 7,
        }
    }

    #[test]
    fn policy_table() {
        let keep = policy_for(Classification::NoChange);
        assert!(!keep.delete_attempts && !keep.delete_progress && !keep.fan_out);
        assert_eq!(policy_for(Classification::TextOnly), keep);

        let added = policy_for(Classification::OnlyAdded);
        assert!(added.delete_attempts && !added.delete_progress && added.fan_out);

        let removed = policy_for(Classification::RemovedOrModified);
        assert!(removed.delete_attempts && removed.delete_progress && removed.fan_out);
    }

    #[test]
    fn notice_mentions_counts_when_they_differ() {
        let body = change(Classification::OnlyAdded, 5, 7).notice().map(|n| n.body);
        assert!(body.is_some_and(|b| b.contains('7') && b.contains('5')));

        let body = change(Classification::RemovedOrModified, 5, 4).notice().map(|n| n.body);
        assert!(body.is_some_and(|b| b.contains("from 5 to 4")));
    }

    #[test]
    fn first_save_announces_a_new_quiz() {
        let notice = change(Classification::OnlyAdded, 0, 4).notice().unwrap();
        assert_eq!(notice.title, "New Pro quiz");
        assert!(notice.body.contains("4 questions is available"));
        assert!(!notice.body.contains("reset"));
    }

    #[test]
    fn added_questions_do_not_promise_a_resume() {
        let body = change(Classification::OnlyAdded, 5, 7).notice().unwrap().body;
        assert!(body.contains("start again"));
        assert!(!body.contains("continue where you left off"));
    }

    #[test]
    fn same_count_modification_says_questions_changed() {
        let notice = change(Classification::RemovedOrModified, 6, 6).notice();
        assert!(notice.is_some_and(|n| n.body.contains("were changed (6 questions)")));
    }

    #[test]
    fn quiet_changes_have_no_notice() {
        assert!(change(Classification::TextOnly, 3, 3).notice().is_none());
        assert!(change(Classification::NoChange, 3, 3).notice().is_none());
    }
}
