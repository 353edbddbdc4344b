use std::sync::Arc;

use futures::future::join_all;
use uuid::Uuid;

use super::error::FanoutError;
use super::store::{Clock, ContentStore, Delivery, NotificationSink};
use super::{Notification, NotificationCategory, Role};

const NOTIFICATION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_54a2_93de_4b0e_a1f7_2c8d_90e3_b415);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    /// Identifies the triggering event. The same event never notifies a recipient twice.
    pub event_key: String,
}

impl NotificationDraft {
    pub fn new(
        category: NotificationCategory,
        title: impl Into<String>,
        body: impl Into<String>,
        event_key: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            category,
            event_key: event_key.into(),
        }
    }

    fn address(&self, recipient: &str, created_at: i64) -> Notification {
        let name = format!("{recipient}/{}/{}", self.category.tag(), self.event_key);
        Notification {
            id: Uuid::new_v5(&NOTIFICATION_NAMESPACE, name.as_bytes()),
            recipient: recipient.to_string(),
            title: self.title.clone(),
            body: self.body.clone(),
            category: self.category,
            read: false,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Recipients(Vec<String>),
    /// Every user with the learner role.
    Learners,
}

#[derive(Clone)]
pub struct NotificationFanout {
    store: Arc<dyn ContentStore>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl NotificationFanout {
    pub fn new(store: Arc<dyn ContentStore>, sink: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>) -> Self {
        Self { store, sink, clock }
    }

    /// Returns how many new notifications were written. Only failing to
    /// enumerate the audience is an error.
    pub async fn broadcast(&self, draft: &NotificationDraft, audience: Audience) -> Result<usize, FanoutError> {
        let recipients = match audience {
            Audience::Recipients(recipients) => recipients,
            Audience::Learners => self
                .store
                .list_users_with_role(Role::Learner)
                .await
                .map_err(FanoutError)?
                .into_iter()
                .map(|user| user.id)
                .collect(),
        };

        let created_at = self.clock.now_millis();
        let writes = recipients.iter().map(|recipient| self.write(draft, recipient, created_at));
        let delivered = join_all(writes).await.into_iter().filter(|created| *created).count();

        log::info!(
            "{} notification delivered to {delivered}/{} recipients",
            draft.category.tag(),
            recipients.len()
        );
        Ok(delivered)
    }

    pub async fn notify_one(&self, draft: &NotificationDraft, recipient: &str) -> bool {
        self.write(draft, recipient, self.clock.now_millis()).await
    }

    async fn write(&self, draft: &NotificationDraft, recipient: &str, created_at: i64) -> bool {
        let notification = draft.address(recipient, created_at);
        match self.sink.deliver(&notification).await {
            Ok(Delivery::Created) => true,
            Ok(Delivery::AlreadyPresent) => {
                log::debug!("{} already notified of {}", recipient, draft.event_key);
                false
            }
            Err(err) => {
                log::warn!("failed to notify {recipient}: {err}");
                false
            }
        }
    }
}
