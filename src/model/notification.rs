//! Notifications addressed to a single player

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    ClashInvitation,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub link: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: Uuid,
        content: impl Into<String>,
        link: impl Into<String>,
        notification_type: NotificationType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            content: content.into(),
            link: link.into(),
            notification_type,
            read: false,
            created_at: Utc::now(),
        }
    }
}
