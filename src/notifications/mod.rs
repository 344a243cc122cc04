use crate::events::{Event, EventSender};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slog::Logger;
use thiserror::Error;
use uuid::Uuid;

/// A message addressed to a principal or vendor
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub subject_id: Uuid,
    pub message: String,
    /// Delivery address when the recipient is external (vendor email)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        notification_type: NotificationType,
        subject_id: Uuid,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_type,
            subject_id,
            message: message.into(),
            address: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Types of notifications
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    PurchaseOrderSent,
    ApprovalRequested,
    ApprovalDelegated,
    WorkflowCompleted,
    MaterialReviewed,
}

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// Outbound notification contract. Callers treat delivery as fire-and-forget.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(
        &self,
        recipient_id: Uuid,
        notification: Notification,
    ) -> Result<(), NotificationError>;
}

/// Dispatches a notification, logging and counting failures instead of returning them.
pub async fn notify_best_effort(
    service: &dyn NotificationService,
    recipient_id: Uuid,
    notification: Notification,
) {
    let kind = notification.notification_type;
    if let Err(err) = service.notify(recipient_id, notification).await {
        crate::metrics::NOTIFICATION_FAILURES.inc();
        tracing::warn!(%recipient_id, kind = %kind, error = %err, "notification dispatch failed");
    }
}

/// Writes notifications to the audit log
#[derive(Clone)]
pub struct LogNotificationService {
    logger: Logger,
}

impl LogNotificationService {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl NotificationService for LogNotificationService {
    async fn notify(
        &self,
        recipient_id: Uuid,
        notification: Notification,
    ) -> Result<(), NotificationError> {
        slog::info!(
            self.logger,
            "notification";
            "recipient_id" => recipient_id.to_string(),
            "type" => notification.notification_type.to_string(),
            "subject_id" => notification.subject_id.to_string(),
            "message" => notification.message,
        );
        Ok(())
    }
}

/// Publishes notifications onto the domain event channel
#[derive(Clone)]
pub struct EventNotificationService {
    events: EventSender,
}

impl EventNotificationService {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }
}

#[async_trait]
impl NotificationService for EventNotificationService {
    async fn notify(
        &self,
        recipient_id: Uuid,
        notification: Notification,
    ) -> Result<(), NotificationError> {
        self.events
            .send(Event::NotificationDispatched {
                recipient_id,
                kind: notification.notification_type.to_string(),
            })
            .await
            .map_err(NotificationError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let mut mock = MockNotificationService::new();
        mock.expect_notify()
            .times(1)
            .returning(|_, _| Err(NotificationError::Delivery("smtp down".into())));

        let before = crate::metrics::NOTIFICATION_FAILURES.get();
        notify_best_effort(
            &mock,
            Uuid::new_v4(),
            Notification::new(NotificationType::PurchaseOrderSent, Uuid::new_v4(), "PO sent"),
        )
        .await;
        assert!(crate::metrics::NOTIFICATION_FAILURES.get() > before);
    }

    #[tokio::test]
    async fn event_service_publishes_dispatch_event() {
        let (sender, mut rx) = crate::events::channel(2);
        let service = EventNotificationService::new(sender);
        let recipient = Uuid::new_v4();
        service
            .notify(
                recipient,
                Notification::new(NotificationType::ApprovalRequested, Uuid::new_v4(), "review"),
            )
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            Event::NotificationDispatched {
                recipient_id: recipient,
                kind: "approval_requested".into(),
            }
        );
    }
}
