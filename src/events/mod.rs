use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!(error = %err, "domain event dropped");
        }
    }
}

/// Domain events emitted after a state change has been committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    PurchaseRequestCreated {
        request_id: Uuid,
        project_id: Uuid,
    },
    PurchaseRequestStatusChanged {
        request_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PurchaseOrderCreated {
        order_id: Uuid,
        request_id: Uuid,
        po_number: String,
    },
    PurchaseOrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    DeliveryRecorded {
        order_id: Uuid,
        confirmation_id: Uuid,
        quantity_received: Decimal,
        total_received: Decimal,
    },
    DeliveryRemoved {
        order_id: Uuid,
        confirmation_id: Uuid,
        total_received: Decimal,
    },
    WorkflowStarted {
        workflow_id: Uuid,
        subject_type: String,
        subject_id: Uuid,
    },
    WorkflowActionRecorded {
        workflow_id: Uuid,
        actor_id: Uuid,
        action: String,
    },
    WorkflowCompleted {
        workflow_id: Uuid,
        status: String,
        completed_at: DateTime<Utc>,
    },
    MaterialSubmittalReviewed {
        submittal_id: Uuid,
        reviewer_id: Uuid,
        status: String,
    },
    NotificationDispatched {
        recipient_id: Uuid,
        kind: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::PurchaseRequestCreated { .. } => "purchase_request_created",
            Event::PurchaseRequestStatusChanged { .. } => "purchase_request_status_changed",
            Event::PurchaseOrderCreated { .. } => "purchase_order_created",
            Event::PurchaseOrderStatusChanged { .. } => "purchase_order_status_changed",
            Event::DeliveryRecorded { .. } => "delivery_recorded",
            Event::DeliveryRemoved { .. } => "delivery_removed",
            Event::WorkflowStarted { .. } => "workflow_started",
            Event::WorkflowActionRecorded { .. } => "workflow_action_recorded",
            Event::WorkflowCompleted { .. } => "workflow_completed",
            Event::MaterialSubmittalReviewed { .. } => "material_submittal_reviewed",
            Event::NotificationDispatched { .. } => "notification_dispatched",
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging every event, until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PurchaseOrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "purchase order status changed"),
            Event::DeliveryRecorded {
                order_id,
                quantity_received,
                total_received,
                ..
            } => info!(
                %order_id,
                %quantity_received,
                %total_received,
                "delivery recorded"
            ),
            Event::WorkflowCompleted {
                workflow_id,
                status,
                ..
            } => info!(%workflow_id, %status, "approval workflow completed"),
            other => debug!(event = other.name(), payload = ?other, "domain event"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_through_channel() {
        let (sender, mut rx) = channel(4);
        let order_id = Uuid::new_v4();
        sender
            .send(Event::PurchaseOrderStatusChanged {
                order_id,
                old_status: "draft".into(),
                new_status: "sent".into(),
            })
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "purchase_order_status_changed");
    }

    #[tokio::test]
    async fn send_or_log_tolerates_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        sender
            .send_or_log(Event::PurchaseRequestCreated {
                request_id: Uuid::new_v4(),
                project_id: Uuid::new_v4(),
            })
            .await;
    }
}
