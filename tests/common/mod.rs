#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use siteflow_api::{
    auth::{
        InMemoryPrincipalDirectory, InMemoryProjectDirectory, Principal, RbacAccessResolver, Role,
    },
    build_router,
    config::AppConfig,
    events::{self, Event},
    logging,
    middleware_helpers::RetryConfig,
    models::{PurchaseRequest, Vendor, WorkflowType},
    notifications::{Notification, NotificationError, NotificationService},
    services::{
        approval_workflow::ActionRequest,
        procurement::{
            ConfirmDeliveryRequest, NewPurchaseOrder, NewPurchaseRequest, NewVendor, OrderView,
            ProcurementDeps, ProcurementService, SubmitForApproval,
        },
        vendors::StoreVendorDirectory,
    },
    store::InMemoryProcurementStore,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Notification sink that records every dispatch and can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Uuid, Notification)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail_from_now_on(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Uuid, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn notify(
        &self,
        recipient_id: Uuid,
        notification: Notification,
    ) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Delivery("smtp relay unreachable".into()));
        }
        self.sent.lock().unwrap().push((recipient_id, notification));
        Ok(())
    }
}

/// A procurement service over the in-memory store with a small cast of
/// principals who all belong to one project.
pub struct TestContext {
    pub service: ProcurementService,
    pub store: Arc<InMemoryProcurementStore>,
    pub projects: Arc<InMemoryProjectDirectory>,
    pub principals: Arc<InMemoryPrincipalDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub events: mpsc::Receiver<Event>,
    pub project_id: Uuid,
    /// Engineer who raises requests and submits materials.
    pub requester: Principal,
    /// Project manager, first approver.
    pub approver_a: Principal,
    /// Client representative, second approver.
    pub approver_b: Principal,
    /// Procurement officer who owns orders.
    pub purchaser: Principal,
    /// Procurement manager; may delete deliveries.
    pub manager: Principal,
    /// Engineer with no project membership.
    pub outsider: Principal,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryProcurementStore::new());
        let projects = Arc::new(InMemoryProjectDirectory::default());
        let principals = Arc::new(InMemoryPrincipalDirectory::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let (sender, events) = events::channel(4096);

        let project_id = Uuid::new_v4();
        let member = |role: Role, in_project: bool| {
            let principal = Principal::new(Uuid::new_v4(), role);
            principals.register(principal.id, role);
            if in_project {
                projects.assign(principal.id, project_id);
            }
            principal
        };
        let requester = member(Role::Engineer, true);
        let approver_a = member(Role::ProjectManager, true);
        let approver_b = member(Role::Client, true);
        let purchaser = member(Role::ProcurementOfficer, false);
        let manager = member(Role::ProcurementManager, false);
        let outsider = member(Role::Engineer, false);

        let service = ProcurementService::new(ProcurementDeps {
            store: store.clone(),
            access: Arc::new(RbacAccessResolver::new(projects.clone())),
            vendors: Arc::new(StoreVendorDirectory::new(store.clone())),
            principals: principals.clone(),
            notifier: notifier.clone(),
            events: sender,
            retry: RetryConfig::new(3, 1),
            logger: logging::plain_logger(),
        });

        Self {
            service,
            store,
            projects,
            principals,
            notifier,
            events,
            project_id,
            requester,
            approver_a,
            approver_b,
            purchaser,
            manager,
            outsider,
        }
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub fn new_request_input(&self, quantity: Decimal) -> NewPurchaseRequest {
        NewPurchaseRequest {
            project_id: self.project_id,
            item_description: "Ready-mix concrete C30/37".to_string(),
            quantity,
            unit_of_measure: "m3".to_string(),
            estimated_cost: Some(quantity * Decimal::from(120)),
            required_date: today() + Days::new(14),
            urgency: None,
            justification: Some("Level 2 slab pour".to_string()),
        }
    }

    pub async fn draft_request(&self, quantity: Decimal) -> PurchaseRequest {
        self.service
            .create_request(&self.requester, self.new_request_input(quantity))
            .await
            .expect("draft request")
    }

    pub fn sequential_submission(&self) -> SubmitForApproval {
        SubmitForApproval {
            approvers: vec![self.approver_a.id, self.approver_b.id],
            workflow_type: Some(WorkflowType::Sequential),
            ..SubmitForApproval::default()
        }
    }

    /// Draft, submit, and have both approvers sign off in order.
    pub async fn approved_request(&self, quantity: Decimal) -> PurchaseRequest {
        let draft = self.draft_request(quantity).await;
        let submission = self
            .service
            .submit_request(&self.requester, draft.id, self.sequential_submission())
            .await
            .expect("submission");
        for approver in [&self.approver_a, &self.approver_b] {
            self.service
                .record_workflow_action(approver, submission.workflow.id, approve())
                .await
                .expect("approval");
        }
        self.service
            .get_request(&self.requester, draft.id)
            .await
            .expect("approved request")
    }

    pub async fn vendor(&self) -> Vendor {
        self.service
            .create_vendor(
                &self.purchaser,
                NewVendor {
                    company_name: "Northside Aggregates Ltd".to_string(),
                    contact_name: Some("Dana Ortiz".to_string()),
                    contact_email: Some("orders@northside.example".to_string()),
                    contact_phone: None,
                    payment_terms: Some("Net 30".to_string()),
                },
            )
            .await
            .expect("vendor")
    }

    pub async fn draft_order(&self, quantity: Decimal) -> OrderView {
        let request = self.approved_request(quantity).await;
        let vendor = self.vendor().await;
        self.service
            .create_order(
                &self.purchaser,
                NewPurchaseOrder {
                    request_id: request.id,
                    vendor_id: vendor.id,
                    total_amount: None,
                    po_date: None,
                    expected_delivery_date: Some(today() + Days::new(7)),
                    terms: None,
                },
            )
            .await
            .expect("draft order")
    }

    /// A draft order moved through `sent` into `confirmed`.
    pub async fn confirmed_order(&self, quantity: Decimal) -> OrderView {
        use siteflow_api::models::PurchaseOrderStatus::{Confirmed, Sent};
        let order = self.draft_order(quantity).await;
        self.service
            .transition_order(&self.purchaser, order.order.id, Sent)
            .await
            .expect("sent");
        self.service
            .transition_order(&self.purchaser, order.order.id, Confirmed)
            .await
            .expect("confirmed")
    }

    pub fn router(&self) -> Router {
        build_router(AppState::new(AppConfig::default(), self.service.clone()))
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn approve() -> ActionRequest {
    ActionRequest {
        action: siteflow_api::models::ActionType::Approve,
        comments: None,
        delegate_to: None,
    }
}

pub fn reject(comment: &str) -> ActionRequest {
    ActionRequest {
        action: siteflow_api::models::ActionType::Reject,
        comments: Some(comment.to_string()),
        delegate_to: None,
    }
}

pub fn delivery(quantity: Decimal) -> ConfirmDeliveryRequest {
    ConfirmDeliveryRequest {
        delivery_date: today(),
        quantity_received: quantity,
        condition_notes: None,
        photo_refs: Vec::new(),
        status: None,
    }
}

/// Sends one request through the router as `actor`.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    actor: Option<&Principal>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder
            .header("x-user-id", actor.id.to_string())
            .header("x-user-role", actor.role.to_string());
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    router.clone().oneshot(request).await.unwrap()
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
