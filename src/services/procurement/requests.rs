use super::{non_negative_decimal, positive_decimal, ProcurementService, RequestSubmission};
use crate::{
    auth::{Capability, Principal},
    errors::ServiceError,
    events::Event,
    middleware_helpers::{with_retry, ConflictRetryPolicy},
    models::{
        ApprovalWorkflow, PurchaseRequest, RequestStatus, SubjectType, Urgency, WorkflowStatus,
        WorkflowType,
    },
    services::approval_workflow::StartWorkflow,
    store::{Page, PageRequest, RequestFilter},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct NewPurchaseRequest {
    pub project_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub item_description: String,
    #[validate(custom = "positive_decimal")]
    #[schema(value_type = String)]
    pub quantity: Decimal,
    #[validate(length(min = 1, max = 32))]
    pub unit_of_measure: String,
    #[validate(custom = "non_negative_decimal")]
    #[schema(value_type = Option<String>)]
    pub estimated_cost: Option<Decimal>,
    pub required_date: NaiveDate,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[validate(length(max = 2000))]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct PurchaseRequestUpdate {
    #[validate(length(min = 1, max = 500))]
    pub item_description: Option<String>,
    #[validate(custom = "positive_decimal")]
    #[schema(value_type = Option<String>)]
    pub quantity: Option<Decimal>,
    #[validate(length(min = 1, max = 32))]
    pub unit_of_measure: Option<String>,
    #[validate(custom = "non_negative_decimal")]
    #[schema(value_type = Option<String>)]
    pub estimated_cost: Option<Decimal>,
    pub required_date: Option<NaiveDate>,
    pub urgency: Option<Urgency>,
    #[validate(length(max = 2000))]
    pub justification: Option<String>,
}

/// Approval routing for a request being submitted.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct SubmitForApproval {
    pub approvers: Vec<Uuid>,
    /// Defaults to `sequential`.
    pub workflow_type: Option<WorkflowType>,
    pub approval_sequence: Option<Vec<Uuid>>,
    /// Defaults to the level implied by the request's urgency.
    #[validate(range(min = 1, max = 4))]
    pub priority_level: Option<i32>,
    pub estimated_completion_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub comments: Option<String>,
}

fn check_requester(request: &PurchaseRequest, actor: &Principal) -> Result<(), ServiceError> {
    if request.requester_id == actor.id || actor.role.is_purchase_department() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "principal {} may not modify purchase request {}",
            actor.id, request.id
        )))
    }
}

impl ProcurementService {
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, project_id = %input.project_id))]
    pub async fn create_request(
        &self,
        actor: &Principal,
        input: NewPurchaseRequest,
    ) -> Result<PurchaseRequest, ServiceError> {
        input.validate()?;
        self.authorize(actor, input.project_id, Capability::Edit)
            .await?;

        let now = Utc::now();
        let request = PurchaseRequest {
            id: Uuid::new_v4(),
            project_id: input.project_id,
            requester_id: actor.id,
            item_description: input.item_description,
            quantity: input.quantity,
            unit_of_measure: input.unit_of_measure,
            estimated_cost: input.estimated_cost,
            required_date: input.required_date,
            urgency: input.urgency.unwrap_or(Urgency::Normal),
            status: RequestStatus::Draft,
            justification: input.justification,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let request = self.store.insert_request(request).await?;

        slog::info!(self.audit, "purchase request created";
            "request_id" => %request.id, "actor_id" => %actor.id, "project_id" => %request.project_id);
        self.events
            .send_or_log(Event::PurchaseRequestCreated {
                request_id: request.id,
                project_id: request.project_id,
            })
            .await;
        Ok(request)
    }

    pub async fn get_request(
        &self,
        actor: &Principal,
        id: Uuid,
    ) -> Result<PurchaseRequest, ServiceError> {
        let request = self.load_request(id).await?;
        self.authorize(actor, request.project_id, Capability::View)
            .await?;
        self.settle_request(request).await
    }

    pub async fn list_requests(
        &self,
        actor: &Principal,
        mut filter: RequestFilter,
        page: PageRequest,
    ) -> Result<Page<PurchaseRequest>, ServiceError> {
        filter.visible_projects = self.restriction(actor).await?;
        self.store.list_requests(&filter, page).await
    }

    /// Edits fields of a draft or pending request.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, request_id = %id))]
    pub async fn update_request(
        &self,
        actor: &Principal,
        id: Uuid,
        input: PurchaseRequestUpdate,
    ) -> Result<PurchaseRequest, ServiceError> {
        input.validate()?;
        with_retry(&self.retry, ConflictRetryPolicy, || {
            self.update_request_once(actor, id, input.clone())
        })
        .await
    }

    async fn update_request_once(
        &self,
        actor: &Principal,
        id: Uuid,
        input: PurchaseRequestUpdate,
    ) -> Result<PurchaseRequest, ServiceError> {
        let mut request = self.load_request(id).await?;
        self.authorize(actor, request.project_id, Capability::Edit)
            .await?;
        check_requester(&request, actor)?;
        if !request.status.is_editable() {
            return Err(ServiceError::invalid_transition(request.status, "edited"));
        }

        let expected = request.version;
        if let Some(description) = input.item_description {
            request.item_description = description;
        }
        if let Some(quantity) = input.quantity {
            request.quantity = quantity;
        }
        if let Some(unit) = input.unit_of_measure {
            request.unit_of_measure = unit;
        }
        if let Some(cost) = input.estimated_cost {
            request.estimated_cost = Some(cost);
        }
        if let Some(date) = input.required_date {
            request.required_date = date;
        }
        if let Some(urgency) = input.urgency {
            request.urgency = urgency;
        }
        if let Some(justification) = input.justification {
            request.justification = Some(justification);
        }
        let request = self.store.update_request(request, expected).await?;
        slog::info!(self.audit, "purchase request updated";
            "request_id" => %request.id, "actor_id" => %actor.id, "version" => request.version);
        Ok(request)
    }

    /// Moves a request into `pending_approval` and opens its approval
    /// workflow. A pending request whose previous workflow was cancelled may
    /// be submitted again.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, request_id = %id))]
    pub async fn submit_request(
        &self,
        actor: &Principal,
        id: Uuid,
        input: SubmitForApproval,
    ) -> Result<RequestSubmission, ServiceError> {
        input.validate()?;
        let request = self.load_request(id).await?;
        self.authorize(actor, request.project_id, Capability::Edit)
            .await?;
        check_requester(&request, actor)?;
        let request = self.settle_request(request).await?;

        let was_draft = match request.status {
            RequestStatus::Draft => true,
            RequestStatus::PendingApproval => false,
            other => {
                return Err(ServiceError::invalid_transition(
                    other,
                    RequestStatus::PendingApproval,
                ))
            }
        };

        let request = if was_draft {
            let moved = with_retry(&self.retry, ConflictRetryPolicy, || async move {
                let current = self.load_request(id).await?;
                self.state_machine
                    .transition_request(current, RequestStatus::PendingApproval)
                    .await
            })
            .await?;
            self.emit_request_status(moved.id, RequestStatus::Draft, moved.status)
                .await;
            moved
        } else {
            request
        };

        let start = StartWorkflow {
            subject_type: SubjectType::PurchaseRequest,
            subject_id: request.id,
            subject_owner_id: request.requester_id,
            project_id: request.project_id,
            workflow_type: input.workflow_type.unwrap_or(WorkflowType::Sequential),
            approvers: input.approvers,
            approval_sequence: input.approval_sequence,
            priority_level: input
                .priority_level
                .unwrap_or_else(|| request.urgency.priority_level()),
            estimated_completion_date: input.estimated_completion_date,
            conditions: serde_json::json!({}),
            revision_cycle: false,
            initial_comment: input.comments,
        };

        let workflow = match self.approvals.start(start, actor).await {
            Ok(workflow) => workflow,
            Err(err) => {
                if was_draft {
                    self.restore_draft(request.id).await;
                }
                return Err(err);
            }
        };

        self.emit_workflow_started(&workflow).await;
        slog::info!(self.audit, "purchase request submitted";
            "request_id" => %request.id, "workflow_id" => %workflow.id, "actor_id" => %actor.id);
        Ok(RequestSubmission { request, workflow })
    }

    /// Puts a request back to `draft` after its workflow could not be opened.
    async fn restore_draft(&self, id: Uuid) {
        let restored = async {
            let mut request = self.load_request(id).await?;
            if request.status != RequestStatus::PendingApproval {
                return Ok(());
            }
            let expected = request.version;
            request.status = RequestStatus::Draft;
            self.store.update_request(request, expected).await.map(|_| ())
        }
        .await;
        match restored {
            Ok(()) => {
                self.emit_request_status(id, RequestStatus::PendingApproval, RequestStatus::Draft)
                    .await
            }
            Err(err) => {
                warn!(request_id = %id, error = %err, "failed to restore request to draft")
            }
        }
    }

    /// Cancels a request that is still in flight and closes its workflow.
    #[instrument(skip(self, actor, reason), fields(actor_id = %actor.id, request_id = %id))]
    pub async fn cancel_request(
        &self,
        actor: &Principal,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<PurchaseRequest, ServiceError> {
        let (request, previous) = with_retry(&self.retry, ConflictRetryPolicy, || async move {
            let request = self.load_request(id).await?;
            self.authorize(actor, request.project_id, Capability::Edit)
                .await?;
            check_requester(&request, actor)?;
            let previous = request.status;
            let request = self
                .state_machine
                .transition_request(request, RequestStatus::Cancelled)
                .await?;
            Ok::<_, ServiceError>((request, previous))
        })
        .await?;

        if let Some(workflow) = self
            .store
            .find_active_workflow(SubjectType::PurchaseRequest, request.id)
            .await?
        {
            let withdrawn = with_retry(&self.retry, ConflictRetryPolicy, || {
                self.approvals.withdraw(workflow.id, actor, reason.clone())
            })
            .await?;
            if let Some(workflow) = withdrawn {
                self.emit_workflow_completed(&workflow).await;
            }
        }

        self.emit_request_status(request.id, previous, request.status)
            .await;
        slog::info!(self.audit, "purchase request cancelled";
            "request_id" => %request.id, "actor_id" => %actor.id);
        Ok(request)
    }

    /// Applies the decision of a closed workflow that never reached `request`.
    /// A pending request with no open workflow is only resubmittable when its
    /// latest workflow was cancelled.
    pub(super) async fn settle_request(
        &self,
        request: PurchaseRequest,
    ) -> Result<PurchaseRequest, ServiceError> {
        let id = request.id;
        if request.status != RequestStatus::PendingApproval
            || self
                .store
                .find_active_workflow(SubjectType::PurchaseRequest, id)
                .await?
                .is_some()
        {
            return Ok(request);
        }

        let latest = self
            .store
            .list_workflows_for_subject(SubjectType::PurchaseRequest, id)
            .await?
            .into_iter()
            .next();
        match latest {
            Some(workflow)
                if matches!(workflow.status, WorkflowStatus::Approved | WorkflowStatus::Rejected) =>
            {
                self.sync_request_with_workflow(&workflow).await?;
                self.load_request(id).await
            }
            _ => Ok(request),
        }
    }

    /// Mirrors a finished request workflow onto the request itself.
    pub(super) async fn sync_request_with_workflow(
        &self,
        workflow: &ApprovalWorkflow,
    ) -> Result<(), ServiceError> {
        let target = match workflow.status {
            WorkflowStatus::Approved => RequestStatus::Approved,
            WorkflowStatus::Rejected => RequestStatus::Rejected,
            WorkflowStatus::Pending | WorkflowStatus::Cancelled => return Ok(()),
        };
        let request_id = workflow.subject_id;
        let moved = with_retry(&self.retry, ConflictRetryPolicy, || async move {
            let request = self.load_request(request_id).await?;
            if request.status != RequestStatus::PendingApproval {
                return Ok(None);
            }
            self.state_machine
                .transition_request(request, target)
                .await
                .map(Some)
        })
        .await?;

        if let Some(request) = moved {
            info!(request_id = %request.id, status = %request.status, "purchase request decided by workflow");
            self.emit_request_status(request.id, RequestStatus::PendingApproval, request.status)
                .await;
        }
        Ok(())
    }

    pub(super) async fn emit_request_status(
        &self,
        request_id: Uuid,
        old: RequestStatus,
        new: RequestStatus,
    ) {
        self.events
            .send_or_log(Event::PurchaseRequestStatusChanged {
                request_id,
                old_status: old.to_string(),
                new_status: new.to_string(),
            })
            .await;
    }
}
