use super::{ProcurementService, SubmitForApproval, WorkflowView};
use crate::{
    auth::{Capability, Principal},
    errors::ServiceError,
    events::Event,
    middleware_helpers::{with_retry, ConflictRetryPolicy},
    models::{ApprovalWorkflow, SubjectType, WorkflowType},
    services::approval_workflow::{ActionRequest, StartWorkflow, WorkflowUpdate},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Opens a workflow on any subject.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct StartWorkflowRequest {
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    /// Required for documents; other subjects carry their own project.
    pub project_id: Option<Uuid>,
    /// Author of a document subject. Defaults to the caller.
    pub subject_owner_id: Option<Uuid>,
    pub workflow_type: Option<WorkflowType>,
    pub approvers: Vec<Uuid>,
    pub approval_sequence: Option<Vec<Uuid>>,
    #[validate(range(min = 1, max = 4))]
    pub priority_level: Option<i32>,
    pub estimated_completion_date: Option<NaiveDate>,
    #[schema(value_type = Option<Object>)]
    pub conditions: Option<serde_json::Value>,
    #[serde(default)]
    pub revision_cycle: bool,
    #[validate(length(max = 2000))]
    pub comments: Option<String>,
}

const DEFAULT_PRIORITY: i32 = 2;

impl ProcurementService {
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, subject_id = %input.subject_id))]
    pub async fn start_workflow(
        &self,
        actor: &Principal,
        input: StartWorkflowRequest,
    ) -> Result<WorkflowView, ServiceError> {
        input.validate()?;

        if input.subject_type == SubjectType::PurchaseRequest {
            let submission = self
                .submit_request(
                    actor,
                    input.subject_id,
                    SubmitForApproval {
                        approvers: input.approvers,
                        workflow_type: input.workflow_type,
                        approval_sequence: input.approval_sequence,
                        priority_level: input.priority_level,
                        estimated_completion_date: input.estimated_completion_date,
                        comments: input.comments,
                    },
                )
                .await?;
            return self.workflow_view(submission.workflow).await;
        }

        let (project_id, owner_id) = self.resolve_subject(actor, &input).await?;
        self.authorize(actor, project_id, Capability::Edit).await?;

        let start = StartWorkflow {
            subject_type: input.subject_type,
            subject_id: input.subject_id,
            subject_owner_id: owner_id,
            project_id,
            workflow_type: input.workflow_type.unwrap_or(WorkflowType::Sequential),
            approvers: input.approvers,
            approval_sequence: input.approval_sequence,
            priority_level: input.priority_level.unwrap_or(DEFAULT_PRIORITY),
            estimated_completion_date: input.estimated_completion_date,
            conditions: input.conditions.unwrap_or_else(|| serde_json::json!({})),
            revision_cycle: input.revision_cycle,
            initial_comment: input.comments,
        };
        let workflow = self.approvals.start(start, actor).await?;

        slog::info!(self.audit, "approval workflow started";
            "workflow_id" => %workflow.id, "subject" => workflow.subject_key(), "actor_id" => %actor.id);
        self.emit_workflow_started(&workflow).await;
        self.workflow_view(workflow).await
    }

    /// Project and owner of the subject a workflow is being opened on.
    async fn resolve_subject(
        &self,
        actor: &Principal,
        input: &StartWorkflowRequest,
    ) -> Result<(Uuid, Uuid), ServiceError> {
        match input.subject_type {
            SubjectType::PurchaseRequest => {
                let request = self.load_request(input.subject_id).await?;
                Ok((request.project_id, request.requester_id))
            }
            SubjectType::PurchaseOrder => {
                let order = self.load_order(input.subject_id).await?;
                Ok((order.project_id, order.created_by))
            }
            SubjectType::MaterialSubmittal => {
                let material = self.load_material(input.subject_id).await?;
                Ok((material.project_id, material.submitted_by))
            }
            SubjectType::Document => {
                let project_id = input.project_id.ok_or_else(|| {
                    ServiceError::validation("project_id", "required for document workflows")
                })?;
                Ok((project_id, input.subject_owner_id.unwrap_or(actor.id)))
            }
        }
    }

    pub async fn get_workflow(
        &self,
        actor: &Principal,
        id: Uuid,
    ) -> Result<WorkflowView, ServiceError> {
        let workflow = self.approvals.get(id).await?;
        self.authorize(actor, workflow.project_id, Capability::View)
            .await?;
        self.workflow_view(workflow).await
    }

    /// Every workflow ever opened on a subject, newest first.
    pub async fn list_subject_workflows(
        &self,
        actor: &Principal,
        subject_type: SubjectType,
        subject_id: Uuid,
    ) -> Result<Vec<ApprovalWorkflow>, ServiceError> {
        let workflows = self
            .store
            .list_workflows_for_subject(subject_type, subject_id)
            .await?;
        let scope = self.access.visible_projects(actor).await?;
        Ok(workflows
            .into_iter()
            .filter(|w| scope.contains(&w.project_id))
            .collect())
    }

    #[instrument(skip(self, actor, update), fields(actor_id = %actor.id, workflow_id = %id))]
    pub async fn update_workflow(
        &self,
        actor: &Principal,
        id: Uuid,
        update: WorkflowUpdate,
    ) -> Result<WorkflowView, ServiceError> {
        let workflow = with_retry(&self.retry, ConflictRetryPolicy, || {
            let update = update.clone();
            async move {
                let workflow = self.approvals.get(id).await?;
                self.authorize(actor, workflow.project_id, Capability::Edit)
                    .await?;
                self.approvals.update(id, actor, update).await
            }
        })
        .await?;
        slog::info!(self.audit, "approval workflow updated";
            "workflow_id" => %workflow.id, "priority" => workflow.priority_level, "actor_id" => %actor.id);
        self.workflow_view(workflow).await
    }

    /// Creator-only cancellation. A cancelled request workflow leaves the
    /// request pending so it can be resubmitted.
    #[instrument(skip(self, actor, comments), fields(actor_id = %actor.id, workflow_id = %id))]
    pub async fn cancel_workflow(
        &self,
        actor: &Principal,
        id: Uuid,
        comments: Option<String>,
    ) -> Result<WorkflowView, ServiceError> {
        let recorded = with_retry(&self.retry, ConflictRetryPolicy, || {
            let comments = comments.clone();
            async move {
                let workflow = self.approvals.get(id).await?;
                self.authorize(actor, workflow.project_id, Capability::View)
                    .await?;
                self.approvals.cancel(id, actor, comments).await
            }
        })
        .await?;
        slog::info!(self.audit, "approval workflow cancelled";
            "workflow_id" => %id, "actor_id" => %actor.id);
        self.emit_workflow_completed(&recorded.workflow).await;
        self.workflow_view(recorded.workflow).await
    }

    /// Records an approve, reject, comment, delegate or cancel action. When
    /// the action closes a purchase request's workflow the request follows.
    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id, workflow_id = %id, action = %request.action))]
    pub async fn record_workflow_action(
        &self,
        actor: &Principal,
        id: Uuid,
        request: ActionRequest,
    ) -> Result<WorkflowView, ServiceError> {
        request.validate()?;
        let recorded = with_retry(&self.retry, ConflictRetryPolicy, || {
            let request = request.clone();
            async move {
                let workflow = self.approvals.get(id).await?;
                self.authorize(actor, workflow.project_id, Capability::View)
                    .await?;
                self.approvals.record_action(id, actor, request).await
            }
        })
        .await?;

        slog::info!(self.audit, "approval action recorded";
            "workflow_id" => %id, "action" => %recorded.action.action_type,
            "status" => %recorded.workflow.status, "actor_id" => %actor.id);
        self.events
            .send_or_log(Event::WorkflowActionRecorded {
                workflow_id: id,
                actor_id: actor.id,
                action: recorded.action.action_type.to_string(),
            })
            .await;

        if recorded.completed {
            self.emit_workflow_completed(&recorded.workflow).await;
            // The decision is committed; a request left behind is settled on its next read.
            if recorded.workflow.subject_type == SubjectType::PurchaseRequest {
                if let Err(err) = self.sync_request_with_workflow(&recorded.workflow).await {
                    warn!(workflow_id = %id, request_id = %recorded.workflow.subject_id,
                        error = %err, "purchase request not yet mirrored from its workflow");
                }
            }
        }
        self.workflow_view(recorded.workflow).await
    }

    async fn workflow_view(
        &self,
        workflow: ApprovalWorkflow,
    ) -> Result<WorkflowView, ServiceError> {
        let actions = self.approvals.actions(workflow.id).await?;
        Ok(WorkflowView::new(workflow, actions))
    }

    pub(super) async fn emit_workflow_started(&self, workflow: &ApprovalWorkflow) {
        self.events
            .send_or_log(Event::WorkflowStarted {
                workflow_id: workflow.id,
                subject_type: workflow.subject_type.to_string(),
                subject_id: workflow.subject_id,
            })
            .await;
    }

    pub(super) async fn emit_workflow_completed(&self, workflow: &ApprovalWorkflow) {
        if let Some(completed_at) = workflow.completed_at {
            self.events
                .send_or_log(Event::WorkflowCompleted {
                    workflow_id: workflow.id,
                    status: workflow.status.to_string(),
                    completed_at,
                })
                .await;
        }
    }
}
