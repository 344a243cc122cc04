/*!
 * # Approval Workflow Engine
 *
 * Multi-approver sign-off attached to any subject (document, request, order
 * or material submittal). A workflow starts `pending` and ends in exactly one
 * of `approved`, `rejected` or `cancelled`; nothing is accepted afterwards.
 *
 * Every state change and its audit action are committed together through
 * [`ProcurementStore::commit_workflow`], conditional on the version that was
 * read, so two approvers racing on the last slot cannot both flip the
 * workflow to `approved`.
 */

use crate::{
    auth::{Principal, PrincipalDirectory},
    errors::ServiceError,
    metrics,
    models::{
        ActionType, ApprovalAction, ApprovalWorkflow, ApproverList, SubjectType, WorkflowStatus,
        WorkflowType,
    },
    notifications::{notify_best_effort, Notification, NotificationService, NotificationType},
    store::ProcurementStore,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Decides who may approve next in a conditional workflow.
pub trait ConditionalRoute: Send + Sync {
    /// Approvers eligible to act now, or `None` to let any outstanding
    /// approver act.
    fn eligible_approvers(&self, workflow: &ApprovalWorkflow) -> Option<Vec<Uuid>>;
}

/// Parameters for a new workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct StartWorkflow {
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    pub subject_owner_id: Uuid,
    pub project_id: Uuid,
    pub workflow_type: WorkflowType,
    pub approvers: Vec<Uuid>,
    /// Ordering for sequential mode; defaults to `approvers` order.
    pub approval_sequence: Option<Vec<Uuid>>,
    pub priority_level: i32,
    pub estimated_completion_date: Option<NaiveDate>,
    pub conditions: serde_json::Value,
    pub revision_cycle: bool,
    pub initial_comment: Option<String>,
}

/// One action against an open workflow.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate, ToSchema)]
pub struct ActionRequest {
    pub action: ActionType,
    #[validate(length(max = 2000))]
    pub comments: Option<String>,
    /// Required for `delegate`.
    pub delegate_to: Option<Uuid>,
}

/// Fields the creator may change while the workflow is pending.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Validate, ToSchema)]
pub struct WorkflowUpdate {
    #[validate(range(min = 1, max = 4))]
    pub priority_level: Option<i32>,
    pub estimated_completion_date: Option<NaiveDate>,
    #[schema(value_type = Object)]
    pub conditions: Option<serde_json::Value>,
}

/// A committed action and the workflow state after it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAction {
    pub workflow: ApprovalWorkflow,
    pub action: ApprovalAction,
    /// Set when this action moved the workflow into a terminal status.
    pub completed: bool,
}

#[derive(Clone)]
pub struct ApprovalWorkflowEngine {
    store: Arc<dyn ProcurementStore>,
    principals: Arc<dyn PrincipalDirectory>,
    notifier: Arc<dyn NotificationService>,
    route: Option<Arc<dyn ConditionalRoute>>,
}

impl ApprovalWorkflowEngine {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        principals: Arc<dyn PrincipalDirectory>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            store,
            principals,
            notifier,
            route: None,
        }
    }

    pub fn with_conditional_route(mut self, route: Arc<dyn ConditionalRoute>) -> Self {
        self.route = Some(route);
        self
    }

    pub async fn get(&self, workflow_id: Uuid) -> Result<ApprovalWorkflow, ServiceError> {
        self.store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Approval workflow {}", workflow_id)))
    }

    pub async fn actions(&self, workflow_id: Uuid) -> Result<Vec<ApprovalAction>, ServiceError> {
        self.store.list_actions(workflow_id).await
    }

    /// Creates a pending workflow and notifies every approver.
    #[instrument(skip(self, input, creator), fields(subject_id = %input.subject_id, creator_id = %creator.id))]
    pub async fn start(
        &self,
        input: StartWorkflow,
        creator: &Principal,
    ) -> Result<ApprovalWorkflow, ServiceError> {
        if input.approvers.is_empty() {
            return Err(ServiceError::validation(
                "approvers",
                "at least one approver is required",
            ));
        }
        let unique: HashSet<Uuid> = input.approvers.iter().copied().collect();
        if unique.len() != input.approvers.len() {
            return Err(ServiceError::validation(
                "approvers",
                "approvers must be distinct",
            ));
        }
        if !(1..=4).contains(&input.priority_level) {
            return Err(ServiceError::validation(
                "priority_level",
                "must be between 1 and 4",
            ));
        }
        let sequence = match input.approval_sequence {
            Some(sequence) => {
                let ordered: HashSet<Uuid> = sequence.iter().copied().collect();
                if ordered != unique || sequence.len() != unique.len() {
                    return Err(ServiceError::validation(
                        "approval_sequence",
                        "must list every approver exactly once",
                    ));
                }
                sequence
            }
            None => input.approvers.clone(),
        };
        for approver in &input.approvers {
            if !self.principals.exists(*approver).await? {
                return Err(ServiceError::UnknownApprover(*approver));
            }
        }

        let now = Utc::now();
        let workflow = ApprovalWorkflow {
            id: Uuid::new_v4(),
            subject_type: input.subject_type,
            subject_id: input.subject_id,
            subject_owner_id: input.subject_owner_id,
            project_id: input.project_id,
            workflow_type: input.workflow_type,
            required_approvers: ApproverList(input.approvers),
            completed_approvers: ApproverList::default(),
            approval_sequence: ApproverList(sequence),
            status: WorkflowStatus::Pending,
            priority_level: input.priority_level,
            estimated_completion_date: input.estimated_completion_date,
            conditions: input.conditions,
            revision_cycle: input.revision_cycle,
            created_by: creator.id,
            version: 1,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        let initial_actions = input
            .initial_comment
            .filter(|c| !c.trim().is_empty())
            .map(|comment| {
                vec![ApprovalAction::new(
                    workflow.id,
                    creator.id,
                    ActionType::Comment,
                    Some(comment),
                )]
            })
            .unwrap_or_default();

        let workflow = self.store.insert_workflow(workflow, initial_actions).await?;
        metrics::APPROVAL_ACTIONS
            .with_label_values(&["start", "recorded"])
            .inc();
        info!(workflow_id = %workflow.id, subject = %workflow.subject_key(), "approval workflow started");

        for approver in workflow.required_approvers.iter() {
            let notification = Notification::new(
                NotificationType::ApprovalRequested,
                workflow.id,
                format!("Your approval is requested for {}", workflow.subject_key()),
            );
            notify_best_effort(self.notifier.as_ref(), *approver, notification).await;
        }

        Ok(workflow)
    }

    /// Records an approve, reject, comment, delegate or cancel action.
    #[instrument(skip(self, actor, request), fields(%workflow_id, actor_id = %actor.id, action = %request.action))]
    pub async fn record_action(
        &self,
        workflow_id: Uuid,
        actor: &Principal,
        request: ActionRequest,
    ) -> Result<RecordedAction, ServiceError> {
        let action_label = request.action.to_string();
        let result = self.apply_action(workflow_id, actor, request).await;
        let outcome = match &result {
            Ok(_) => "recorded",
            Err(err) => err.kind(),
        };
        metrics::APPROVAL_ACTIONS
            .with_label_values(&[action_label.as_str(), outcome])
            .inc();
        result
    }

    async fn apply_action(
        &self,
        workflow_id: Uuid,
        actor: &Principal,
        request: ActionRequest,
    ) -> Result<RecordedAction, ServiceError> {
        let mut workflow = self.get(workflow_id).await?;
        ensure_open(&workflow)?;
        let expected_version = workflow.version;

        let mut action =
            ApprovalAction::new(workflow.id, actor.id, request.action, request.comments);
        let mut notify_delegate = None;

        match request.action {
            ActionType::Approve => {
                self.check_can_approve(&workflow, actor.id)?;
                workflow.completed_approvers.0.push(actor.id);
                if workflow.has_quorum() {
                    close(&mut workflow, WorkflowStatus::Approved);
                }
            }
            ActionType::Reject => {
                check_can_reject(&workflow, actor.id)?;
                close(&mut workflow, WorkflowStatus::Rejected);
            }
            ActionType::Comment => {}
            ActionType::Delegate => {
                let delegate_to = request.delegate_to.ok_or_else(|| {
                    ServiceError::validation("delegate_to", "required for delegate actions")
                })?;
                let original = self.delegate(&mut workflow, actor.id, delegate_to).await?;
                action.delegated_by = Some(actor.id);
                action.original_approver = Some(original);
                action.metadata = json!({ "delegate_to": delegate_to });
                notify_delegate = Some(delegate_to);
            }
            ActionType::Cancel => {
                if workflow.created_by != actor.id {
                    return Err(ServiceError::Forbidden(
                        "only the workflow creator may cancel it".to_string(),
                    ));
                }
                close(&mut workflow, WorkflowStatus::Cancelled);
            }
        }

        let completed = workflow.status.is_terminal();
        let workflow = self
            .store
            .commit_workflow(workflow, expected_version, vec![action.clone()])
            .await?;

        debug!(status = %workflow.status, completed = workflow.completed_approvers.len(), "workflow action committed");

        if let Some(delegate_to) = notify_delegate {
            let notification = Notification::new(
                NotificationType::ApprovalDelegated,
                workflow.id,
                format!("An approval for {} was delegated to you", workflow.subject_key()),
            );
            notify_best_effort(self.notifier.as_ref(), delegate_to, notification).await;
        }
        if completed {
            self.notify_completion(&workflow).await;
        }

        Ok(RecordedAction {
            workflow,
            action,
            completed,
        })
    }

    fn check_can_approve(
        &self,
        workflow: &ApprovalWorkflow,
        actor_id: Uuid,
    ) -> Result<(), ServiceError> {
        if actor_id == workflow.subject_owner_id {
            return Err(ServiceError::SelfApprovalForbidden(actor_id));
        }
        if !workflow.required_approvers.contains(&actor_id) {
            return Err(ServiceError::Forbidden(format!(
                "principal {} is not a required approver",
                actor_id
            )));
        }
        if workflow.completed_approvers.contains(&actor_id) {
            return Err(ServiceError::AlreadyActed(actor_id));
        }

        match workflow.workflow_type {
            WorkflowType::Sequential => {
                let expected = workflow.next_in_sequence();
                if expected != Some(actor_id) {
                    return Err(ServiceError::OutOfSequence { actor_id, expected });
                }
            }
            WorkflowType::Parallel => {}
            WorkflowType::Conditional => {
                let eligible = self
                    .route
                    .as_ref()
                    .and_then(|route| route.eligible_approvers(workflow));
                if let Some(eligible) = eligible {
                    if !eligible.contains(&actor_id) {
                        return Err(ServiceError::OutOfSequence {
                            actor_id,
                            expected: eligible.first().copied(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Swaps `actor_id` for `delegate_to` and returns the approver who held
    /// the slot before any delegation.
    async fn delegate(
        &self,
        workflow: &mut ApprovalWorkflow,
        actor_id: Uuid,
        delegate_to: Uuid,
    ) -> Result<Uuid, ServiceError> {
        if !workflow.required_approvers.contains(&actor_id) {
            return Err(ServiceError::Forbidden(format!(
                "principal {} is not a required approver",
                actor_id
            )));
        }
        if workflow.completed_approvers.contains(&actor_id) {
            return Err(ServiceError::AlreadyActed(actor_id));
        }
        if delegate_to == actor_id || workflow.required_approvers.contains(&delegate_to) {
            return Err(ServiceError::validation(
                "delegate_to",
                "already an approver on this workflow",
            ));
        }
        if delegate_to == workflow.subject_owner_id {
            return Err(ServiceError::SelfApprovalForbidden(delegate_to));
        }
        if !self.principals.exists(delegate_to).await? {
            return Err(ServiceError::UnknownApprover(delegate_to));
        }

        let original = self
            .store
            .list_actions(workflow.id)
            .await?
            .into_iter()
            .rev()
            .find(|a| {
                a.action_type == ActionType::Delegate
                    && a.metadata
                        .get("delegate_to")
                        .and_then(|v| v.as_str())
                        .and_then(|v| Uuid::parse_str(v).ok())
                        == Some(actor_id)
            })
            .and_then(|a| a.original_approver)
            .unwrap_or(actor_id);

        workflow.required_approvers.replace(actor_id, delegate_to);
        workflow.approval_sequence.replace(actor_id, delegate_to);
        Ok(original)
    }

    /// Creator-only cancellation of a pending workflow.
    pub async fn cancel(
        &self,
        workflow_id: Uuid,
        actor: &Principal,
        comments: Option<String>,
    ) -> Result<RecordedAction, ServiceError> {
        let request = ActionRequest {
            action: ActionType::Cancel,
            comments,
            delegate_to: None,
        };
        self.record_action(workflow_id, actor, request).await
    }

    /// Cancels a pending workflow because its subject went away, regardless
    /// of who created the workflow. A closed workflow is left untouched.
    #[instrument(skip(self, actor, reason), fields(%workflow_id, actor_id = %actor.id))]
    pub async fn withdraw(
        &self,
        workflow_id: Uuid,
        actor: &Principal,
        reason: Option<String>,
    ) -> Result<Option<ApprovalWorkflow>, ServiceError> {
        let mut workflow = self.get(workflow_id).await?;
        if !workflow.is_open() {
            return Ok(None);
        }
        let expected_version = workflow.version;
        close(&mut workflow, WorkflowStatus::Cancelled);
        let action = ApprovalAction::new(workflow.id, actor.id, ActionType::Cancel, reason);
        let workflow = self
            .store
            .commit_workflow(workflow, expected_version, vec![action])
            .await?;
        metrics::APPROVAL_ACTIONS
            .with_label_values(&["withdraw", "recorded"])
            .inc();
        self.notify_completion(&workflow).await;
        Ok(Some(workflow))
    }

    /// Creator-only edit of priority, estimate and conditions.
    #[instrument(skip(self, actor, update), fields(%workflow_id, actor_id = %actor.id))]
    pub async fn update(
        &self,
        workflow_id: Uuid,
        actor: &Principal,
        update: WorkflowUpdate,
    ) -> Result<ApprovalWorkflow, ServiceError> {
        update.validate()?;
        let mut workflow = self.get(workflow_id).await?;
        ensure_open(&workflow)?;
        if workflow.created_by != actor.id {
            return Err(ServiceError::Forbidden(
                "only the workflow creator may update it".to_string(),
            ));
        }

        let expected_version = workflow.version;
        if let Some(priority) = update.priority_level {
            workflow.priority_level = priority;
        }
        if let Some(date) = update.estimated_completion_date {
            workflow.estimated_completion_date = Some(date);
        }
        if let Some(conditions) = update.conditions {
            workflow.conditions = conditions;
        }
        self.store
            .commit_workflow(workflow, expected_version, Vec::new())
            .await
    }

    async fn notify_completion(&self, workflow: &ApprovalWorkflow) {
        let notification = Notification::new(
            NotificationType::WorkflowCompleted,
            workflow.id,
            format!(
                "Approval workflow for {} is {}",
                workflow.subject_key(),
                workflow.status
            ),
        );
        notify_best_effort(self.notifier.as_ref(), workflow.created_by, notification).await;
    }
}

fn ensure_open(workflow: &ApprovalWorkflow) -> Result<(), ServiceError> {
    if workflow.is_open() {
        Ok(())
    } else {
        Err(ServiceError::WorkflowClosed {
            workflow_id: workflow.id,
            status: workflow.status.to_string(),
        })
    }
}

/// The subject owner may reject only inside a revision cycle; everyone else
/// must be a required approver.
fn check_can_reject(workflow: &ApprovalWorkflow, actor_id: Uuid) -> Result<(), ServiceError> {
    if actor_id == workflow.subject_owner_id {
        return if workflow.revision_cycle {
            Ok(())
        } else {
            Err(ServiceError::SelfApprovalForbidden(actor_id))
        };
    }
    if workflow.required_approvers.contains(&actor_id) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "principal {} is not a required approver",
            actor_id
        )))
    }
}

fn close(workflow: &mut ApprovalWorkflow, status: WorkflowStatus) {
    workflow.status = status;
    workflow.completed_at = Some(Utc::now());
}
