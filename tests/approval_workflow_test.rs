mod common;

use assert_matches::assert_matches;
use common::{approve, reject, TestContext};
use rust_decimal_macros::dec;
use siteflow_api::{
    auth::{Principal, Role},
    errors::ServiceError,
    events::Event,
    models::{ActionType, RequestStatus, SubjectType, WorkflowStatus, WorkflowType},
    services::{
        approval_workflow::{ActionRequest, WorkflowUpdate},
        procurement::{StartWorkflowRequest, SubmitForApproval},
    },
    store::ProcurementStore,
};
use uuid::Uuid;

#[tokio::test]
async fn sequential_approvals_follow_the_declared_order() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(100)).await;
    let submission = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap();
    assert_eq!(submission.request.status, RequestStatus::PendingApproval);
    let workflow_id = submission.workflow.id;

    let err = ctx
        .service
        .record_workflow_action(&ctx.approver_b, workflow_id, approve())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::OutOfSequence { actor_id, expected }
            if actor_id == ctx.approver_b.id && expected == Some(ctx.approver_a.id)
    );

    let after_a = ctx
        .service
        .record_workflow_action(&ctx.approver_a, workflow_id, approve())
        .await
        .unwrap();
    assert_eq!(after_a.workflow.status, WorkflowStatus::Pending);
    assert_eq!(after_a.next_approver, Some(ctx.approver_b.id));
    assert_eq!(after_a.outstanding_approvers, vec![ctx.approver_b.id]);

    let after_b = ctx
        .service
        .record_workflow_action(&ctx.approver_b, workflow_id, approve())
        .await
        .unwrap();
    assert_eq!(after_b.workflow.status, WorkflowStatus::Approved);
    assert!(after_b.workflow.completed_at.is_some());
    assert!(after_b.outstanding_approvers.is_empty());

    let request = ctx
        .service
        .get_request(&ctx.requester, draft.id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Approved);
}

#[tokio::test]
async fn parallel_approvals_need_every_approver() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(10)).await;
    let submission = ctx
        .service
        .submit_request(
            &ctx.requester,
            draft.id,
            SubmitForApproval {
                approvers: vec![ctx.approver_a.id, ctx.approver_b.id],
                workflow_type: Some(WorkflowType::Parallel),
                ..SubmitForApproval::default()
            },
        )
        .await
        .unwrap();
    let workflow_id = submission.workflow.id;

    let after_b = ctx
        .service
        .record_workflow_action(&ctx.approver_b, workflow_id, approve())
        .await
        .unwrap();
    assert_eq!(after_b.workflow.status, WorkflowStatus::Pending);

    let err = ctx
        .service
        .record_workflow_action(&ctx.approver_b, workflow_id, approve())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyActed(id) if id == ctx.approver_b.id);

    let after_a = ctx
        .service
        .record_workflow_action(&ctx.approver_a, workflow_id, approve())
        .await
        .unwrap();
    assert_eq!(after_a.workflow.status, WorkflowStatus::Approved);
    assert_eq!(
        after_a
            .actions
            .iter()
            .filter(|a| a.action_type == ActionType::Approve)
            .count(),
        2
    );
}

#[tokio::test]
async fn a_single_rejection_closes_the_workflow_and_the_request() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(10)).await;
    let submission = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap();

    let rejected = ctx
        .service
        .record_workflow_action(&ctx.approver_b, submission.workflow.id, reject("over budget"))
        .await
        .unwrap();
    assert_eq!(rejected.workflow.status, WorkflowStatus::Rejected);

    let request = ctx
        .service
        .get_request(&ctx.requester, draft.id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Rejected);

    let err = ctx
        .service
        .record_workflow_action(&ctx.approver_a, submission.workflow.id, approve())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::WorkflowClosed { ref status, .. } if status == "rejected");
}

#[tokio::test]
async fn requesters_cannot_approve_their_own_requests() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(10)).await;

    // Naming the requester as an approver is allowed, acting on it is not.
    let submission = ctx
        .service
        .submit_request(
            &ctx.requester,
            draft.id,
            SubmitForApproval {
                approvers: vec![ctx.requester.id, ctx.approver_a.id],
                workflow_type: Some(WorkflowType::Parallel),
                ..SubmitForApproval::default()
            },
        )
        .await
        .unwrap();

    let err = ctx
        .service
        .record_workflow_action(&ctx.requester, submission.workflow.id, approve())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::SelfApprovalForbidden(id) if id == ctx.requester.id);

    let err = ctx
        .service
        .record_workflow_action(&ctx.requester, submission.workflow.id, reject("changed my mind"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::SelfApprovalForbidden(_));
}

#[tokio::test]
async fn unknown_approvers_leave_the_request_in_draft() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(10)).await;
    let ghost = Uuid::new_v4();

    let err = ctx
        .service
        .submit_request(
            &ctx.requester,
            draft.id,
            SubmitForApproval {
                approvers: vec![ctx.approver_a.id, ghost],
                ..SubmitForApproval::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::UnknownApprover(id) if id == ghost);

    let request = ctx
        .service
        .get_request(&ctx.requester, draft.id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Draft);
}

#[tokio::test]
async fn only_one_open_workflow_per_subject() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(10)).await;
    ctx.service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap();

    let err = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DuplicateWorkflow(_));
}

#[tokio::test]
async fn cancelled_workflow_allows_resubmission() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(10)).await;
    let first = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap();

    let err = ctx
        .service
        .cancel_workflow(&ctx.approver_a, first.workflow.id, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let cancelled = ctx
        .service
        .cancel_workflow(&ctx.requester, first.workflow.id, Some("wrong approvers".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.workflow.status, WorkflowStatus::Cancelled);

    let request = ctx
        .service
        .get_request(&ctx.requester, draft.id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::PendingApproval);

    let second = ctx
        .service
        .submit_request(
            &ctx.requester,
            draft.id,
            SubmitForApproval {
                approvers: vec![ctx.approver_a.id],
                ..SubmitForApproval::default()
            },
        )
        .await
        .unwrap();
    assert_ne!(second.workflow.id, first.workflow.id);

    let history = ctx
        .service
        .list_subject_workflows(&ctx.requester, SubjectType::PurchaseRequest, draft.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn cancelling_a_request_withdraws_its_workflow() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(10)).await;
    let submission = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap();

    let cancelled = ctx
        .service
        .cancel_request(&ctx.requester, draft.id, Some("no longer needed".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);

    let workflow = ctx
        .service
        .get_workflow(&ctx.requester, submission.workflow.id)
        .await
        .unwrap();
    assert_eq!(workflow.workflow.status, WorkflowStatus::Cancelled);
}

#[tokio::test]
async fn delegation_hands_the_slot_to_another_principal() {
    let ctx = TestContext::new();
    let deputy = Principal::new(Uuid::new_v4(), Role::ProjectManager);
    ctx.principals.register(deputy.id, deputy.role);
    ctx.projects.assign(deputy.id, ctx.project_id);

    let draft = ctx.draft_request(dec!(10)).await;
    let submission = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap();

    let delegated = ctx
        .service
        .record_workflow_action(
            &ctx.approver_a,
            submission.workflow.id,
            ActionRequest {
                action: ActionType::Delegate,
                comments: Some("on leave".into()),
                delegate_to: Some(deputy.id),
            },
        )
        .await
        .unwrap();
    assert_eq!(delegated.next_approver, Some(deputy.id));
    assert!(!delegated.workflow.required_approvers.contains(&ctx.approver_a.id));

    let err = ctx
        .service
        .record_workflow_action(&ctx.approver_a, submission.workflow.id, approve())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    for approver in [&deputy, &ctx.approver_b] {
        ctx.service
            .record_workflow_action(approver, submission.workflow.id, approve())
            .await
            .unwrap();
    }
    let request = ctx
        .service
        .get_request(&ctx.requester, draft.id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Approved);

    let notified: Vec<_> = ctx.notifier.sent().into_iter().map(|(to, _)| to).collect();
    assert!(notified.contains(&deputy.id));
}

#[tokio::test]
async fn document_workflows_support_revision_cycles() {
    let ctx = TestContext::new();
    let document_id = Uuid::new_v4();

    let missing_project = ctx
        .service
        .start_workflow(
            &ctx.requester,
            StartWorkflowRequest {
                subject_type: SubjectType::Document,
                subject_id: document_id,
                project_id: None,
                subject_owner_id: None,
                workflow_type: None,
                approvers: vec![ctx.approver_a.id],
                approval_sequence: None,
                priority_level: None,
                estimated_completion_date: None,
                conditions: None,
                revision_cycle: true,
                comments: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(missing_project, ServiceError::ValidationError(_));

    let started = ctx
        .service
        .start_workflow(
            &ctx.requester,
            StartWorkflowRequest {
                subject_type: SubjectType::Document,
                subject_id: document_id,
                project_id: Some(ctx.project_id),
                subject_owner_id: None,
                workflow_type: Some(WorkflowType::Parallel),
                approvers: vec![ctx.approver_a.id],
                approval_sequence: None,
                priority_level: Some(3),
                estimated_completion_date: None,
                conditions: None,
                revision_cycle: true,
                comments: Some("Rev B drawings".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(started.workflow.priority_level, 3);

    // The author may withdraw their own revision by rejecting it.
    let withdrawn = ctx
        .service
        .record_workflow_action(&ctx.requester, started.workflow.id, reject("superseded"))
        .await
        .unwrap();
    assert_eq!(withdrawn.workflow.status, WorkflowStatus::Rejected);
}

#[tokio::test]
async fn open_workflows_can_be_reprioritised() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(10)).await;
    let submission = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap();

    let updated = ctx
        .service
        .update_workflow(
            &ctx.requester,
            submission.workflow.id,
            WorkflowUpdate {
                priority_level: Some(4),
                estimated_completion_date: None,
                conditions: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.workflow.priority_level, 4);

    let err = ctx
        .service
        .update_workflow(
            &ctx.requester,
            submission.workflow.id,
            WorkflowUpdate {
                priority_level: Some(7),
                estimated_completion_date: None,
                conditions: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_final_approvals_close_the_workflow_once() {
    let mut ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(40)).await;
    let submission = ctx
        .service
        .submit_request(
            &ctx.requester,
            draft.id,
            SubmitForApproval {
                approvers: vec![ctx.approver_a.id, ctx.approver_b.id],
                workflow_type: Some(WorkflowType::Parallel),
                ..SubmitForApproval::default()
            },
        )
        .await
        .unwrap();
    let workflow_id = submission.workflow.id;

    let handles: Vec<_> = [ctx.approver_a, ctx.approver_b]
        .into_iter()
        .map(|approver| {
            let service = ctx.service.clone();
            tokio::spawn(async move {
                service
                    .record_workflow_action(&approver, workflow_id, approve())
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let view = ctx
        .service
        .get_workflow(&ctx.requester, workflow_id)
        .await
        .unwrap();
    assert_eq!(view.workflow.status, WorkflowStatus::Approved);
    assert_eq!(view.workflow.completed_approvers.len(), 2);
    let approvals = view
        .actions
        .iter()
        .filter(|a| a.action_type == ActionType::Approve)
        .count();
    assert_eq!(approvals, 2);

    let completions = ctx
        .drain_events()
        .into_iter()
        .filter(|e| {
            matches!(e, Event::WorkflowCompleted { workflow_id: id, .. } if *id == workflow_id)
        })
        .count();
    assert_eq!(completions, 1);

    let request = ctx.service.get_request(&ctx.requester, draft.id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Approved);
}

#[tokio::test]
async fn committed_decision_survives_a_failed_request_update() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(25)).await;
    let submission = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap();
    let workflow_id = submission.workflow.id;
    ctx.service
        .record_workflow_action(&ctx.approver_a, workflow_id, approve())
        .await
        .unwrap();

    // Every retry of the request write fails; the workflow write does not.
    ctx.store.inject_request_conflicts(3);
    let view = ctx
        .service
        .record_workflow_action(&ctx.approver_b, workflow_id, approve())
        .await
        .unwrap();
    assert_eq!(view.workflow.status, WorkflowStatus::Approved);
    let stored = ctx.store.get_request(draft.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::PendingApproval);

    // Resubmitting settles the request from its approved workflow instead of
    // opening a second one.
    let err = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { ref from, .. } if from == "approved");

    let workflows = ctx
        .service
        .list_subject_workflows(&ctx.requester, SubjectType::PurchaseRequest, draft.id)
        .await
        .unwrap();
    assert_eq!(workflows.len(), 1);
    let request = ctx.service.get_request(&ctx.requester, draft.id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Approved);
}

#[tokio::test]
async fn unmirrored_request_reads_as_decided() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(25)).await;
    let submission = ctx
        .service
        .submit_request(&ctx.requester, draft.id, ctx.sequential_submission())
        .await
        .unwrap();

    ctx.store.inject_request_conflicts(3);
    ctx.service
        .record_workflow_action(
            &ctx.approver_a,
            submission.workflow.id,
            reject("wrong mix design"),
        )
        .await
        .unwrap();

    let request = ctx.service.get_request(&ctx.approver_a, draft.id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Rejected);
}
