mod common;

use assert_matches::assert_matches;
use common::TestContext;
use rust_decimal_macros::dec;
use siteflow_api::{
    errors::ServiceError,
    models::{MaterialSubmittal, PurchaseOrderStatus, SubmittalStatus},
    services::{
        materials::{MaterialDecision, MaterialEdit},
        procurement::{
            BulkMaterialReview, BulkMaterialUpdate, MaterialReview, NewMaterialSubmittal,
            NewPurchaseOrder, NewVendor,
        },
    },
    store::{MaterialFilter, PageRequest},
};
use uuid::Uuid;

async fn submit(ctx: &TestContext, name: &str) -> MaterialSubmittal {
    ctx.service
        .submit_material(
            &ctx.requester,
            NewMaterialSubmittal {
                project_id: ctx.project_id,
                name: name.to_string(),
                specification: Some("ASTM A615 Grade 60".to_string()),
                quantity: dec!(12.5),
                unit_of_measure: "t".to_string(),
            },
        )
        .await
        .unwrap()
}

fn review(decision: MaterialDecision) -> MaterialReview {
    MaterialReview {
        decision,
        notes: None,
    }
}

#[tokio::test]
async fn revision_cycle_returns_the_submittal_to_review() {
    let ctx = TestContext::new();
    let material = submit(&ctx, "Rebar #5").await;

    let sent_back = ctx
        .service
        .review_material(
            &ctx.approver_a,
            material.id,
            MaterialReview {
                decision: MaterialDecision::RequestRevision,
                notes: Some("mill certs missing".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(sent_back.status, SubmittalStatus::RevisionRequested);
    assert_eq!(sent_back.reviewed_by, Some(ctx.approver_a.id));

    let err = ctx
        .service
        .resubmit_material(&ctx.approver_a, material.id, MaterialEdit::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let resubmitted = ctx
        .service
        .resubmit_material(
            &ctx.requester,
            material.id,
            MaterialEdit {
                specification: Some("ASTM A615 Grade 60, certs attached".into()),
                ..MaterialEdit::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(resubmitted.status, SubmittalStatus::Pending);

    let approved = ctx
        .service
        .review_material(&ctx.approver_b, material.id, review(MaterialDecision::Approve))
        .await
        .unwrap();
    assert_eq!(approved.status, SubmittalStatus::Approved);

    let notified: Vec<_> = ctx.notifier.sent().into_iter().map(|(to, _)| to).collect();
    assert!(notified.iter().all(|id| *id == ctx.requester.id));
    assert_eq!(notified.len(), 2);
}

#[tokio::test]
async fn reviewers_need_approve_capability() {
    let ctx = TestContext::new();
    let material = submit(&ctx, "Formwork ply").await;

    // Engineers can edit but not approve.
    let err = ctx
        .service
        .review_material(&ctx.requester, material.id, review(MaterialDecision::Approve))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn submitters_may_only_reject_their_own_item_during_revision() {
    let ctx = TestContext::new();
    let material = ctx
        .service
        .submit_material(
            &ctx.approver_a,
            NewMaterialSubmittal {
                project_id: ctx.project_id,
                name: "Waterproofing membrane".into(),
                specification: None,
                quantity: dec!(400),
                unit_of_measure: "m2".into(),
            },
        )
        .await
        .unwrap();

    let err = ctx
        .service
        .review_material(&ctx.approver_a, material.id, review(MaterialDecision::Reject))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::SelfApprovalForbidden(_));

    ctx.service
        .review_material(
            &ctx.approver_b,
            material.id,
            review(MaterialDecision::RequestRevision),
        )
        .await
        .unwrap();
    let withdrawn = ctx
        .service
        .review_material(&ctx.approver_a, material.id, review(MaterialDecision::Reject))
        .await
        .unwrap();
    assert_eq!(withdrawn.status, SubmittalStatus::Rejected);
}

#[tokio::test]
async fn bulk_approve_reports_each_item() {
    let ctx = TestContext::new();
    let first = submit(&ctx, "Anchor bolts").await;
    let second = submit(&ctx, "Grout").await;
    let already = submit(&ctx, "Shims").await;
    ctx.service
        .review_material(&ctx.approver_a, already.id, review(MaterialDecision::Reject))
        .await
        .unwrap();
    let missing = Uuid::new_v4();

    let outcome = ctx
        .service
        .bulk_approve_materials(
            &ctx.approver_a,
            BulkMaterialReview {
                ids: vec![first.id, second.id, already.id, missing, first.id],
                notes: Some("batch reviewed on site".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, vec![first.id, second.id]);
    let failed: Vec<_> = outcome
        .failed
        .iter()
        .map(|f| (f.id, f.kind.as_str()))
        .collect();
    assert_eq!(
        failed,
        vec![(already.id, "invalid_transition"), (missing, "not_found")]
    );

    let stored = ctx
        .service
        .get_material(&ctx.requester, second.id)
        .await
        .unwrap();
    assert_eq!(stored.status, SubmittalStatus::Approved);
    assert_eq!(stored.review_notes.as_deref(), Some("batch reviewed on site"));
}

#[tokio::test]
async fn bulk_reject_skips_items_outside_the_callers_projects() {
    let ctx = TestContext::new();
    let ours = submit(&ctx, "Sealant").await;

    let other_project = Uuid::new_v4();
    let foreign = ctx
        .service
        .submit_material(
            &ctx.purchaser,
            NewMaterialSubmittal {
                project_id: other_project,
                name: "Cladding panels".into(),
                specification: None,
                quantity: dec!(80),
                unit_of_measure: "ea".into(),
            },
        )
        .await
        .unwrap();

    let outcome = ctx
        .service
        .bulk_reject_materials(
            &ctx.approver_a,
            BulkMaterialReview {
                ids: vec![ours.id, foreign.id],
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, vec![ours.id]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].kind, "forbidden");
}

#[tokio::test]
async fn bulk_update_only_touches_open_items() {
    let ctx = TestContext::new();
    let open = submit(&ctx, "Conduit").await;
    let closed = submit(&ctx, "Cable tray").await;
    ctx.service
        .review_material(&ctx.approver_a, closed.id, review(MaterialDecision::Approve))
        .await
        .unwrap();

    let outcome = ctx
        .service
        .bulk_update_materials(
            &ctx.requester,
            BulkMaterialUpdate {
                ids: vec![open.id, closed.id],
                changes: MaterialEdit {
                    quantity: Some(dec!(15)),
                    ..MaterialEdit::default()
                },
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, vec![open.id]);
    assert_eq!(outcome.failed[0].id, closed.id);

    let err = ctx
        .service
        .bulk_update_materials(
            &ctx.requester,
            BulkMaterialUpdate {
                ids: vec![open.id],
                changes: MaterialEdit::default(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn listing_is_scoped_to_visible_projects() {
    let ctx = TestContext::new();
    submit(&ctx, "Rebar chairs").await;
    submit(&ctx, "Tie wire").await;

    let page = ctx
        .service
        .list_materials(&ctx.approver_a, MaterialFilter::default(), PageRequest::new(1, 20))
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let page = ctx
        .service
        .list_materials(&ctx.outsider, MaterialFilter::default(), PageRequest::new(1, 20))
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn vendors_without_contact_cannot_receive_orders() {
    let ctx = TestContext::new();
    let request = ctx.approved_request(dec!(5)).await;
    let vendor = ctx
        .service
        .create_vendor(
            &ctx.purchaser,
            NewVendor {
                company_name: "Walk-in Supply Co".into(),
                contact_name: None,
                contact_email: None,
                contact_phone: Some("+1 555 0100".into()),
                payment_terms: None,
            },
        )
        .await
        .unwrap();

    let err = ctx
        .service
        .create_vendor(
            &ctx.requester,
            NewVendor {
                company_name: "Unvetted Ltd".into(),
                contact_name: None,
                contact_email: None,
                contact_phone: None,
                payment_terms: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let order = ctx
        .service
        .create_order(
            &ctx.purchaser,
            NewPurchaseOrder {
                request_id: request.id,
                vendor_id: vendor.id,
                total_amount: Some(dec!(750)),
                po_date: None,
                expected_delivery_date: None,
                terms: None,
            },
        )
        .await
        .unwrap();
    let err = ctx
        .service
        .transition_order(&ctx.purchaser, order.order.id, PurchaseOrderStatus::Sent)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::MissingVendorContact(id) if id == vendor.id);

    ctx.service
        .set_vendor_active(&ctx.purchaser, vendor.id, false)
        .await
        .unwrap();
    let another = ctx.approved_request(dec!(5)).await;
    let err = ctx
        .service
        .create_order(
            &ctx.purchaser,
            NewPurchaseOrder {
                request_id: another.id,
                vendor_id: vendor.id,
                total_amount: None,
                po_date: None,
                expected_delivery_date: None,
                terms: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
