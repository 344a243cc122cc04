mod common;

use assert_matches::assert_matches;
use common::{delivery, TestContext};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use siteflow_api::{
    errors::ServiceError,
    events::Event,
    models::{PurchaseOrderStatus, RequestStatus},
    services::procurement::{PendingDeliveryQuery, UpdateDeliveryRequest},
    store::{PageRequest, ProcurementStore},
};

#[tokio::test]
async fn partial_deliveries_reconcile_to_delivered_then_completed() {
    let ctx = TestContext::new();
    let order = ctx.confirmed_order(dec!(100)).await;
    let order_id = order.order.id;

    let first = ctx
        .service
        .confirm_delivery(&ctx.requester, order_id, delivery(dec!(60)))
        .await
        .unwrap();
    assert_eq!(first.order.order.status, PurchaseOrderStatus::Confirmed);
    assert_eq!(first.order.delivery.received_quantity, dec!(60));
    assert_eq!(first.order.delivery.remaining_quantity, dec!(40));
    assert_eq!(first.order.delivery.completion_percentage, dec!(60));

    let second = ctx
        .service
        .confirm_delivery(&ctx.requester, order_id, delivery(dec!(40)))
        .await
        .unwrap();
    assert_eq!(second.order.order.status, PurchaseOrderStatus::Delivered);
    assert_eq!(second.order.delivery.received_quantity, dec!(100));
    assert_eq!(second.order.delivery.confirmation_count, 2);

    let completed = ctx
        .service
        .transition_order(&ctx.purchaser, order_id, PurchaseOrderStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.order.status, PurchaseOrderStatus::Completed);
}

#[tokio::test]
async fn over_delivery_is_rejected_and_leaves_totals_untouched() {
    let ctx = TestContext::new();
    let order = ctx.confirmed_order(dec!(100)).await;
    let order_id = order.order.id;

    ctx.service
        .confirm_delivery(&ctx.requester, order_id, delivery(dec!(60)))
        .await
        .unwrap();
    let err = ctx
        .service
        .confirm_delivery(&ctx.requester, order_id, delivery(dec!(50)))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::OverDelivery { ordered, already_received, attempted }
            if ordered == dec!(100) && already_received == dec!(60) && attempted == dec!(50)
    );

    let view = ctx.service.get_order(&ctx.requester, order_id).await.unwrap();
    assert_eq!(view.delivery.received_quantity, dec!(60));
    assert_eq!(view.delivery.confirmation_count, 1);
    assert_eq!(view.order.status, PurchaseOrderStatus::Confirmed);
}

#[tokio::test]
async fn draft_order_cannot_skip_sent() {
    let ctx = TestContext::new();
    let order = ctx.draft_order(dec!(10)).await;

    let err = ctx
        .service
        .transition_order(&ctx.purchaser, order.order.id, PurchaseOrderStatus::Confirmed)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { ref from, ref to }
        if from == "draft" && to == "confirmed");

    let view = ctx
        .service
        .get_order(&ctx.purchaser, order.order.id)
        .await
        .unwrap();
    assert_eq!(view.order.status, PurchaseOrderStatus::Draft);
}

#[tokio::test]
async fn completion_requires_full_delivery() {
    let ctx = TestContext::new();
    let order = ctx.confirmed_order(dec!(100)).await;
    let order_id = order.order.id;

    let err = ctx
        .service
        .transition_order(&ctx.purchaser, order_id, PurchaseOrderStatus::Delivered)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DeliveryConfirmationRequired(id) if id == order_id);

    ctx.service
        .confirm_delivery(&ctx.requester, order_id, delivery(dec!(30)))
        .await
        .unwrap();
    ctx.service
        .transition_order(&ctx.purchaser, order_id, PurchaseOrderStatus::Delivered)
        .await
        .unwrap();
    let err = ctx
        .service
        .transition_order(&ctx.purchaser, order_id, PurchaseOrderStatus::Completed)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::IncompleteDelivery { received, .. } if received == dec!(30));
}

#[tokio::test]
async fn manually_delivered_order_stays_delivered_as_more_arrives() {
    let ctx = TestContext::new();
    let order = ctx.confirmed_order(dec!(100)).await;
    let order_id = order.order.id;

    ctx.service
        .confirm_delivery(&ctx.requester, order_id, delivery(dec!(10)))
        .await
        .unwrap();
    ctx.service
        .transition_order(&ctx.purchaser, order_id, PurchaseOrderStatus::Delivered)
        .await
        .unwrap();

    let more = ctx
        .service
        .confirm_delivery(&ctx.requester, order_id, delivery(dec!(10)))
        .await
        .unwrap();
    assert_eq!(more.order.order.status, PurchaseOrderStatus::Delivered);
    assert_eq!(more.order.delivery.received_quantity, dec!(20));

    // Taking quantity away still reverts a short order.
    let removed = ctx
        .service
        .delete_delivery(&ctx.manager, order_id, more.confirmation.unwrap().confirmation.id)
        .await
        .unwrap();
    assert_eq!(removed.order.order.status, PurchaseOrderStatus::Confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirmations_never_over_deliver() {
    let ctx = TestContext::new();
    let order_id = ctx.confirmed_order(dec!(100)).await.order.id;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let service = ctx.service.clone();
            let actor = ctx.requester;
            tokio::spawn(async move {
                service
                    .confirm_delivery(&actor, order_id, delivery(dec!(30)))
                    .await
            })
        })
        .collect();

    let mut accepted = 0u32;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(ServiceError::OverDelivery { .. }) | Err(ServiceError::StoreConflict(_)) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert!((1..=3).contains(&accepted), "accepted {accepted}");

    let stored = ctx.store.list_deliveries(order_id).await.unwrap();
    let total: Decimal = stored.iter().map(|d| d.quantity_received).sum();
    assert!(total <= dec!(100));
    assert_eq!(total, dec!(30) * Decimal::from(accepted));
    assert_eq!(stored.len() as u32, accepted);

    let view = ctx.service.get_order(&ctx.requester, order_id).await.unwrap();
    assert_eq!(view.delivery.received_quantity, total);
    assert_eq!(view.order.status, PurchaseOrderStatus::Confirmed);
}

#[tokio::test]
async fn removing_a_delivery_reopens_the_order() {
    let ctx = TestContext::new();
    let order = ctx.confirmed_order(dec!(50)).await;
    let order_id = order.order.id;

    let full = ctx
        .service
        .confirm_delivery(&ctx.requester, order_id, delivery(dec!(50)))
        .await
        .unwrap();
    assert_eq!(full.order.order.status, PurchaseOrderStatus::Delivered);
    let delivery_id = full.confirmation.unwrap().confirmation.id;

    // Engineers can record deliveries but not delete them.
    let err = ctx
        .service
        .delete_delivery(&ctx.requester, order_id, delivery_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let removed = ctx
        .service
        .delete_delivery(&ctx.manager, order_id, delivery_id)
        .await
        .unwrap();
    assert_eq!(removed.order.order.status, PurchaseOrderStatus::Confirmed);
    assert_eq!(removed.order.delivery.received_quantity, dec!(0));
}

#[tokio::test]
async fn editing_a_delivery_checks_the_ceiling_without_counting_itself() {
    let ctx = TestContext::new();
    let order = ctx.confirmed_order(dec!(100)).await;
    let order_id = order.order.id;

    let recorded = ctx
        .service
        .confirm_delivery(&ctx.requester, order_id, delivery(dec!(60)))
        .await
        .unwrap();
    let delivery_id = recorded.confirmation.unwrap().confirmation.id;

    let raised = ctx
        .service
        .update_delivery(
            &ctx.requester,
            order_id,
            delivery_id,
            UpdateDeliveryRequest {
                quantity_received: Some(dec!(100)),
                ..UpdateDeliveryRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(raised.order.order.status, PurchaseOrderStatus::Delivered);

    let err = ctx
        .service
        .update_delivery(
            &ctx.requester,
            order_id,
            delivery_id,
            UpdateDeliveryRequest {
                quantity_received: Some(dec!(101)),
                ..UpdateDeliveryRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OverDelivery { .. });
}

#[tokio::test]
async fn request_becomes_order_exactly_once() {
    let ctx = TestContext::new();
    let order = ctx.draft_order(dec!(20)).await;

    let request = ctx
        .service
        .get_request(&ctx.requester, order.order.request_id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Approved);
    assert!(order.order.po_number.starts_with("PO-"));
    assert_eq!(order.order.total_amount, dec!(2400));

    let vendor = ctx.vendor().await;
    let err = ctx
        .service
        .create_order(
            &ctx.purchaser,
            siteflow_api::services::procurement::NewPurchaseOrder {
                request_id: request.id,
                vendor_id: vendor.id,
                total_amount: None,
                po_date: None,
                expected_delivery_date: None,
                terms: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
}

#[tokio::test]
async fn unapproved_request_cannot_be_ordered() {
    let ctx = TestContext::new();
    let draft = ctx.draft_request(dec!(5)).await;
    let vendor = ctx.vendor().await;

    let err = ctx
        .service
        .create_order(
            &ctx.purchaser,
            siteflow_api::services::procurement::NewPurchaseOrder {
                request_id: draft.id,
                vendor_id: vendor.id,
                total_amount: None,
                po_date: None,
                expected_delivery_date: None,
                terms: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { ref from, .. } if from == "draft");
}

#[tokio::test]
async fn non_members_cannot_see_or_touch_project_orders() {
    let ctx = TestContext::new();
    let order = ctx.confirmed_order(dec!(10)).await;

    let err = ctx
        .service
        .get_order(&ctx.outsider, order.order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let err = ctx
        .service
        .confirm_delivery(&ctx.outsider, order.order.id, delivery(dec!(1)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn concurrent_writers_are_retried_transparently() {
    let ctx = TestContext::new();
    let order = ctx.confirmed_order(dec!(100)).await;

    ctx.store.inject_conflicts(2);
    let result = ctx
        .service
        .confirm_delivery(&ctx.requester, order.order.id, delivery(dec!(25)))
        .await
        .unwrap();
    assert_eq!(result.order.delivery.received_quantity, dec!(25));
    assert_eq!(
        ctx.store.list_deliveries(order.order.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn exhausted_retries_surface_the_conflict() {
    let ctx = TestContext::new();
    let order = ctx.draft_order(dec!(10)).await;

    ctx.store.inject_conflicts(10);
    let err = ctx
        .service
        .transition_order(&ctx.purchaser, order.order.id, PurchaseOrderStatus::Sent)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::StoreConflict(_));
}

#[tokio::test]
async fn failing_notifications_do_not_block_sending() {
    let ctx = TestContext::new();
    let order = ctx.draft_order(dec!(10)).await;

    ctx.notifier.fail_from_now_on();
    let sent = ctx
        .service
        .transition_order(&ctx.purchaser, order.order.id, PurchaseOrderStatus::Sent)
        .await
        .unwrap();
    assert_eq!(sent.order.status, PurchaseOrderStatus::Sent);
}

#[tokio::test]
async fn pending_deliveries_list_only_outstanding_orders() {
    let ctx = TestContext::new();
    let open = ctx.confirmed_order(dec!(10)).await;
    let done = ctx.confirmed_order(dec!(10)).await;
    ctx.service
        .confirm_delivery(&ctx.requester, done.order.id, delivery(dec!(10)))
        .await
        .unwrap();

    let page = ctx
        .service
        .list_pending_deliveries(
            &ctx.purchaser,
            PendingDeliveryQuery::default(),
            PageRequest::new(1, 20),
        )
        .await
        .unwrap();
    let ids: Vec<_> = page.items.iter().map(|v| v.order.id).collect();
    assert_eq!(ids, vec![open.order.id]);
}

#[tokio::test]
async fn lifecycle_emits_domain_events() {
    let mut ctx = TestContext::new();
    let order = ctx.confirmed_order(dec!(10)).await;
    ctx.service
        .confirm_delivery(&ctx.requester, order.order.id, delivery(dec!(10)))
        .await
        .unwrap();

    let names: Vec<_> = ctx.drain_events().iter().map(Event::name).collect();
    for expected in [
        "purchase_request_created",
        "workflow_started",
        "workflow_completed",
        "purchase_order_created",
        "purchase_order_status_changed",
        "delivery_recorded",
    ] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
}
