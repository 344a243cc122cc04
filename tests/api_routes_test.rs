mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, send, today, TestContext};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn health_reports_store_backend() {
    let ctx = TestContext::new();
    let router = ctx.router();

    let response = send(&router, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["checks"]["database"], "not_configured");
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let ctx = TestContext::new();
    let router = ctx.router();

    let response = send(&router, Method::GET, "/api/v1/purchase-requests", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["kind"], "unauthorized");
}

#[tokio::test]
async fn request_lifecycle_over_http() {
    let ctx = TestContext::new();
    let router = ctx.router();

    let created = send(
        &router,
        Method::POST,
        "/api/v1/purchase-requests",
        Some(&ctx.requester),
        Some(json!({
            "project_id": ctx.project_id,
            "item_description": "Structural steel W12x26",
            "quantity": "18",
            "unit_of_measure": "ea",
            "estimated_cost": "9400.00",
            "required_date": today().to_string(),
            "urgency": "high"
        })),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = response_json(created).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "draft");
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let submitted = send(
        &router,
        Method::POST,
        &format!("/api/v1/purchase-requests/{request_id}/submit"),
        Some(&ctx.requester),
        Some(json!({ "approvers": [ctx.approver_a.id, ctx.approver_b.id] })),
    )
    .await;
    assert_eq!(submitted.status(), StatusCode::OK);
    let body = response_json(submitted).await;
    assert_eq!(body["data"]["request"]["status"], "pending_approval");
    assert_eq!(body["data"]["workflow"]["priority_level"], 3);
    let workflow_id = body["data"]["workflow"]["id"].as_str().unwrap().to_string();

    let out_of_turn = send(
        &router,
        Method::POST,
        &format!("/api/v1/approval-workflows/{workflow_id}/actions"),
        Some(&ctx.approver_b),
        Some(json!({ "action": "approve" })),
    )
    .await;
    assert_eq!(out_of_turn.status(), StatusCode::CONFLICT);
    let body = response_json(out_of_turn).await;
    assert_eq!(body["kind"], "out_of_sequence");
    assert_eq!(body["details"]["expected"], json!(ctx.approver_a.id));

    let listed = send(
        &router,
        Method::GET,
        "/api/v1/purchase-requests?status=pending_approval",
        Some(&ctx.approver_a),
        None,
    )
    .await;
    assert_eq!(listed.status(), StatusCode::OK);
    let body = response_json(listed).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["data"][0]["id"], request_id.as_str());
}

#[tokio::test]
async fn invalid_payloads_are_bad_requests() {
    let ctx = TestContext::new();
    let router = ctx.router();

    let response = send(
        &router,
        Method::POST,
        "/api/v1/purchase-requests",
        Some(&ctx.requester),
        Some(json!({
            "project_id": ctx.project_id,
            "item_description": "",
            "quantity": "-4",
            "unit_of_measure": "ea",
            "required_date": today().to_string()
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn over_delivery_maps_to_unprocessable_entity() {
    let ctx = TestContext::new();
    let router = ctx.router();
    let order = ctx.confirmed_order(dec!(100)).await;
    let uri = format!("/api/v1/purchase-orders/{}/deliveries", order.order.id);

    let first = send(
        &router,
        Method::POST,
        &uri,
        Some(&ctx.requester),
        Some(json!({ "delivery_date": today().to_string(), "quantity_received": "60" })),
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = send(
        &router,
        Method::POST,
        &uri,
        Some(&ctx.requester),
        Some(json!({ "delivery_date": today().to_string(), "quantity_received": "50" })),
    )
    .await;
    assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(second).await;
    assert_eq!(body["kind"], "over_delivery");
    assert_eq!(body["details"]["already_received"], "60");

    let listed = send(&router, Method::GET, &uri, Some(&ctx.requester), None).await;
    assert_eq!(listed.status(), StatusCode::OK);
    let body = response_json(listed).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn skipping_order_states_is_a_conflict() {
    let ctx = TestContext::new();
    let router = ctx.router();
    let order = ctx.draft_order(dec!(10)).await;

    let response = send(
        &router,
        Method::POST,
        &format!("/api/v1/purchase-orders/{}/status", order.order.id),
        Some(&ctx.purchaser),
        Some(json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["kind"], "invalid_transition");
    assert_eq!(body["details"]["from"], "draft");
}

#[tokio::test]
async fn non_members_are_forbidden() {
    let ctx = TestContext::new();
    let router = ctx.router();
    let draft = ctx.draft_request(dec!(3)).await;

    let response = send(
        &router,
        Method::GET,
        &format!("/api/v1/purchase-requests/{}", draft.id),
        Some(&ctx.outsider),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn bulk_material_review_over_http() {
    let ctx = TestContext::new();
    let router = ctx.router();

    let mut ids = Vec::new();
    for name in ["Rebar #4", "Rebar #6"] {
        let response = send(
            &router,
            Method::POST,
            "/api/v1/materials",
            Some(&ctx.requester),
            Some(json!({
                "project_id": ctx.project_id,
                "name": name,
                "quantity": "4",
                "unit_of_measure": "t"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        ids.push(body["data"]["id"].as_str().unwrap().to_string());
    }

    let response = send(
        &router,
        Method::POST,
        "/api/v1/materials/bulk-approve",
        Some(&ctx.approver_a),
        Some(json!({ "ids": ids })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["succeeded"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["data"]["failed"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let ctx = TestContext::new();
    let router = ctx.router();

    let response = send(&router, Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["info"]["title"], "SiteFlow API");
}
