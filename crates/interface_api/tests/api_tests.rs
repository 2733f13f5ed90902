//! HTTP API tests
//!
//! The router runs against the in-memory billing store; requests carry real
//! JWTs signed with the default secret.

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use chrono::NaiveDate;
use axum_test::{TestRequest, TestServer};
use core_kernel::{ClientId, EmployeeId, Money};
use domain_billing::{InMemoryBillingStore, InvoiceStatus};
use interface_api::auth::{create_token, permissions};
use interface_api::config::ApiConfig;
use interface_api::{create_router, AppState};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use test_utils::{ContractBuilder, TemporalFixtures};

const EMPLOYEE: i64 = 7;

fn token(roles: &[&str]) -> String {
    let config = ApiConfig::default();
    create_token(
        "clerk@example.org",
        EmployeeId::new(EMPLOYEE),
        roles.iter().map(|r| r.to_string()).collect(),
        &config.jwt_secret,
        config.jwt_expiration_secs,
    )
    .unwrap()
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn admin(request: TestRequest) -> TestRequest {
    request.add_header(header::AUTHORIZATION, bearer(&token(&["admin"])))
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        Value::Number(n) => n.to_string().parse().unwrap(),
        other => panic!("not a decimal: {}", other),
    }
}

async fn server_with(store: InMemoryBillingStore) -> TestServer {
    let state = AppState::new(Arc::new(store), ApiConfig::default());
    TestServer::new(create_router(state)).unwrap()
}

async fn billing_server() -> TestServer {
    let store = InMemoryBillingStore::with_contracts(vec![ContractBuilder::accommodation().build()]).await;
    server_with(store).await
}

fn window() -> Value {
    json!({
        "client_id": 1,
        "start_date": TemporalFixtures::window_start(),
        "end_date": TemporalFixtures::window_end(),
    })
}

// ============================================================================
// Health and authentication
// ============================================================================

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_is_public() {
        let server = server_with(InMemoryBillingStore::new()).await;
        let response = server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_probes_store() {
        let server = server_with(InMemoryBillingStore::new()).await;
        let response = server.get("/health/ready").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "ready");
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let server = billing_server().await;
        let response = server.post("/api/v1/billing/drafts").json(&window()).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let server = billing_server().await;
        let response = server
            .post("/api/v1/billing/drafts")
            .add_header(header::AUTHORIZATION, bearer("not-a-jwt"))
            .json(&window())
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_permission_is_forbidden() {
        let server = billing_server().await;
        let response = server
            .post("/api/v1/invoices")
            .add_header(header::AUTHORIZATION, bearer(&token(&[permissions::INVOICE_READ])))
            .json(&window())
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }
}

// ============================================================================
// Drafts and status preview
// ============================================================================

mod billing_tests {
    use super::*;

    #[tokio::test]
    async fn test_draft_totals() {
        let server = billing_server().await;
        let response = admin(server.post("/api/v1/billing/drafts")).json(&window()).await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["line_items"].as_array().unwrap().len(), 1);
        assert_eq!(decimal(&body["pre_vat_total"]), dec!(2492.00));
        assert_eq!(decimal(&body["vat_amount"]), dec!(523.32));
        assert_eq!(decimal(&body["total_amount"]), dec!(3015.32));
        assert_eq!(body["warning_count"], 0);
    }

    #[tokio::test]
    async fn test_inverted_window_is_unprocessable() {
        let server = billing_server().await;
        let response = admin(server.post("/api/v1/billing/drafts"))
            .json(&json!({
                "client_id": 1,
                "start_date": "2024-03-28",
                "end_date": "2024-03-01",
            }))
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_window_ending_on_last_representable_day_is_unprocessable() {
        let server = billing_server().await;
        let response = admin(server.post("/api/v1/billing/drafts"))
            .json(&json!({
                "client_id": 1,
                "start_date": TemporalFixtures::window_start(),
                "end_date": NaiveDate::MAX,
            }))
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<Value>()["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let server = billing_server().await;
        let response = admin(server.post("/api/v1/billing/drafts"))
            .json(&json!({ "client_id": "one" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_client_without_contracts_is_not_found() {
        let server = billing_server().await;
        let response = admin(server.post("/api/v1/billing/drafts"))
            .json(&json!({
                "client_id": 99,
                "start_date": "2024-03-01",
                "end_date": "2024-03-28",
            }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_preview_uses_tolerance() {
        let server = billing_server().await;

        let within = admin(server.post("/api/v1/billing/status-preview"))
            .json(&json!({ "invoice_total": "1000.00", "total_paid": "960.00" }))
            .await;
        within.assert_status_ok();
        assert_eq!(within.json::<Value>()["status"], "paid");

        let short = admin(server.post("/api/v1/billing/status-preview"))
            .json(&json!({ "invoice_total": "1000.00", "total_paid": "900.00" }))
            .await;
        assert_eq!(short.json::<Value>()["status"], "partially_paid");
    }
}

// ============================================================================
// Invoices
// ============================================================================

mod invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_then_read_invoice() {
        let server = billing_server().await;

        let issued = admin(server.post("/api/v1/invoices")).json(&window()).await;
        issued.assert_status(StatusCode::CREATED);
        let invoice = issued.json::<Value>();
        let number = invoice["invoice_number"].as_str().unwrap();
        assert!(number.starts_with("INV-"));
        assert!(number.ends_with("-0001"));
        assert_eq!(invoice["status"], "outstanding");

        let id = invoice["id"].as_i64().unwrap();
        let fetched = admin(server.get(&format!("/api/v1/invoices/{}", id))).await;
        fetched.assert_status_ok();
        let body = fetched.json::<Value>();
        assert_eq!(body["invoice_number"], number);
        assert_eq!(decimal(&body["total_paid"]), Decimal::ZERO);
        assert_eq!(decimal(&body["completion_percentage"]), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_issuing_billed_window_again_is_unprocessable() {
        let server = billing_server().await;

        admin(server.post("/api/v1/invoices"))
            .json(&window())
            .await
            .assert_status(StatusCode::CREATED);

        let again = admin(server.post("/api/v1/invoices")).json(&window()).await;
        again.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(again.json::<Value>()["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_not_found() {
        let server = billing_server().await;
        admin(server.get("/api/v1/invoices/404"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_credit_note_cancels_invoice() {
        let server = billing_server().await;
        let issued = admin(server.post("/api/v1/invoices")).json(&window()).await;
        let invoice = issued.json::<Value>();
        let id = invoice["id"].as_i64().unwrap();

        let credited = admin(server.post(&format!("/api/v1/invoices/{}/credit", id))).await;
        credited.assert_status(StatusCode::CREATED);
        let note = credited.json::<Value>();
        assert_eq!(note["invoice_type"], "credit_note");
        assert_eq!(note["credited_invoice_id"], id);
        assert_eq!(decimal(&note["total_amount"]), -decimal(&invoice["total_amount"]));

        let original = admin(server.get(&format!("/api/v1/invoices/{}", id))).await.json::<Value>();
        assert_eq!(original["status"], "canceled");
        assert_eq!(original["invoice_type"], "standard");

        let again = admin(server.post(&format!("/api/v1/invoices/{}/credit", id))).await;
        again.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        admin(server.post("/api/v1/invoices"))
            .json(&window())
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_crediting_needs_issue_permission() {
        let server = billing_server().await;
        let issued = admin(server.post("/api/v1/invoices")).json(&window()).await;
        let id = issued.json::<Value>()["id"].as_i64().unwrap();

        server
            .post(&format!("/api/v1/invoices/{}/credit", id))
            .add_header(header::AUTHORIZATION, bearer(&token(&[permissions::INVOICE_READ])))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}

// ============================================================================
// Payments
// ============================================================================

mod payment_tests {
    use super::*;

    async fn seeded() -> (TestServer, i64, i64) {
        let store = InMemoryBillingStore::new();
        let invoice = store
            .seed_invoice(ClientId::new(1), Money::new(dec!(1000.00)), InvoiceStatus::Outstanding)
            .await;
        let other = store
            .seed_invoice(ClientId::new(2), Money::new(dec!(500.00)), InvoiceStatus::Outstanding)
            .await;
        (server_with(store).await, invoice.value(), other.value())
    }

    #[tokio::test]
    async fn test_payment_lifecycle() {
        let (server, invoice_id, _) = seeded().await;
        let base = format!("/api/v1/invoices/{}/payments", invoice_id);

        let created = admin(server.post(&base))
            .json(&json!({
                "amount": "1000.00",
                "payment_method": "bank_transfer",
                "payment_date": "2024-04-10",
            }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let body = created.json::<Value>();
        assert_eq!(body["invoice_status_changed"], true);
        assert_eq!(body["previous_invoice_status"], "outstanding");
        assert_eq!(body["current_invoice_status"], "paid");
        assert_eq!(body["payment"]["recorded_by"], EMPLOYEE);
        let payment_id = body["payment"]["id"].as_i64().unwrap();

        let listed = admin(server.get(&base)).await;
        listed.assert_status_ok();
        assert_eq!(listed.json::<Value>().as_array().unwrap().len(), 1);

        let updated = admin(server.put(&format!("{}/{}", base, payment_id)))
            .json(&json!({ "amount": "400.00" }))
            .await;
        updated.assert_status_ok();
        assert_eq!(updated.json::<Value>()["current_invoice_status"], "partially_paid");

        let deleted = admin(server.delete(&format!("{}/{}", base, payment_id))).await;
        deleted.assert_status_ok();
        let body = deleted.json::<Value>();
        assert_eq!(body["deleted_payment_id"], payment_id);
        assert_eq!(body["current_invoice_status"], "outstanding");

        admin(server.get(&format!("{}/{}", base, payment_id)))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pending_payment_leaves_status() {
        let (server, invoice_id, _) = seeded().await;
        let created = admin(server.post(&format!("/api/v1/invoices/{}/payments", invoice_id)))
            .json(&json!({
                "amount": "1000.00",
                "payment_status": "pending",
                "payment_date": "2024-04-10",
            }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let body = created.json::<Value>();
        assert_eq!(body["invoice_status_changed"], false);
        assert_eq!(body["current_invoice_status"], "outstanding");
    }

    #[tokio::test]
    async fn test_negative_amount_is_unprocessable() {
        let (server, invoice_id, _) = seeded().await;
        admin(server.post(&format!("/api/v1/invoices/{}/payments", invoice_id)))
            .json(&json!({ "amount": "-1.00", "payment_date": "2024-04-10" }))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_payment_of_other_invoice_is_rejected() {
        let (server, invoice_id, other_id) = seeded().await;
        let created = admin(server.post(&format!("/api/v1/invoices/{}/payments", invoice_id)))
            .json(&json!({ "amount": "10.00", "payment_date": "2024-04-10" }))
            .await;
        let payment_id = created.json::<Value>()["payment"]["id"].as_i64().unwrap();

        admin(server.get(&format!("/api/v1/invoices/{}/payments/{}", other_id, payment_id)))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        admin(server.delete(&format!("/api/v1/invoices/{}/payments/{}", other_id, payment_id)))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_payment_on_unknown_invoice_is_not_found() {
        let (server, _, _) = seeded().await;
        admin(server.post("/api/v1/invoices/999/payments"))
            .json(&json!({ "amount": "10.00", "payment_date": "2024-04-10" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_read_only_role_cannot_record_payments() {
        let (server, invoice_id, _) = seeded().await;
        server
            .post(&format!("/api/v1/invoices/{}/payments", invoice_id))
            .add_header(header::AUTHORIZATION, bearer(&token(&[permissions::PAYMENT_READ])))
            .json(&json!({ "amount": "10.00", "payment_date": "2024-04-10" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
