//! HTTP API Layer
//!
//! This crate provides the REST API for care billing using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for drafts, invoices and payments
//! - **Middleware**: Authentication, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let adapter = Arc::new(PostgresBillingAdapter::new(pool));
//! let app = create_router(AppState::new(adapter, config));
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware as axum_middleware,
};
use core_kernel::HealthCheckable;
use domain_billing::{
    AppointmentPort, BillingHistoryPort, ContractPort, InvoiceAssembler, InvoiceService,
    InvoiceStore, PaymentLedger, PaymentStore,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{billing, health, invoices, payments};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub invoices: InvoiceService,
    pub payments: PaymentLedger,
    /// Store probed by the readiness check
    pub readiness: Arc<dyn HealthCheckable>,
    pub config: ApiConfig,
}

impl AppState {
    /// Wires the billing services over a store that implements every port
    pub fn new<S>(store: Arc<S>, config: ApiConfig) -> Self
    where
        S: ContractPort + AppointmentPort + BillingHistoryPort + InvoiceStore + PaymentStore,
    {
        let assembler = InvoiceAssembler::new(store.clone(), store.clone(), store.clone())
            .with_timezone(config.billing_timezone);
        let invoices = InvoiceService::new(assembler, store.clone())
            .with_due_days(config.invoice_due_days);
        let payments = PaymentLedger::new(store.clone());

        Self {
            invoices,
            payments,
            readiness: store,
            config,
        }
    }
}

/// Creates the main API router
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let billing_routes = Router::new()
        .route("/drafts", post(billing::generate_draft))
        .route("/status-preview", post(billing::status_preview));

    let invoice_routes = Router::new()
        .route("/", post(invoices::issue_invoice))
        .route("/:invoice_id", get(invoices::get_invoice))
        .route("/:invoice_id/credit", post(invoices::credit_invoice))
        .route(
            "/:invoice_id/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route(
            "/:invoice_id/payments/:payment_id",
            get(payments::get_payment)
                .put(payments::update_payment)
                .delete(payments::delete_payment),
        );

    // Protected API routes; audit runs inside auth so it sees the claims
    let api_routes = Router::new()
        .nest("/billing", billing_routes)
        .nest("/invoices", invoice_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
