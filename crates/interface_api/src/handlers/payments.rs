//! Payment handlers
//!
//! Every mutation is recorded against the employee in the caller's token and
//! answers with the invoice status before and after it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use core_kernel::{InvoiceId, PaymentId};

use crate::auth::{permissions, require_role, Claims};
use crate::dto::payments::*;
use crate::extract::ValidatedJson;
use crate::{error::ApiError, AppState};

/// Lists an invoice's payments
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<i64>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    require_role(&claims, permissions::PAYMENT_READ)?;

    let payments = state.payments.list_payments(InvoiceId::new(invoice_id)).await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

/// Gets one payment of an invoice
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((invoice_id, payment_id)): Path<(i64, i64)>,
) -> Result<Json<PaymentResponse>, ApiError> {
    require_role(&claims, permissions::PAYMENT_READ)?;

    let payment = state
        .payments
        .get_payment(InvoiceId::new(invoice_id), PaymentId::new(payment_id))
        .await?;
    Ok(Json(payment.into()))
}

/// Records a payment
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentMutationResponse>), ApiError> {
    require_role(&claims, permissions::PAYMENT_WRITE)?;

    let result = state
        .payments
        .create_payment(InvoiceId::new(invoice_id), request.into(), claims.employee_id())
        .await?;
    Ok((StatusCode::CREATED, Json(result.into())))
}

/// Changes a payment
pub async fn update_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((invoice_id, payment_id)): Path<(i64, i64)>,
    ValidatedJson(request): ValidatedJson<UpdatePaymentRequest>,
) -> Result<Json<PaymentMutationResponse>, ApiError> {
    require_role(&claims, permissions::PAYMENT_WRITE)?;

    let result = state
        .payments
        .update_payment(
            InvoiceId::new(invoice_id),
            PaymentId::new(payment_id),
            request.into(),
            claims.employee_id(),
        )
        .await?;
    Ok(Json(result.into()))
}

/// Removes a payment
pub async fn delete_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((invoice_id, payment_id)): Path<(i64, i64)>,
) -> Result<Json<PaymentDeletionResponse>, ApiError> {
    require_role(&claims, permissions::PAYMENT_WRITE)?;

    let result = state
        .payments
        .delete_payment(
            InvoiceId::new(invoice_id),
            PaymentId::new(payment_id),
            claims.employee_id(),
        )
        .await?;
    Ok(Json(result.into()))
}
