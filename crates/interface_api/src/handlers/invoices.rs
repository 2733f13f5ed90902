//! Invoice handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use core_kernel::{ClientId, InvoiceId};

use crate::auth::{permissions, require_role, Claims};
use crate::dto::invoices::*;
use crate::extract::ValidatedJson;
use crate::{error::ApiError, AppState};

/// Generates and issues an invoice dated today
pub async fn issue_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(request): ValidatedJson<GenerateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), ApiError> {
    require_role(&claims, permissions::INVOICE_ISSUE)?;

    let invoice = state
        .invoices
        .issue_invoice(
            ClientId::new(request.client_id),
            request.start_date,
            request.end_date,
            claims.employee_id(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(invoice.into())))
}

/// Issues a credit note for an invoice and cancels the invoice
pub async fn credit_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<i64>,
) -> Result<(StatusCode, Json<InvoiceResponse>), ApiError> {
    require_role(&claims, permissions::INVOICE_ISSUE)?;

    let credit_note = state
        .invoices
        .credit_invoice(InvoiceId::new(invoice_id), claims.employee_id())
        .await?;

    Ok((StatusCode::CREATED, Json(credit_note.into())))
}

/// Gets an invoice with its paid amount and completion percentage
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<i64>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    require_role(&claims, permissions::INVOICE_READ)?;

    let summary = state
        .invoices
        .get_invoice_summary(InvoiceId::new(invoice_id))
        .await?;

    Ok(Json(summary.into()))
}
