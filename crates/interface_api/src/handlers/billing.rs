//! Draft generation and status preview handlers

use axum::{extract::State, Extension, Json};
use core_kernel::{ClientId, Money};
use domain_billing::determine_invoice_status;

use crate::auth::{permissions, require_role, Claims};
use crate::dto::invoices::*;
use crate::extract::ValidatedJson;
use crate::{error::ApiError, AppState};

/// Generates a draft invoice without storing it
pub async fn generate_draft(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(request): ValidatedJson<GenerateInvoiceRequest>,
) -> Result<Json<InvoiceDraftResponse>, ApiError> {
    require_role(&claims, permissions::BILLING_READ)?;

    let draft = state
        .invoices
        .generate_draft(ClientId::new(request.client_id), request.start_date, request.end_date)
        .await?;

    Ok(Json(draft.into()))
}

/// Returns the status an invoice would have for the given amounts
pub async fn status_preview(
    ValidatedJson(request): ValidatedJson<StatusPreviewRequest>,
) -> Result<Json<StatusPreviewResponse>, ApiError> {
    let status = determine_invoice_status(
        Money::new(request.invoice_total),
        Money::new(request.total_paid),
    )?;

    Ok(Json(StatusPreviewResponse { status }))
}
