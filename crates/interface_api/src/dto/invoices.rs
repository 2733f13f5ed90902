//! Invoice and billing DTOs

use chrono::{DateTime, NaiveDate, Utc};
use domain_billing::{
    ContractWarning, Invoice, InvoiceDraft, InvoiceLineItem, InvoiceStatus, InvoiceSummary,
    InvoiceType, LinePeriod, WarningKind,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::non_negative;

/// Client and inclusive date window to bill
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_window"))]
pub struct GenerateInvoiceRequest {
    #[validate(range(min = 1, message = "client_id must be a positive id"))]
    pub client_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

fn validate_window(request: &GenerateInvoiceRequest) -> Result<(), ValidationError> {
    if request.end_date < request.start_date {
        let mut error = ValidationError::new("window");
        error.message = Some("end_date must not be before start_date".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusPreviewRequest {
    #[validate(custom(function = "non_negative"))]
    pub invoice_total: Decimal,
    #[validate(custom(function = "non_negative"))]
    pub total_paid: Decimal,
}

#[derive(Debug, Serialize)]
pub struct StatusPreviewResponse {
    pub status: InvoiceStatus,
}

#[derive(Debug, Serialize)]
pub struct WarningResponse {
    pub contract_id: i64,
    pub kind: WarningKind,
    pub message: String,
}

impl From<ContractWarning> for WarningResponse {
    fn from(w: ContractWarning) -> Self {
        Self {
            contract_id: w.contract_id.value(),
            kind: w.kind,
            message: w.message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PeriodResponse {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accommodation_time_frame: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambulante_total_minutes: Option<i64>,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

impl From<LinePeriod> for PeriodResponse {
    fn from(p: LinePeriod) -> Self {
        Self {
            start_date: p.start_date,
            end_date: p.end_date,
            accommodation_time_frame: p.accommodation_time_frame,
            ambulante_total_minutes: p.ambulante_total_minutes,
            pre_vat_total: p.totals.pre_vat_total.amount(),
            vat_amount: p.totals.vat_amount.amount(),
            total: p.totals.total.amount(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LineItemResponse {
    pub contract_id: i64,
    pub care_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: Decimal,
    pub price_time_unit: String,
    pub vat: i32,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
    pub periods: Vec<PeriodResponse>,
    pub warnings: Vec<WarningResponse>,
}

impl From<InvoiceLineItem> for LineItemResponse {
    fn from(item: InvoiceLineItem) -> Self {
        Self {
            contract_id: item.contract_id.value(),
            care_type: item.care_type.as_str().to_string(),
            start_date: item.start_date,
            end_date: item.end_date,
            price: item.price.amount(),
            price_time_unit: item.price_time_unit.as_str().to_string(),
            vat: item.vat.percentage(),
            pre_vat_total: item.totals.pre_vat_total.amount(),
            vat_amount: item.totals.vat_amount.amount(),
            total: item.totals.total.amount(),
            periods: item.periods.into_iter().map(Into::into).collect(),
            warnings: item.warnings.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceDraftResponse {
    pub client_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub line_items: Vec<LineItemResponse>,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub warnings: Vec<WarningResponse>,
    pub warning_count: usize,
}

impl From<InvoiceDraft> for InvoiceDraftResponse {
    fn from(draft: InvoiceDraft) -> Self {
        Self {
            client_id: draft.client_id.value(),
            start_date: draft.start_date,
            end_date: draft.end_date,
            line_items: draft.line_items.into_iter().map(Into::into).collect(),
            pre_vat_total: draft.pre_vat_total.amount(),
            vat_amount: draft.vat_amount.amount(),
            total_amount: draft.total_amount.amount(),
            warnings: draft.warnings.into_iter().map(Into::into).collect(),
            warning_count: draft.warning_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: i64,
    pub invoice_number: String,
    pub client_id: i64,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub invoice_type: InvoiceType,
    pub status: InvoiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credited_invoice_id: Option<i64>,
    pub line_items: Vec<LineItemResponse>,
    pub pre_vat_total: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub warning_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_paid: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_percentage: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id.value(),
            invoice_number: invoice.invoice_number,
            client_id: invoice.client_id.value(),
            invoice_date: invoice.invoice_date,
            due_date: invoice.due_date,
            invoice_type: invoice.invoice_type,
            status: invoice.status,
            credited_invoice_id: invoice.credited_invoice_id.map(|id| id.value()),
            line_items: invoice.line_items.into_iter().map(Into::into).collect(),
            pre_vat_total: invoice.pre_vat_total.amount(),
            vat_amount: invoice.vat_amount.amount(),
            total_amount: invoice.total_amount.amount(),
            warning_count: invoice.warning_count,
            total_paid: None,
            completion_percentage: None,
            created_at: invoice.created_at,
        }
    }
}

impl From<InvoiceSummary> for InvoiceResponse {
    fn from(summary: InvoiceSummary) -> Self {
        Self {
            total_paid: Some(summary.total_paid.amount()),
            completion_percentage: Some(summary.completion_percentage),
            ..InvoiceResponse::from(summary.invoice)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: (i32, u32, u32), end: (i32, u32, u32)) -> GenerateInvoiceRequest {
        GenerateInvoiceRequest {
            client_id: 1,
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        }
    }

    #[test]
    fn test_single_day_window_is_valid() {
        assert!(request((2024, 3, 1), (2024, 3, 1)).validate().is_ok());
    }

    #[test]
    fn test_inverted_window_is_invalid() {
        assert!(request((2024, 3, 2), (2024, 3, 1)).validate().is_err());
    }

    #[test]
    fn test_client_id_must_be_positive() {
        let mut req = request((2024, 3, 1), (2024, 3, 28));
        req.client_id = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_negative_preview_amount_is_invalid() {
        let req = StatusPreviewRequest {
            invoice_total: Decimal::from(100),
            total_paid: Decimal::from(-1),
        };
        assert!(req.validate().is_err());
    }
}
