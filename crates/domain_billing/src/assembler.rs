//! Invoice assembly
//!
//! Builds an [`InvoiceDraft`] for a client and billing window by resolving
//! each contract's billable periods and charging them. Contracts are billed
//! independently: a contract that cannot be billed leaves warnings on the
//! draft and the remaining contracts are billed as usual.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use core_kernel::{ClientId, DateRange, HalfOpenRange, OperationMetadata, Timezone};

use crate::appointment::total_minutes_within;
use crate::calculation::{calculate_accommodation, calculate_ambulante, ChargeTotals};
use crate::contract::{CareType, Contract};
use crate::error::BillingError;
use crate::invoice::{InvoiceDraft, InvoiceLineItem, LinePeriod};
use crate::period::resolve_billable_periods;
use crate::ports::{AppointmentPort, BillingHistoryPort, ContractPort};
use crate::warning::{ContractWarning, WarningKind};

/// Outcome of billing one contract
#[derive(Debug, Default)]
struct ContractBilling {
    periods: Vec<LinePeriod>,
    warnings: Vec<ContractWarning>,
}

/// Produces invoice drafts from contracts and appointments
///
/// The assembler only reads; drafts are stored by `InvoiceService`.
#[derive(Clone)]
pub struct InvoiceAssembler {
    contracts: Arc<dyn ContractPort>,
    appointments: Arc<dyn AppointmentPort>,
    history: Arc<dyn BillingHistoryPort>,
    timezone: Timezone,
}

impl InvoiceAssembler {
    /// Creates an assembler interpreting calendar days in UTC
    pub fn new(
        contracts: Arc<dyn ContractPort>,
        appointments: Arc<dyn AppointmentPort>,
        history: Arc<dyn BillingHistoryPort>,
    ) -> Self {
        Self {
            contracts,
            appointments,
            history,
            timezone: Timezone::default(),
        }
    }

    /// Sets the timezone in which appointment times are mapped to days
    pub fn with_timezone(mut self, timezone: Timezone) -> Self {
        self.timezone = timezone;
        self
    }

    /// Generates a draft invoice for a client
    ///
    /// # Arguments
    ///
    /// * `client_id` - The client to bill
    /// * `start_date` - First day of the billing window
    /// * `end_date` - Last day of the billing window, inclusive
    ///
    /// # Returns
    ///
    /// A draft with one line item per contract that had something to bill.
    /// Problems with individual contracts are reported in `warnings` and
    /// never fail the call.
    ///
    /// # Errors
    ///
    /// * `Validation` - non-positive client id or end before start
    /// * `NotFound` - the client has no contracts
    /// * `Storage` - the contracts could not be loaded
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn generate_invoice(
        &self,
        client_id: ClientId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<InvoiceDraft, BillingError> {
        if !client_id.is_valid() {
            return Err(BillingError::validation(format!(
                "client id must be positive, got {}",
                client_id.value()
            )));
        }
        let window = DateRange::new(start_date, end_date).map_err(|_| {
            BillingError::validation(format!(
                "end date {} is before start date {}",
                end_date, start_date
            ))
        })?;
        window
            .to_half_open()
            .map_err(|e| BillingError::validation(format!("invalid billing window: {}", e)))?;

        let metadata = OperationMetadata::with_correlation_id(format!("invoice-draft-{}", client_id))
            .with_context("client_id", client_id.to_string());
        let contracts = self
            .contracts
            .list_client_contracts(client_id, Some(metadata))
            .await?;
        if contracts.is_empty() {
            return Err(BillingError::not_found("Contracts for client", client_id));
        }

        let mut draft = InvoiceDraft::new(client_id, window);
        for contract in &contracts {
            let billing = self.bill_contract(contract, &window).await;
            for warning in &billing.warnings {
                warn!(contract_id = %warning.contract_id, kind = warning.kind.as_str(), "{}", warning.message);
            }

            if let Some(item) = line_item(contract, &billing) {
                draft.add_line_item(item);
            }
            draft.add_warnings(billing.warnings);
        }

        info!(
            line_items = draft.line_items.len(),
            warnings = draft.warning_count,
            total = %draft.total_amount,
            "assembled invoice draft"
        );
        Ok(draft)
    }

    async fn bill_contract(&self, contract: &Contract, window: &DateRange) -> ContractBilling {
        let mut billing = ContractBilling::default();

        let already_billed = match self.history.billed_periods(contract.id, None).await {
            Ok(periods) => periods,
            Err(e) => {
                billing.warnings.push(ContractWarning::data_unavailable(
                    contract.id,
                    format!("could not load billing history: {}", e),
                ));
                return billing;
            }
        };

        let periods = match resolve_billable_periods(contract, window, &already_billed) {
            Ok(periods) => periods,
            Err(e) => {
                billing.warnings.push(ContractWarning::new(
                    contract.id,
                    WarningKind::CalculationFailed,
                    format!("could not resolve billable periods: {}", e),
                ));
                return billing;
            }
        };

        debug!(contract_id = %contract.id, periods = periods.len(), "resolved billable periods");
        if periods.len() > 1 {
            billing.warnings.push(ContractWarning::new(
                contract.id,
                WarningKind::MultiplePeriods,
                format!("contract has {} separate billable periods", periods.len()),
            ));
        }

        for period in &periods {
            let result = match contract.care_type {
                CareType::Accommodation => Self::accommodation_period(contract, period),
                CareType::Ambulante => self.ambulante_period(contract, period).await,
            };
            match result {
                Ok(line_period) => billing.periods.push(line_period),
                Err(warning) => billing.warnings.push(warning),
            }
        }
        billing
    }

    fn accommodation_period(contract: &Contract, period: &HalfOpenRange) -> Result<LinePeriod, ContractWarning> {
        let charge = calculate_accommodation(&contract.rate_terms(), period)
            .map_err(|e| ContractWarning::calculation(contract.id, &e))?;

        Ok(LinePeriod {
            start_date: period.start,
            end_date: period.last_day(),
            accommodation_time_frame: Some(charge.time_frame),
            ambulante_total_minutes: None,
            totals: charge.totals,
        })
    }

    async fn ambulante_period(&self, contract: &Contract, period: &HalfOpenRange) -> Result<LinePeriod, ContractWarning> {
        let (from, to) = self.timezone.instants(period);
        let appointments = self
            .appointments
            .list_client_appointments(contract.client_id, from, to, None)
            .await
            .map_err(|e| {
                ContractWarning::data_unavailable(contract.id, format!("could not load appointments: {}", e))
            })?;

        let (count, minutes) = total_minutes_within(&appointments, from, to);
        if count == 0 {
            return Err(ContractWarning::missing_data(
                contract.id,
                format!("no appointments found in {}", period.to_date_range()),
            ));
        }

        let charge = calculate_ambulante(&contract.rate_terms(), minutes)
            .map_err(|e| ContractWarning::calculation(contract.id, &e))?;

        Ok(LinePeriod {
            start_date: period.start,
            end_date: period.last_day(),
            accommodation_time_frame: None,
            ambulante_total_minutes: Some(charge.total_minutes),
            totals: charge.totals,
        })
    }
}

/// Builds the line item of a contract if at least one period was charged
fn line_item(contract: &Contract, billing: &ContractBilling) -> Option<InvoiceLineItem> {
    let first = billing.periods.first()?;
    let last = billing.periods.last()?;
    let totals: ChargeTotals = billing.periods.iter().map(|p| p.totals).sum();

    Some(InvoiceLineItem {
        contract_id: contract.id,
        care_type: contract.care_type,
        start_date: first.start_date,
        end_date: last.end_date,
        periods: billing.periods.clone(),
        price: contract.price,
        price_time_unit: contract.price_time_unit,
        vat: contract.vat,
        totals,
        warnings: billing.warnings.clone(),
    })
}
