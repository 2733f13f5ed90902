//! In-memory implementation of the billing ports
//!
//! One store implements every port over shared state, so an invoice
//! issued through [`InvoiceStore`] is visible to [`PaymentStore`] and to
//! [`BillingHistoryPort`]. A payment transaction holds the store's lock
//! from `begin` until commit or rollback and works on a copy of the state,
//! which is written back only on commit.
//!
//! Faults can be switched on to make individual operations fail, for
//! exercising error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{
    AdapterHealth, ClientId, ContractId, DomainPort, EmployeeId, HalfOpenRange,
    HealthCheckResult, HealthCheckable, InvoiceId, Money, OperationMetadata, PaymentId, PortError,
};

use super::{
    AppointmentPort, BillingHistoryPort, ContractPort, InvoiceStore, PaymentStore,
    PaymentTransaction,
};
use crate::appointment::Appointment;
use crate::contract::Contract;
use crate::invoice::{
    format_invoice_number, parse_invoice_sequence, Invoice, InvoiceBalance, InvoiceLineItem,
    InvoiceStatus, InvoiceType, NewCreditNote, NewInvoice,
};
use crate::payment::{NewPayment, Payment, PaymentAuditEntry};

#[derive(Debug, Clone, Default)]
struct BillingState {
    contracts: Vec<Contract>,
    appointments: Vec<Appointment>,
    billed: HashMap<ContractId, Vec<HalfOpenRange>>,
    invoices: HashMap<InvoiceId, Invoice>,
    payments: BTreeMap<PaymentId, Payment>,
    audit: Vec<PaymentAuditEntry>,
    last_invoice_id: i64,
    last_payment_id: i64,
}

impl BillingState {
    fn completed_total(&self, invoice_id: InvoiceId) -> Money {
        self.payments
            .values()
            .filter(|p| p.invoice_id == invoice_id)
            .map(Payment::counted_amount)
            .sum()
    }

    /// Billed periods of a contract, seeded ones included
    fn billed_periods(&self, contract_id: ContractId) -> Result<Vec<HalfOpenRange>, PortError> {
        let mut periods = self.billed.get(&contract_id).cloned().unwrap_or_default();
        for period in self
            .invoices
            .values()
            .filter(|invoice| invoice.bills_its_periods())
            .flat_map(|invoice| invoice.line_items.iter())
            .filter(|item| item.contract_id == contract_id)
            .flat_map(|item| item.periods.iter())
        {
            periods.push(period.billed_range().map_err(|e| {
                PortError::internal(format!("invalid billed period of {}: {}", contract_id, e))
            })?);
        }
        Ok(periods)
    }

    /// Fails with a conflict if any line period of `items` is already billed
    fn ensure_unbilled(&self, items: &[InvoiceLineItem]) -> Result<(), PortError> {
        for item in items {
            let billed = self.billed_periods(item.contract_id)?;
            for period in &item.periods {
                let range = period
                    .billed_range()
                    .map_err(|e| PortError::validation(e.to_string()))?;
                if billed.iter().any(|b| b.overlaps(&range)) {
                    return Err(PortError::conflict(format!(
                        "contract {} is already billed within {}",
                        item.contract_id, range
                    )));
                }
            }
        }
        Ok(())
    }

    fn next_invoice_id(&mut self) -> InvoiceId {
        self.last_invoice_id += 1;
        InvoiceId::new(self.last_invoice_id)
    }

    fn next_invoice_sequence(&self, invoice_date: NaiveDate) -> u32 {
        self.invoices
            .values()
            .filter(|i| i.invoice_date == invoice_date)
            .filter_map(|i| parse_invoice_sequence(&i.invoice_number))
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[derive(Debug, Default)]
struct Faults {
    contracts: AtomicBool,
    appointments: AtomicBool,
    billing_history: AtomicBool,
    status_write: AtomicBool,
}

fn check(flag: &AtomicBool, operation: &str) -> Result<(), PortError> {
    if flag.load(Ordering::SeqCst) {
        return Err(PortError::ServiceUnavailable {
            service: format!("in-memory {}", operation),
        });
    }
    Ok(())
}

/// In-memory store implementing all billing ports
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<Mutex<BillingState>>,
    faults: Arc<Faults>,
}

impl InMemoryBillingStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates with contracts for testing
    pub async fn with_contracts(contracts: Vec<Contract>) -> Self {
        let store = Self::new();
        store.state.lock().await.contracts.extend(contracts);
        store
    }

    pub async fn add_contract(&self, contract: Contract) {
        self.state.lock().await.contracts.push(contract);
    }

    pub async fn add_appointment(&self, appointment: Appointment) {
        self.state.lock().await.appointments.push(appointment);
    }

    /// Marks a period of a contract as invoiced outside this store
    pub async fn add_billed_period(&self, contract_id: ContractId, period: HalfOpenRange) {
        self.state
            .lock()
            .await
            .billed
            .entry(contract_id)
            .or_default()
            .push(period);
    }

    /// Inserts a bare invoice header with no line items, returning its id
    pub async fn seed_invoice(
        &self,
        client_id: ClientId,
        total_amount: Money,
        status: InvoiceStatus,
    ) -> InvoiceId {
        let mut state = self.state.lock().await;
        let id = state.next_invoice_id();
        let now = Utc::now();
        let invoice_date = now.date_naive();
        let sequence = state.next_invoice_sequence(invoice_date);
        state.invoices.insert(
            id,
            Invoice {
                id,
                client_id,
                invoice_number: format_invoice_number(invoice_date, sequence),
                invoice_date,
                due_date: invoice_date + Duration::days(30),
                invoice_type: InvoiceType::Standard,
                status,
                period_start: invoice_date,
                period_end: invoice_date,
                credited_invoice_id: None,
                issued_by: None,
                line_items: Vec::new(),
                pre_vat_total: total_amount,
                vat_amount: Money::zero(),
                total_amount,
                warning_count: 0,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Current stored status of an invoice
    pub async fn invoice_status(&self, invoice_id: InvoiceId) -> Option<InvoiceStatus> {
        self.state
            .lock()
            .await
            .invoices
            .get(&invoice_id)
            .map(|i| i.status)
    }

    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }

    pub async fn audit_log(&self) -> Vec<PaymentAuditEntry> {
        self.state.lock().await.audit.clone()
    }

    /// Makes contract lookups fail
    pub fn fail_contract_fetch(&self, fail: bool) {
        self.faults.contracts.store(fail, Ordering::SeqCst);
    }

    /// Makes appointment lookups fail
    pub fn fail_appointment_fetch(&self, fail: bool) {
        self.faults.appointments.store(fail, Ordering::SeqCst);
    }

    /// Makes billing history lookups fail
    pub fn fail_billing_history(&self, fail: bool) {
        self.faults.billing_history.store(fail, Ordering::SeqCst);
    }

    /// Makes invoice status writes inside transactions fail
    pub fn fail_status_write(&self, fail: bool) {
        self.faults.status_write.store(fail, Ordering::SeqCst);
    }
}

impl DomainPort for InMemoryBillingStore {}

#[async_trait]
impl HealthCheckable for InMemoryBillingStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "in-memory-billing-store".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some("In-memory store always healthy".to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ContractPort for InMemoryBillingStore {
    async fn list_client_contracts(
        &self,
        client_id: ClientId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Contract>, PortError> {
        check(&self.faults.contracts, "contract lookup")?;
        Ok(self
            .state
            .lock()
            .await
            .contracts
            .iter()
            .filter(|c| c.client_id == client_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AppointmentPort for InMemoryBillingStore {
    async fn list_client_appointments(
        &self,
        client_id: ClientId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Appointment>, PortError> {
        check(&self.faults.appointments, "appointment lookup")?;
        Ok(self
            .state
            .lock()
            .await
            .appointments
            .iter()
            .filter(|a| a.client_id == client_id && a.starts_within(from, to))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BillingHistoryPort for InMemoryBillingStore {
    async fn billed_periods(
        &self,
        contract_id: ContractId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<HalfOpenRange>, PortError> {
        check(&self.faults.billing_history, "billing history lookup")?;
        self.state.lock().await.billed_periods(contract_id)
    }
}

#[async_trait]
impl InvoiceStore for InMemoryBillingStore {
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Invoice, PortError> {
        let mut state = self.state.lock().await;
        state.ensure_unbilled(&invoice.draft.line_items)?;

        let id = state.next_invoice_id();
        let sequence = state.next_invoice_sequence(invoice.invoice_date);
        let now = Utc::now();
        let draft = invoice.draft;

        let stored = Invoice {
            id,
            client_id: draft.client_id,
            invoice_number: format_invoice_number(invoice.invoice_date, sequence),
            invoice_date: invoice.invoice_date,
            due_date: invoice.due_date,
            invoice_type: InvoiceType::Standard,
            status: InvoiceStatus::Outstanding,
            period_start: draft.start_date,
            period_end: draft.end_date,
            credited_invoice_id: None,
            issued_by: Some(invoice.issued_by),
            line_items: draft.line_items,
            pre_vat_total: draft.pre_vat_total,
            vat_amount: draft.vat_amount,
            total_amount: draft.total_amount,
            warning_count: draft.warning_count,
            created_at: now,
            updated_at: now,
        };
        state.invoices.insert(id, stored.clone());
        Ok(stored)
    }

    async fn create_credit_note(
        &self,
        credit_note: NewCreditNote,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Invoice, PortError> {
        let mut state = self.state.lock().await;
        let credited_id = credit_note.credited_invoice_id;
        let credited = state
            .invoices
            .get(&credited_id)
            .ok_or_else(|| PortError::not_found("Invoice", credited_id))?;
        if !credited.bills_its_periods() {
            return Err(PortError::conflict(format!(
                "invoice {} can no longer be credited",
                credited.invoice_number
            )));
        }

        let id = state.next_invoice_id();
        let sequence = state.next_invoice_sequence(credit_note.invoice_date);
        let now = Utc::now();
        let stored = Invoice {
            id,
            client_id: credit_note.client_id,
            invoice_number: format_invoice_number(credit_note.invoice_date, sequence),
            invoice_date: credit_note.invoice_date,
            due_date: credit_note.due_date,
            invoice_type: InvoiceType::CreditNote,
            status: InvoiceStatus::Outstanding,
            period_start: credit_note.period_start,
            period_end: credit_note.period_end,
            credited_invoice_id: Some(credited_id),
            issued_by: Some(credit_note.issued_by),
            line_items: credit_note.line_items,
            pre_vat_total: credit_note.pre_vat_total,
            vat_amount: credit_note.vat_amount,
            total_amount: credit_note.total_amount,
            warning_count: 0,
            created_at: now,
            updated_at: now,
        };
        state.invoices.insert(id, stored.clone());
        if let Some(original) = state.invoices.get_mut(&credited_id) {
            original.status = InvoiceStatus::Canceled;
            original.updated_at = now;
        }
        Ok(stored)
    }

    async fn get_invoice(
        &self,
        invoice_id: InvoiceId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Invoice, PortError> {
        self.state
            .lock()
            .await
            .invoices
            .get(&invoice_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))
    }

    async fn completed_payment_total(
        &self,
        invoice_id: InvoiceId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Money, PortError> {
        Ok(self.state.lock().await.completed_total(invoice_id))
    }
}

#[async_trait]
impl PaymentStore for InMemoryBillingStore {
    async fn list_payments(
        &self,
        invoice_id: InvoiceId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Vec<Payment>, PortError> {
        let mut payments: Vec<Payment> = self
            .state
            .lock()
            .await
            .payments
            .values()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.payment_date, p.id));
        Ok(payments)
    }

    async fn get_payment(
        &self,
        payment_id: PaymentId,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Payment, PortError> {
        self.state
            .lock()
            .await
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Payment", payment_id))
    }

    async fn begin(
        &self,
        _metadata: Option<OperationMetadata>,
    ) -> Result<Box<dyn PaymentTransaction>, PortError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            faults: Arc::clone(&self.faults),
        }))
    }
}

/// Transaction over a private copy of the store state
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<BillingState>,
    working: BillingState,
    faults: Arc<Faults>,
}

#[async_trait]
impl PaymentTransaction for InMemoryTransaction {
    async fn lock_invoice(&mut self, invoice_id: InvoiceId) -> Result<InvoiceBalance, PortError> {
        self.working
            .invoices
            .get(&invoice_id)
            .map(|i| InvoiceBalance {
                invoice_id: i.id,
                total_amount: i.total_amount,
                status: i.status,
            })
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))
    }

    async fn get_payment(&mut self, payment_id: PaymentId) -> Result<Payment, PortError> {
        self.working
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Payment", payment_id))
    }

    async fn insert_payment(
        &mut self,
        invoice_id: InvoiceId,
        payment: &NewPayment,
        recorded_by: EmployeeId,
    ) -> Result<Payment, PortError> {
        self.working.last_payment_id += 1;
        let now = Utc::now();
        let stored = Payment {
            id: PaymentId::new(self.working.last_payment_id),
            invoice_id,
            amount: payment.amount,
            payment_status: payment.payment_status,
            payment_method: payment.payment_method,
            payment_date: payment.payment_date,
            payment_reference: payment.payment_reference.clone(),
            notes: payment.notes.clone(),
            recorded_by,
            created_at: now,
            updated_at: now,
        };
        self.working.payments.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<Payment, PortError> {
        let slot = self
            .working
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| PortError::not_found("Payment", payment.id))?;
        *slot = payment.clone();
        Ok(payment.clone())
    }

    async fn delete_payment(&mut self, payment_id: PaymentId) -> Result<(), PortError> {
        self.working
            .payments
            .remove(&payment_id)
            .map(|_| ())
            .ok_or_else(|| PortError::not_found("Payment", payment_id))
    }

    async fn completed_payment_total(&mut self, invoice_id: InvoiceId) -> Result<Money, PortError> {
        Ok(self.working.completed_total(invoice_id))
    }

    async fn set_invoice_status(
        &mut self,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<(), PortError> {
        check(&self.faults.status_write, "invoice status write")?;
        let invoice = self
            .working
            .invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))?;
        invoice.status = status;
        invoice.updated_at = Utc::now();
        Ok(())
    }

    async fn record_audit(&mut self, entry: &PaymentAuditEntry) -> Result<(), PortError> {
        self.working.audit.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let InMemoryTransaction { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::ChargeTotals;
    use crate::contract::{CareType, PriceTimeUnit};
    use crate::invoice::{InvoiceDraft, LinePeriod};
    use core_kernel::{DateRange, VatRate};
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    /// An invoice for contract 1 billing `first..=last` of March
    fn new_invoice(first: u32, last: u32) -> NewInvoice {
        let window = DateRange::new(date(first), date(last)).unwrap();
        let vat = VatRate::from_percentage(21).unwrap();
        let totals = ChargeTotals::from_pre_vat(Money::new(dec!(100)), vat);
        let mut draft = InvoiceDraft::new(ClientId::new(1), window);
        draft.add_line_item(InvoiceLineItem {
            contract_id: ContractId::new(1),
            care_type: CareType::Accommodation,
            start_date: window.start,
            end_date: window.end,
            periods: vec![LinePeriod {
                start_date: window.start,
                end_date: window.end,
                accommodation_time_frame: None,
                ambulante_total_minutes: None,
                totals,
            }],
            price: Money::new(dec!(100)),
            price_time_unit: PriceTimeUnit::Monthly,
            vat,
            totals,
            warnings: vec![],
        });
        NewInvoice {
            draft,
            invoice_date: date(31),
            due_date: date(31) + Duration::days(30),
            issued_by: EmployeeId::new(1),
        }
    }

    #[tokio::test]
    async fn test_overlapping_invoice_is_a_conflict() {
        let store = InMemoryBillingStore::new();
        store.create_invoice(new_invoice(1, 10), None).await.unwrap();

        let overlapping = store.create_invoice(new_invoice(10, 20), None).await;
        assert!(matches!(overlapping, Err(PortError::Conflict { .. })));

        let adjacent = store.create_invoice(new_invoice(11, 20), None).await.unwrap();
        assert!(adjacent.invoice_number.ends_with("-0002"));
    }

    #[tokio::test]
    async fn test_credit_note_cancels_and_releases_billed_days() {
        let store = InMemoryBillingStore::new();
        let invoice = store.create_invoice(new_invoice(1, 10), None).await.unwrap();
        assert_eq!(store.billed_periods(ContractId::new(1), None).await.unwrap().len(), 1);

        let note = invoice
            .credit_note(date(31), date(31), EmployeeId::new(2))
            .unwrap();
        let stored = store.create_credit_note(note.clone(), None).await.unwrap();

        assert_eq!(stored.invoice_type, InvoiceType::CreditNote);
        assert_eq!(stored.credited_invoice_id, Some(invoice.id));
        assert_eq!(store.invoice_status(invoice.id).await, Some(InvoiceStatus::Canceled));
        assert!(store.billed_periods(ContractId::new(1), None).await.unwrap().is_empty());

        let again = store.create_credit_note(note, None).await;
        assert!(matches!(again, Err(PortError::Conflict { .. })));

        store.create_invoice(new_invoice(1, 10), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_transaction_changes_invisible_until_commit() {
        let store = InMemoryBillingStore::new();
        let invoice_id = store
            .seed_invoice(ClientId::new(1), Money::new(dec!(100)), InvoiceStatus::Outstanding)
            .await;

        let mut tx = store.begin(None).await.unwrap();
        tx.lock_invoice(invoice_id).await.unwrap();
        tx.insert_payment(invoice_id, &NewPayment::completed(Money::new(dec!(100))), EmployeeId::new(1))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.payment_count().await, 0);

        let mut tx = store.begin(None).await.unwrap();
        tx.insert_payment(invoice_id, &NewPayment::completed(Money::new(dec!(100))), EmployeeId::new(1))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_lock_missing_invoice_is_not_found() {
        let store = InMemoryBillingStore::new();
        let mut tx = store.begin(None).await.unwrap();
        let result = tx.lock_invoice(InvoiceId::new(99)).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_status_write_fault() {
        let store = InMemoryBillingStore::new();
        let invoice_id = store
            .seed_invoice(ClientId::new(1), Money::new(dec!(100)), InvoiceStatus::Outstanding)
            .await;
        store.fail_status_write(true);

        let mut tx = store.begin(None).await.unwrap();
        let result = tx.set_invoice_status(invoice_id, InvoiceStatus::Paid).await;
        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_invoice_numbers_increase_per_day() {
        let store = InMemoryBillingStore::new();
        let first = store
            .seed_invoice(ClientId::new(1), Money::zero(), InvoiceStatus::Outstanding)
            .await;
        let second = store
            .seed_invoice(ClientId::new(1), Money::zero(), InvoiceStatus::Outstanding)
            .await;

        let first = store.get_invoice(first, None).await.unwrap();
        let second = store.get_invoice(second, None).await.unwrap();
        assert!(first.invoice_number.ends_with("-0001"));
        assert!(second.invoice_number.ends_with("-0002"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = InMemoryBillingStore::new();
        assert_eq!(store.health_check().await.status, AdapterHealth::Healthy);
    }
}
