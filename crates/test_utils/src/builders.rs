//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use core_kernel::{AppointmentId, ClientId, ContractId, Money, VatRate};
use domain_billing::{
    Appointment, CareType, Contract, HoursType, NewPayment, PaymentMethod, PaymentStatus,
    PriceTimeUnit,
};
use rust_decimal::Decimal;

use crate::fixtures::{IdFixtures, MoneyFixtures, TemporalFixtures, VatFixtures};

/// Builder for contracts
///
/// Defaults to an open-ended accommodation contract at 89.00 per day with 21% VAT,
/// starting Jan 1, 2024.
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    contract: Contract,
}

impl Default for ContractBuilder {
    fn default() -> Self {
        Self::accommodation()
    }
}

impl ContractBuilder {
    /// Starts from a daily accommodation contract
    pub fn accommodation() -> Self {
        Self {
            contract: Contract {
                id: IdFixtures::contract_id(),
                client_id: IdFixtures::client_id(),
                care_type: CareType::Accommodation,
                price: MoneyFixtures::daily_rate(),
                price_time_unit: PriceTimeUnit::Daily,
                vat: VatFixtures::standard(),
                start_date: TemporalFixtures::contract_start(),
                end_date: None,
                hours: None,
                hours_type: None,
            },
        }
    }

    /// Starts from an hourly ambulante contract
    pub fn ambulante() -> Self {
        Self::accommodation()
            .care_type(CareType::Ambulante)
            .price(MoneyFixtures::hourly_rate(), PriceTimeUnit::Hourly)
            .hours(Decimal::from(4), HoursType::Weekly)
    }

    pub fn id(mut self, id: i64) -> Self {
        self.contract.id = ContractId::new(id);
        self
    }

    pub fn client(mut self, client_id: ClientId) -> Self {
        self.contract.client_id = client_id;
        self
    }

    pub fn care_type(mut self, care_type: CareType) -> Self {
        self.contract.care_type = care_type;
        self
    }

    /// Sets the price and the unit it is quoted in
    pub fn price(mut self, price: Money, unit: PriceTimeUnit) -> Self {
        self.contract.price = price;
        self.contract.price_time_unit = unit;
        self
    }

    pub fn vat(mut self, vat: VatRate) -> Self {
        self.contract.vat = vat;
        self
    }

    pub fn starts(mut self, date: NaiveDate) -> Self {
        self.contract.start_date = date;
        self
    }

    pub fn ends(mut self, date: NaiveDate) -> Self {
        self.contract.end_date = Some(date);
        self
    }

    pub fn hours(mut self, hours: Decimal, hours_type: HoursType) -> Self {
        self.contract.hours = Some(hours);
        self.contract.hours_type = Some(hours_type);
        self
    }

    pub fn build(self) -> Contract {
        self.contract
    }
}

/// Builder for appointments
#[derive(Debug, Clone)]
pub struct AppointmentBuilder {
    id: i64,
    client_id: ClientId,
    start_time: DateTime<Utc>,
    minutes: i64,
}

impl Default for AppointmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentBuilder {
    /// A one hour appointment on the morning of Mar 4, 2024
    pub fn new() -> Self {
        Self {
            id: 1,
            client_id: IdFixtures::client_id(),
            start_time: TemporalFixtures::march_morning(4),
            minutes: 60,
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn client(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn starts_at(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn lasting_minutes(mut self, minutes: i64) -> Self {
        self.minutes = minutes;
        self
    }

    pub fn build(self) -> Appointment {
        Appointment {
            id: AppointmentId::new(self.id),
            client_id: self.client_id,
            start_time: self.start_time,
            end_time: self.start_time + Duration::minutes(self.minutes),
        }
    }
}

/// Builder for payments to record
#[derive(Debug, Clone)]
pub struct NewPaymentBuilder {
    payment: NewPayment,
}

impl NewPaymentBuilder {
    /// A completed bank transfer of `amount`, paid on the invoice date
    pub fn new(amount: Money) -> Self {
        Self {
            payment: NewPayment {
                amount,
                payment_status: PaymentStatus::Completed,
                payment_method: Some(PaymentMethod::BankTransfer),
                payment_date: TemporalFixtures::invoice_date(),
                payment_reference: None,
                notes: None,
            },
        }
    }

    pub fn status(mut self, status: PaymentStatus) -> Self {
        self.payment.payment_status = status;
        self
    }

    pub fn method(mut self, method: PaymentMethod) -> Self {
        self.payment.payment_method = Some(method);
        self
    }

    pub fn paid_on(mut self, date: NaiveDate) -> Self {
        self.payment.payment_date = date;
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.payment.payment_reference = Some(reference.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.payment.notes = Some(notes.into());
        self
    }

    pub fn build(self) -> NewPayment {
        self.payment
    }
}
