//! Care repository implementation
//!
//! Read access to the contracts and appointment schedule that invoices are
//! generated from. Both tables are owned by the care planning side; billing
//! never writes them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::instrument;

use crate::error::DatabaseError;

/// Repository for contracts and appointments
#[derive(Debug, Clone)]
pub struct CareRepository {
    pool: PgPool,
}

impl CareRepository {
    /// Creates a new CareRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lists every contract of a client, oldest start date first
    #[instrument(skip(self))]
    pub async fn list_contracts_for_client(&self, client_id: i64) -> Result<Vec<ContractRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ContractRow>(
            r#"
            SELECT
                id,
                client_id,
                care_type,
                price,
                price_time_unit,
                vat,
                start_date,
                end_date,
                hours,
                hours_type
            FROM contracts
            WHERE client_id = $1
            ORDER BY start_date, id
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Lists a client's appointments starting in `[from, to)`
    ///
    /// # Arguments
    ///
    /// * `client_id` - The client
    /// * `from` - Inclusive lower bound on the start time
    /// * `to` - Exclusive upper bound on the start time
    #[instrument(skip(self))]
    pub async fn list_appointments_starting_between(
        &self,
        client_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AppointmentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r#"
            SELECT id, client_id, start_time, end_time
            FROM appointments
            WHERE client_id = $1
              AND start_time >= $2
              AND start_time < $3
            ORDER BY start_time
            "#,
        )
        .bind(client_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Kind of care a contract covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "care_type", rename_all = "snake_case")]
pub enum CareType {
    Accommodation,
    Ambulante,
}

/// Unit a contract price is quoted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "price_time_unit", rename_all = "snake_case")]
pub enum PriceTimeUnit {
    Minute,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "hours_type", rename_all = "snake_case")]
pub enum HoursType {
    Weekly,
    AllPeriod,
}

/// Database row for a contract
#[derive(Debug, Clone, FromRow)]
pub struct ContractRow {
    pub id: i64,
    pub client_id: i64,
    pub care_type: CareType,
    pub price: Decimal,
    pub price_time_unit: PriceTimeUnit,
    pub vat: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub hours: Option<Decimal>,
    pub hours_type: Option<HoursType>,
}

/// Database row for an appointment
#[derive(Debug, Clone, FromRow)]
pub struct AppointmentRow {
    pub id: i64,
    pub client_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}
