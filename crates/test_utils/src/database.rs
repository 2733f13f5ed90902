//! Database Test Utilities
//!
//! Provides helpers for database testing including testcontainer management,
//! schema setup through the real migrations and seeding of care data.

use chrono::{DateTime, Utc};
use domain_billing::{Contract, HoursType};
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "care_billing_test";

/// Configuration for test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    /// Creates the database connection URL
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A wrapper around a PostgreSQL test container
pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a new PostgreSQL container and applies the migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or a migration fails
    pub async fn new() -> TestResult<Self> {
        let container = Postgres::default()
            .with_user(POSTGRES_USER)
            .with_password(POSTGRES_PASSWORD)
            .with_db_name(POSTGRES_DB)
            .start()
            .await?;

        let port = container.get_host_port_ipv4(5432).await?;
        let host = container.get_host().await?.to_string();

        let config = TestDatabaseConfig {
            host,
            port,
            ..TestDatabaseConfig::default()
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.connection_url())
            .await?;

        infra_db::run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            config,
            pool,
        })
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Clears all data from the database while preserving the schema
    pub async fn clear_data(&self) -> TestResult<()> {
        let tables = [
            "payment_audit_log",
            "payments",
            "invoice_line_periods",
            "invoice_lines",
            "invoices",
            "appointments",
            "contracts",
            "employees",
            "clients",
        ];

        for table in tables {
            sqlx::query(&format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", table))
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Inserts a client with a generated name and returns its id
    pub async fn insert_client(&self) -> TestResult<i64> {
        let (first_name, last_name) = person_name();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO clients (first_name, last_name) VALUES ($1, $2) RETURNING id",
        )
        .bind(first_name)
        .bind(last_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Inserts an employee with a generated name and returns its id
    pub async fn insert_employee(&self) -> TestResult<i64> {
        let (first_name, last_name) = person_name();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO employees (first_name, last_name) VALUES ($1, $2) RETURNING id",
        )
        .bind(first_name)
        .bind(last_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Inserts a contract for `client_id`, ignoring the contract's own ids
    ///
    /// Returns the database id of the new contract.
    pub async fn insert_contract(&self, client_id: i64, contract: &Contract) -> TestResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO contracts (
                client_id, care_type, price, price_time_unit, vat,
                start_date, end_date, hours, hours_type
            )
            VALUES ($1, $2::care_type, $3, $4::price_time_unit, $5, $6, $7, $8, $9::hours_type)
            RETURNING id
            "#,
        )
        .bind(client_id)
        .bind(contract.care_type.as_str())
        .bind(contract.price.amount())
        .bind(contract.price_time_unit.as_str())
        .bind(contract.vat.percentage())
        .bind(contract.start_date)
        .bind(contract.end_date)
        .bind(contract.hours)
        .bind(contract.hours_type.map(hours_type_label))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Inserts an appointment and returns its id
    pub async fn insert_appointment(
        &self,
        client_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> TestResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO appointments (client_id, start_time, end_time) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(client_id)
        .bind(start_time)
        .bind(end_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Counts the audit entries recorded for an invoice
    pub async fn audit_entry_count(&self, invoice_id: i64) -> TestResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM payment_audit_log WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

fn person_name() -> (String, String) {
    (FirstName().fake(), LastName().fake())
}

fn hours_type_label(hours_type: HoursType) -> &'static str {
    match hours_type {
        HoursType::Weekly => "weekly",
        HoursType::AllPeriod => "all_period",
    }
}

/// Global test database for shared integration tests
static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// Gets or creates a shared test database instance
///
/// # Panics
///
/// Panics if the database fails to initialize
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// Creates an isolated test database for a single test
///
/// Use this when tests need to modify data and isolation is required
pub async fn create_isolated_test_database() -> TestResult<TestDatabase> {
    TestDatabase::new().await
}

/// Helper macro for running database tests against a fresh container
///
/// The generated test is `#[ignore]`d because it needs a Docker daemon.
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires docker"]
        async fn $name() {
            let $db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            $body
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_connection_url() {
        let config = TestDatabaseConfig::default();
        let url = config.connection_url();

        assert!(url.starts_with("postgres://"));
        assert!(url.contains(POSTGRES_USER));
        assert!(url.contains(POSTGRES_DB));
    }
}
