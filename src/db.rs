//! Connection pool, per-connection setup and schema migrations for the
//! recipe store, plus the circuit breaker that guards calls into it.

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use diesel::QueryResult;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use failsafe::backoff::EqualJittered;
use failsafe::failure_policy::{ConsecutiveFailures, OrElse, SuccessRateOverTimeWindow};
use failsafe::{Config, StateMachine};
use thiserror::Error;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub type CircuitBreakerType = StateMachine<
    OrElse<SuccessRateOverTimeWindow<EqualJittered>, ConsecutiveFailures<EqualJittered>>,
    (),
>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const BUSY_TIMEOUT_MILLIS: u32 = 5_000;

diesel::define_sql_function! {
    /// Unicode lowercasing. SQLite's own `lower` only folds ASCII letters.
    fn fold_case(text: Text) -> Text;
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to open database pool: {0}")]
    Pool(#[from] r2d2::PoolError),
    #[error("failed to run migrations: {0}")]
    Migration(String),
}

/// Applied to every connection the pool opens.
#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        configure_connection(conn).map_err(r2d2::Error::QueryError)
    }
}

/// Turn on foreign key enforcement (off by default in SQLite), wait on
/// locked writes instead of failing immediately, and register `fold_case`.
pub fn configure_connection(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(&format!(
        "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {BUSY_TIMEOUT_MILLIS};"
    ))?;
    fold_case_utils::register_impl(conn, |text: String| text.to_lowercase())
}

/// `database_url` is a file path; `:memory:` would give every pooled
/// connection its own empty database.
pub fn build_pool(database_url: &str, max_size: u32) -> Result<DbPool, SetupError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)?;
    log::debug!("opened database pool for {} with {} connections", database_url, max_size);
    Ok(pool)
}

pub fn run_migrations(conn: &mut SqliteConnection) -> Result<(), SetupError> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| SetupError::Migration(e.to_string()))?;
    for version in applied {
        log::info!("applied migration {}", version);
    }
    Ok(())
}

pub fn circuit_breaker() -> CircuitBreakerType {
    Config::new().build()
}
