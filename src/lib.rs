pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod ledger;
pub mod model;
pub mod pagination;
pub mod query;
pub mod record;
pub mod review;
pub mod schema;
pub mod server;
pub mod session;
pub mod submission;
pub mod view;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use thiserror::Error;
use tracing::info;

use crate::error::BotResult;
use crate::schema::{
    admin_transactions, earning_submissions, id_sequences, spending_submissions, transaction_log,
    users,
};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

// WAL lets readers proceed during writes; the busy timeout retries locked operations instead
// of failing them.
const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON; \
    PRAGMA journal_mode = WAL; \
    PRAGMA synchronous = NORMAL; \
    PRAGMA busy_timeout = 10000;";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to connect to the database: {0}")]
    Connection(#[from] ConnectionError),
    #[error("failed to configure the database: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("failed to build the connection pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("failed to run migrations: {0}")]
    Migration(String),
}

#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Opens a single connection with the same pragmas pooled connections get.
pub fn establish_connection(database_url: &str) -> Result<SqliteConnection, SetupError> {
    let mut conn = SqliteConnection::establish(database_url)?;
    conn.batch_execute(CONNECTION_PRAGMAS)?;
    Ok(conn)
}

pub fn run_migrations(conn: &mut SqliteConnection) -> Result<(), SetupError> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| SetupError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        info!(count = applied.len(), "applied pending migrations");
    }
    Ok(())
}

/// Builds the connection pool and brings the schema up to date.
pub fn build_pool(database_url: &str, max_size: u32) -> Result<DbPool, SetupError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)?;
    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;
    Ok(pool)
}

/// Deletes every user, submission, and ledger row, and restarts every id sequence, including
/// SQLite's own AUTOINCREMENT counters.
pub fn reset_database(conn: &mut SqliteConnection) -> BotResult<()> {
    conn.immediate_transaction(|conn| {
        diesel::delete(transaction_log::table).execute(conn)?;
        diesel::delete(admin_transactions::table).execute(conn)?;
        diesel::delete(earning_submissions::table).execute(conn)?;
        diesel::delete(spending_submissions::table).execute(conn)?;
        diesel::delete(users::table).execute(conn)?;
        diesel::update(id_sequences::table)
            .set(id_sequences::last_value.eq(0))
            .execute(conn)?;
        diesel::sql_query("DELETE FROM sqlite_sequence").execute(conn)?;
        Ok(())
    })
}
