use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::sync::Arc;

// The database URL for the production database
const DATABASE_URL: &str = "sqlite:merchpay.db";

/// DbConnection manages the SQLite pool and schema for the engine.
///
/// Every uniqueness invariant of the ledgers is a table constraint here, so
/// concurrent mutations resolve inside SQLite rather than in application
/// code.
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection
    pub async fn new(url: &str) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        let pool = SqlitePool::connect(url).await?;

        Self::setup_schema(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Initialize the standard database
    pub async fn init() -> Result<Self> {
        Self::new(DATABASE_URL).await
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS merchants (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                normalized_name TEXT NOT NULL UNIQUE,
                secret_hash TEXT NOT NULL,
                operator_handle TEXT UNIQUE,
                territory_tag TEXT NOT NULL DEFAULT ''
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS supply_records (
                point_code TEXT NOT NULL,
                date TEXT NOT NULL,
                box_count INTEGER NOT NULL,
                has_supply INTEGER NOT NULL,
                PRIMARY KEY (point_code, date)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS point_rates (
                point_code TEXT NOT NULL,
                month_key TEXT NOT NULL,
                rate_with_supply INTEGER NOT NULL,
                rate_without_supply INTEGER NOT NULL,
                rate_inventory INTEGER NOT NULL,
                coffee_bonus_enabled INTEGER NOT NULL,
                pay_under_five_boxes INTEGER NOT NULL,
                PRIMARY KEY (point_code, month_key)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                merchant_id TEXT NOT NULL,
                point_code TEXT NOT NULL,
                date TEXT NOT NULL,
                slot_kind TEXT NOT NULL,
                PRIMARY KEY (merchant_id, point_code, date, slot_kind)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS adjustments (
                id TEXT PRIMARY KEY,
                merchant_id TEXT NOT NULL,
                point_code TEXT NOT NULL,
                month_key TEXT NOT NULL,
                amount INTEGER NOT NULL,
                memo TEXT NOT NULL,
                kind TEXT NOT NULL,
                receipt_ref TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_adjustments_scope
                ON adjustments (merchant_id, point_code, month_key)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS submissions (
                merchant_id TEXT NOT NULL,
                month_key TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                last_change_after_submit_at TEXT,
                PRIMARY KEY (merchant_id, month_key)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(pool).await?;
        }

        Ok(())
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
