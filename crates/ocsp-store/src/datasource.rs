//! Data-source collaborator
//!
//! Thin wrapper over an [`sqlx::AnyPool`] that owns the concerns every store
//! component needs but none should reimplement: dialect detection from the
//! connection URL, `?` placeholder translation for PostgreSQL, "first N
//! rows" query wrapping, `MAX(col)` lookups for server-assigned ids, and the
//! translation of driver errors into a small, stable error type.
//!
//! Connections are acquired scoped: a [`PoolConnection`] returns itself to
//! the pool when dropped, on every exit path.

use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool, Row};
use thiserror::Error;

/// Stable classification of data-source failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not reach or keep the connection to the database.
    #[error("database connection error: {0}")]
    Connection(String),

    /// A statement violated a schema constraint.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Any other failed statement.
    #[error("database query error: {0}")]
    Query(String),

    /// The connection URL names a database this store does not speak.
    #[error("unsupported database dialect in URL: {0}")]
    UnsupportedDialect(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation()
                {
                    StoreError::Constraint(db.to_string())
                } else {
                    StoreError::Query(db.to_string())
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StoreError::Connection(err.to_string()),
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// SQL dialect of the connected database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    fn from_url(url: &str) -> Result<Dialect, StoreError> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(StoreError::UnsupportedDialect(url.to_string())),
        }
    }
}

/// Pooled database access with dialect awareness.
#[derive(Debug, Clone)]
pub struct Datasource {
    pool: AnyPool,
    dialect: Dialect,
}

impl Datasource {
    /// Connects a pool to `url`.
    ///
    /// Accepts any URL the compiled-in sqlx drivers understand; the dialect
    /// is derived from the URL scheme and drives SQL translation.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let dialect = Dialect::from_url(url)?;
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Datasource { pool, dialect })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Acquires a connection; dropping it returns it to the pool.
    pub async fn acquire(&self) -> Result<PoolConnection<Any>, StoreError> {
        Ok(self.pool.acquire().await?)
    }

    /// Translates canonical `?` placeholders into the dialect's form.
    ///
    /// The canonical statements in [`crate::schema`] use `?`; PostgreSQL
    /// wants `$1..$n`. None of the canonical statements contain string
    /// literals, so a plain scan is sufficient.
    pub fn translate(&self, sql: &str) -> String {
        match self.dialect {
            Dialect::Postgres => {
                let mut out = String::with_capacity(sql.len() + 8);
                let mut n = 0;
                for ch in sql.chars() {
                    if ch == '?' {
                        n += 1;
                        out.push('$');
                        out.push_str(&n.to_string());
                    } else {
                        out.push(ch);
                    }
                }
                out
            }
            Dialect::MySql | Dialect::Sqlite => sql.to_string(),
        }
    }

    /// Wraps a core query (`"ID FROM CERT WHERE ..."`) into a "first N rows"
    /// statement for the connected dialect.
    pub fn select_first_sql(&self, core: &str, rows: u32) -> String {
        // every supported dialect takes LIMIT; the seam stays here so an
        // Oracle/DB2-style FETCH FIRST form has one place to go
        format!("SELECT {core} LIMIT {rows}")
    }

    /// Largest value of `column` in `table`, or 0 when the table is empty.
    ///
    /// Used to hand out server-assigned ids; the engine is single-writer per
    /// issuer, so max+1 is safe here.
    pub async fn get_max(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        column: &str,
    ) -> Result<i64, StoreError> {
        let sql = format!("SELECT CAST(COALESCE(MAX({column}),0) AS BIGINT) FROM {table}");
        let row = sqlx::query(&sql).fetch_one(&mut *conn).await?;
        row.try_get::<i64, _>(0).map_err(StoreError::from)
    }
}
