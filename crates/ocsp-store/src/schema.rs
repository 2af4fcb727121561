//! Store schema: tables and canonical statements
//!
//! The engine owns three tables. `ISSUER` holds one row per CA the responder
//! answers for, `CERT` one row per known certificate under some issuer, and
//! `DBSCHEMA` a handful of key/value schema facts (currently the digest
//! algorithm of the `CERT.HASH` column).
//!
//! The statements below are the canonical forms; the data-source collaborator
//! rewrites placeholders and row-limit clauses per dialect. Exact column
//! widths and types are the collaborator's business, with three contracts the
//! engine relies on: `SN` round-trips a lowercase base-16 string, `REV` holds
//! a small integer, and the time columns hold signed 64-bit epoch seconds.

use crate::datasource::{Datasource, StoreError};
use ocsp_proto::hash::HashAlgo;
use sqlx::Row;
use tracing::info;

/// Full insert of a known certificate.
pub const SQL_INSERT_CERT: &str =
    "INSERT INTO CERT (ID,IID,SN,REV,RR,RT,RIT,LUPDATE,NBEFORE,NAFTER,HASH) VALUES(?,?,?,?,?,?,?,?,?,?,?)";

/// Refresh of a known certificate's metadata columns.
pub const SQL_UPDATE_CERT: &str = "UPDATE CERT SET LUPDATE=?,NBEFORE=?,NAFTER=?,HASH=? WHERE ID=?";

/// Insert of a revocation-only row (serial seen in a CRL, certificate not known).
pub const SQL_INSERT_CERT_REV: &str =
    "INSERT INTO CERT (ID,IID,SN,REV,RR,RT,RIT,LUPDATE) VALUES(?,?,?,?,?,?,?,?)";

/// Update of the revocation columns of an existing row.
pub const SQL_UPDATE_CERT_REV: &str = "UPDATE CERT SET REV=?,RR=?,RT=?,RIT=?,LUPDATE=? WHERE ID=?";

/// Removal of one certificate row, used for `removeFromCRL` delta entries.
pub const SQL_DELETE_CERT: &str = "DELETE FROM CERT WHERE IID=? AND SN=?";

/// Core of the id lookup; wrapped by `Datasource::select_first_sql`.
pub const CORE_SQL_SELECT_ID_CERT: &str = "ID FROM CERT WHERE IID=? AND SN=?";

/// Issuer lookup by SHA-1 fingerprint of the CA certificate.
pub const SQL_SELECT_ISSUER: &str = "SELECT ID,CRL_INFO FROM ISSUER WHERE S1C=?";

/// First import of an issuer.
pub const SQL_INSERT_ISSUER: &str =
    "INSERT INTO ISSUER (ID,SUBJECT,NBEFORE,NAFTER,S1C,CERT,REV_INFO,CRL_INFO) VALUES(?,?,?,?,?,?,?,?)";

/// Subsequent imports only move the revocation and CRL descriptors.
pub const SQL_UPDATE_ISSUER: &str = "UPDATE ISSUER SET REV_INFO=?,CRL_INFO=? WHERE ID=?";

/// Post-full-CRL sweep of rows not touched by the current run.
pub const SQL_DELETE_CERT_NOT_UPDATED: &str = "DELETE FROM CERT WHERE IID=? AND LUPDATE<?";

/// `DBSCHEMA` key carrying the cert-hash digest algorithm name.
const DBSCHEMA_CERTHASH_ALGO: &str = "CERTHASH_ALGO";

/// Creates the schema if it does not exist and seeds `DBSCHEMA`.
///
/// Idempotent; an already-persisted cert-hash algorithm wins over the
/// configured one so that mixed-version operators cannot silently fork the
/// meaning of the `HASH` column.
pub async fn migrate(datasource: &Datasource, certhash_algo: HashAlgo) -> Result<(), StoreError> {
    let mut conn = datasource.acquire().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ISSUER (
            ID BIGINT PRIMARY KEY,
            SUBJECT VARCHAR(350) NOT NULL,
            NBEFORE BIGINT NOT NULL,
            NAFTER BIGINT NOT NULL,
            S1C VARCHAR(44) NOT NULL,
            CERT TEXT NOT NULL,
            REV_INFO VARCHAR(200),
            CRL_INFO TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS CERT (
            ID BIGINT PRIMARY KEY,
            IID BIGINT NOT NULL,
            SN VARCHAR(40) NOT NULL,
            REV SMALLINT NOT NULL,
            RR SMALLINT,
            RT BIGINT,
            RIT BIGINT,
            LUPDATE BIGINT NOT NULL,
            NBEFORE BIGINT,
            NAFTER BIGINT,
            HASH VARCHAR(128),
            UNIQUE (IID, SN)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS DBSCHEMA (
            NAME VARCHAR(45) PRIMARY KEY,
            VALUE2 VARCHAR(100) NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    let existing = sqlx::query(&datasource.translate("SELECT VALUE2 FROM DBSCHEMA WHERE NAME=?"))
        .bind(DBSCHEMA_CERTHASH_ALGO)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from)?;

    match existing {
        None => {
            sqlx::query(&datasource.translate("INSERT INTO DBSCHEMA (NAME,VALUE2) VALUES(?,?)"))
                .bind(DBSCHEMA_CERTHASH_ALGO)
                .bind(certhash_algo.to_string())
                .execute(&mut *conn)
                .await?;
            info!(algo = %certhash_algo, "seeded cert-hash algorithm into DBSCHEMA");
        }
        Some(row) => {
            let stored: String = row.try_get("VALUE2").map_err(StoreError::from)?;
            if HashAlgo::from_name(&stored).ok() != Some(certhash_algo) {
                info!(
                    stored = %stored,
                    configured = %certhash_algo,
                    "DBSCHEMA cert-hash algorithm differs from configuration; keeping stored value"
                );
            }
        }
    }

    Ok(())
}

/// Reads the persisted cert-hash algorithm, defaulting to SHA-256 when the
/// schema predates the `DBSCHEMA` entry.
pub async fn cert_hash_algo(datasource: &Datasource) -> Result<HashAlgo, StoreError> {
    let mut conn = datasource.acquire().await?;
    let row = sqlx::query(&datasource.translate("SELECT VALUE2 FROM DBSCHEMA WHERE NAME=?"))
        .bind(DBSCHEMA_CERTHASH_ALGO)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        None => Ok(HashAlgo::Sha256),
        Some(row) => {
            let name: String = row.try_get("VALUE2").map_err(StoreError::from)?;
            HashAlgo::from_name(&name).map_err(|e| StoreError::Query(e.to_string()))
        }
    }
}
