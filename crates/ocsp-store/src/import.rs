//! CRL import engine
//!
//! Consumes an operator-provided directory and reconciles the certificate
//! status store against it. The baseline layout is:
//!
//! ```text
//! basedir/
//!   ca.crt        required; the CA certificate (DER or PEM)
//!   ca.crl        required; the CRL to import
//!   issuer.crt    required only when the CRL is signed by a delegated signer
//!   crl.url       optional; distribution URL embedded into the CrlID
//!   REVOCATION    optional; revocation of the CA itself (properties syntax)
//!   certs/        optional; *.der|*.crt|*.pem and *.serials material
//! ```
//!
//! An import verifies the CRL signature, enforces CRL-number monotonicity
//! and the delta-CRL base match, streams revoked entries into `CERT`, ingests
//! companion certificate material, and — for full CRLs only — sweeps rows the
//! run did not touch. Any fatal condition aborts the run; the connection goes
//! back to the pool on every exit path and partial progress is safe because
//! the next run of the same CRL stops at the CRL-number check.
//!
//! The engine is single-threaded per invocation. Concurrent imports of the
//! same basedir are undefined; different issuers sharing one database contend
//! only at the SQL level.

use crate::clock::{Clock, SystemClock};
use crate::crlinfo::{CertRevocationInfo, CrlInfo, EncodingError};
use crate::datasource::{Datasource, StoreError};
use crate::schema;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use num_bigint::BigUint;
use ocsp_proto::asn1;
use ocsp_proto::crl::{serial_hex, CrlError, CrlReason, CrlStreamParser};
use ocsp_proto::hash::HashAlgo;
use sqlx::AnyConnection;
use sqlx::Row;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use x509_parser::prelude::*;

/// Proprietary CRL extension carrying the full certificates of the issuance
/// batch: `SET OF SEQUENCE { serialNumber INTEGER, [0] Certificate OPTIONAL,
/// [1] UTF8String profileName OPTIONAL }`.
pub const OID_CRL_CERTSET: &str = "1.3.6.1.4.1.45522.1.1";

const KEY_CA_REVOCATION_TIME: &str = "ca.revocation.time";
const KEY_CA_INVALIDITY_TIME: &str = "ca.invalidity.time";

/// Why an import aborted.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// A required input file is absent.
    #[error("required input file missing: {0}")]
    InputMissing(PathBuf),

    /// An input the engine must understand failed to parse.
    #[error("malformed input: {0}")]
    InputMalformed(String),

    /// The CRL signature did not verify against the signer certificate.
    #[error("signature of CRL is invalid")]
    CrlSignatureInvalid,

    /// The CRL carries no `cRLNumber` extension.
    #[error("CRL has no crlNumber extension")]
    CrlMissingNumber,

    /// The CRL number is not strictly greater than the stored one. Equal
    /// numbers are rejected too: resuming a half-finished import is an
    /// operator decision, never a silent one.
    #[error("CRL number {incoming} is not newer than stored CRL number {stored}")]
    CrlNotNewer { incoming: BigUint, stored: BigUint },

    /// A delta CRL arrived for an issuer with no imported full CRL.
    #[error("delta CRL with base CRL number {0} requires importing the full CRL first")]
    NeedFullCrlFirst(BigUint),

    /// The delta's base does not match the stored base (or full) CRL number.
    #[error("delta CRL base {incoming} does not match stored base {stored}")]
    DeltaBaseMismatch { incoming: BigUint, stored: BigUint },

    /// An indirect-CRL entry names an issuer other than the CA.
    #[error("CRL entry for serial {0} names a different certificate issuer")]
    CrlEntryIssuerMismatch(String),

    /// Translated data-source failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// One of the issuer descriptors failed to encode or decode.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// CRL parsing or verification machinery failed.
    #[error(transparent)]
    Crl(#[from] CrlError),

    /// Filesystem failure outside the per-file skippable cases.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The CRL import engine.
///
/// One instance is bound to a data source and a base directory; every call
/// to [`CrlImporter::import_crl_to_ocsp_db`] performs one full import run.
pub struct CrlImporter {
    datasource: Datasource,
    basedir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl CrlImporter {
    pub fn new(datasource: Datasource, basedir: impl Into<PathBuf>) -> Self {
        Self::with_clock(datasource, basedir, Arc::new(SystemClock))
    }

    /// Like [`CrlImporter::new`] with an injected clock; tests use this to
    /// make the `LUPDATE` sweep deterministic.
    pub fn with_clock(
        datasource: Datasource,
        basedir: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CrlImporter {
            datasource,
            basedir: basedir.into(),
            clock,
        }
    }

    /// Imports the CRL in the base directory into the status store.
    ///
    /// Returns a coarse success flag and logs the cause of any failure;
    /// callers that need the error taxonomy use [`CrlImporter::try_import`].
    pub async fn import_crl_to_ocsp_db(&self) -> bool {
        match self.try_import().await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    error = %err,
                    basedir = %self.basedir.display(),
                    "could not import CRL into the certificate status store"
                );
                false
            }
        }
    }

    /// Imports the CRL, surfacing the typed failure cause.
    pub async fn try_import(&self) -> Result<(), ImportError> {
        let run = ImportRun::prepare(&self.datasource, &self.basedir, self.clock.as_ref()).await?;
        run.execute().await
    }
}

/// State of one import run, assembled before the database is touched.
struct ImportRun<'a> {
    datasource: &'a Datasource,
    clock: &'a dyn Clock,
    basedir: &'a Path,
    certhash_algo: HashAlgo,
    ca: CaCert,
    ca_rev_info: Option<CertRevocationInfo>,
    crl: CrlStreamParser,
    crl_number: BigUint,
    base_crl_number: Option<BigUint>,
    crl_id: Vec<u8>,
}

/// Owned fields of the CA certificate the run needs after parsing.
struct CaCert {
    raw: Vec<u8>,
    subject_raw: Vec<u8>,
    subject: String,
    not_before: i64,
    not_after: i64,
    ski: Option<Vec<u8>>,
}

impl CaCert {
    fn load(path: &Path) -> Result<CaCert, ImportError> {
        let raw = read_cert_der(path)?;
        let (_, cert) = X509Certificate::from_der(&raw).map_err(|e| {
            ImportError::InputMalformed(format!(
                "could not parse certificate {}: {e}",
                path.display()
            ))
        })?;
        Ok(CaCert {
            subject_raw: cert.subject().as_raw().to_vec(),
            subject: rfc4519_name(cert.subject()),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            ski: extract_ski(&cert),
            raw,
        })
    }
}

impl<'a> ImportRun<'a> {
    async fn prepare(
        datasource: &'a Datasource,
        basedir: &'a Path,
        clock: &'a dyn Clock,
    ) -> Result<ImportRun<'a>, ImportError> {
        let certhash_algo = schema::cert_hash_algo(datasource).await?;

        let ca_cert_file = basedir.join("ca.crt");
        if !ca_cert_file.exists() {
            return Err(ImportError::InputMissing(ca_cert_file));
        }
        let crl_file = basedir.join("ca.crl");
        if !crl_file.exists() {
            return Err(ImportError::InputMissing(crl_file));
        }

        let ca = CaCert::load(&ca_cert_file)?;
        let ca_rev_info = load_revocation_properties(&basedir.join("REVOCATION"))?;

        let crl = CrlStreamParser::open(&crl_file)?;

        // Resolve the CRL signer: the CA itself, or a delegated signer whose
        // certificate must be present and must carry the CRL's issuer DN.
        let signer_raw = if crl.issuer_raw() == ca.subject_raw.as_slice() {
            ca.raw.clone()
        } else {
            let issuer_cert_file = basedir.join("issuer.crt");
            if !issuer_cert_file.exists() {
                return Err(ImportError::InputMissing(issuer_cert_file));
            }
            let raw = read_cert_der(&issuer_cert_file)?;
            let (_, issuer_cert) = X509Certificate::from_der(&raw).map_err(|e| {
                ImportError::InputMalformed(format!("could not parse issuer.crt: {e}"))
            })?;
            if issuer_cert.subject().as_raw() != crl.issuer_raw() {
                return Err(ImportError::InputMalformed(
                    "issuer.crt subject does not match the CRL issuer".into(),
                ));
            }
            raw
        };

        let (_, signer_cert) = X509Certificate::from_der(&signer_raw)
            .map_err(|e| ImportError::InputMalformed(format!("could not parse CRL signer: {e}")))?;
        if !crl.verify_signature(signer_cert.public_key())? {
            return Err(ImportError::CrlSignatureInvalid);
        }

        let crl_number = crl
            .crl_number()
            .cloned()
            .ok_or(ImportError::CrlMissingNumber)?;
        let base_crl_number = crl.base_crl_number().cloned();

        info!(
            kind = if crl.is_delta_crl() { "delta CRL" } else { "full CRL" },
            number = %crl_number,
            "importing a newer CRL"
        );

        let crl_id = build_crl_id(basedir, &crl_number, crl.this_update())?;

        Ok(ImportRun {
            datasource,
            clock,
            basedir,
            certhash_algo,
            ca,
            ca_rev_info,
            crl,
            crl_number,
            base_crl_number,
            crl_id,
        })
    }

    async fn execute(&self) -> Result<(), ImportError> {
        // the sweep compares against this instant, captured before any row
        // is touched
        let start_time = self.clock.now().timestamp();

        let mut conn = self.datasource.acquire().await?;
        let issuer_id = self.import_ca(&mut conn).await?;
        self.import_entries(&mut conn, issuer_id).await?;
        if !self.crl.is_delta_crl() {
            self.delete_entries_not_updated_since(&mut conn, issuer_id, start_time)
                .await?;
        }

        info!(
            issuer = %self.ca.subject,
            number = %self.crl_number,
            "CRL import finished"
        );
        Ok(())
    }

    /// Upserts the `ISSUER` row and enforces the CRL ordering invariants.
    async fn import_ca(&self, conn: &mut AnyConnection) -> Result<i64, ImportError> {
        let s1c = HashAlgo::Sha1.base64_hash(&self.ca.raw);

        let row = sqlx::query(&self.datasource.translate(schema::SQL_SELECT_ISSUER))
            .bind(&s1c)
            .fetch_optional(&mut *conn)
            .await
            .map_err(StoreError::from)?;

        let existing = match row {
            None => None,
            Some(row) => {
                let id: i64 = row.try_get("ID").map_err(StoreError::from)?;
                let encoded: Option<String> = row.try_get("CRL_INFO").map_err(StoreError::from)?;
                let encoded = encoded.ok_or_else(|| {
                    ImportError::InputMalformed(
                        "issuer exists in the store but was not populated from a CRL".into(),
                    )
                })?;
                Some((id, CrlInfo::decode(&encoded)?))
            }
        };

        let crl_info = match &existing {
            None => {
                if let Some(base) = &self.base_crl_number {
                    return Err(ImportError::NeedFullCrlFirst(base.clone()));
                }
                CrlInfo {
                    crl_number: self.crl_number.clone(),
                    base_crl_number: None,
                    this_update: self.crl.this_update(),
                    next_update: self.crl.next_update(),
                    crl_id: self.crl_id.clone(),
                }
            }
            Some((_, stored)) => {
                if self.crl_number <= stored.crl_number {
                    return Err(ImportError::CrlNotNewer {
                        incoming: self.crl_number.clone(),
                        stored: stored.crl_number.clone(),
                    });
                }
                if let Some(base) = &self.base_crl_number {
                    // a delta applies only on top of the exact CRL it names
                    let last_full = stored
                        .base_crl_number
                        .clone()
                        .unwrap_or_else(|| stored.crl_number.clone());
                    if *base != last_full {
                        return Err(ImportError::DeltaBaseMismatch {
                            incoming: base.clone(),
                            stored: last_full,
                        });
                    }
                }
                CrlInfo {
                    crl_number: self.crl_number.clone(),
                    base_crl_number: self.base_crl_number.clone(),
                    this_update: self.crl.this_update(),
                    next_update: self.crl.next_update(),
                    crl_id: self.crl_id.clone(),
                }
            }
        };

        let rev_info = self.ca_rev_info.as_ref().map(|r| r.encode());

        match existing {
            None => {
                let issuer_id = self.datasource.get_max(conn, "ISSUER", "ID").await? + 1;
                sqlx::query(&self.datasource.translate(schema::SQL_INSERT_ISSUER))
                    .bind(issuer_id)
                    .bind(&self.ca.subject)
                    .bind(self.ca.not_before)
                    .bind(self.ca.not_after)
                    .bind(&s1c)
                    .bind(BASE64.encode(&self.ca.raw))
                    .bind(rev_info)
                    .bind(crl_info.encode())
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                debug!(issuer_id, subject = %self.ca.subject, "inserted issuer");
                Ok(issuer_id)
            }
            Some((issuer_id, _)) => {
                sqlx::query(&self.datasource.translate(schema::SQL_UPDATE_ISSUER))
                    .bind(rev_info)
                    .bind(crl_info.encode())
                    .bind(issuer_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                debug!(issuer_id, subject = %self.ca.subject, "updated issuer");
                Ok(issuer_id)
            }
        }
    }

    /// Streams the revoked entries into `CERT`, then ingests certificate
    /// material (embedded cert-set extension or the `certs/` directory).
    async fn import_entries(
        &self,
        conn: &mut AnyConnection,
        issuer_id: i64,
    ) -> Result<(), ImportError> {
        let mut max_id = self.datasource.get_max(conn, "CERT", "ID").await?;
        let is_delta = self.crl.is_delta_crl();

        let select_id_sql = self.datasource.translate(
            &self
                .datasource
                .select_first_sql(schema::CORE_SQL_SELECT_ID_CERT, 1),
        );
        let delete_sql = self.datasource.translate(schema::SQL_DELETE_CERT);
        let insert_rev_sql = self.datasource.translate(schema::SQL_INSERT_CERT_REV);
        let update_rev_sql = self.datasource.translate(schema::SQL_UPDATE_CERT_REV);

        let mut processed: u64 = 0;
        for entry in self.crl.revoked_certificates()? {
            let entry = entry?;
            let sn = serial_hex(&entry.serial);

            if let Some(entry_issuer) = &entry.certificate_issuer {
                if entry_issuer != &self.ca.subject_raw {
                    return Err(ImportError::CrlEntryIssuerMismatch(sn));
                }
            }

            if entry.reason == CrlReason::RemoveFromCrl {
                if is_delta {
                    sqlx::query(&delete_sql)
                        .bind(issuer_id)
                        .bind(&sn)
                        .execute(&mut *conn)
                        .await
                        .map_err(StoreError::from)?;
                    debug!(serial = %sn, "removed entry withdrawn by delta CRL");
                } else {
                    warn!(serial = %sn, "ignoring removeFromCRL entry in a full CRL");
                }
                continue;
            }

            let id = cert_id(conn, &select_id_sql, issuer_id, &sn).await?;
            let lupdate = self.clock.now().timestamp();
            let rt = entry.revocation_date.timestamp();
            let rit = entry.invalidity_date.map(|t| t.timestamp());
            let rr = entry.reason.code() as i64;

            match id {
                None => {
                    max_id += 1;
                    sqlx::query(&insert_rev_sql)
                        .bind(max_id)
                        .bind(issuer_id)
                        .bind(&sn)
                        .bind(1_i64)
                        .bind(rr)
                        .bind(rt)
                        .bind(rit)
                        .bind(lupdate)
                        .execute(&mut *conn)
                        .await
                        .map_err(StoreError::from)?;
                }
                Some(id) => {
                    sqlx::query(&update_rev_sql)
                        .bind(1_i64)
                        .bind(rr)
                        .bind(rt)
                        .bind(rit)
                        .bind(lupdate)
                        .bind(id)
                        .execute(&mut *conn)
                        .await
                        .map_err(StoreError::from)?;
                }
            }
            processed += 1;
        }
        debug!(entries = processed, "processed revoked entries");

        if let Some(certset) = self.crl.extension_value(OID_CRL_CERTSET) {
            self.import_embedded_certs(conn, issuer_id, &mut max_id, &select_id_sql, certset)
                .await
        } else {
            self.import_certs_dir(conn, issuer_id, &mut max_id, &select_id_sql)
                .await
        }
    }

    /// Ingests the proprietary cert-set CRL extension.
    async fn import_embedded_certs(
        &self,
        conn: &mut AnyConnection,
        issuer_id: i64,
        max_id: &mut i64,
        select_id_sql: &str,
        certset: &[u8],
    ) -> Result<(), ImportError> {
        let malformed =
            |what: &str| ImportError::InputMalformed(format!("crlCertset extension: {what}"));

        let (tag, mut content, _) =
            asn1::split_tlv(certset).map_err(|e| malformed(&e.to_string()))?;
        if tag != asn1::TAG_SET {
            return Err(malformed("expected SET"));
        }

        while !content.is_empty() {
            let (tag, entry, rest) =
                asn1::split_tlv(content).map_err(|e| malformed(&e.to_string()))?;
            content = rest;
            if tag != asn1::TAG_SEQUENCE {
                return Err(malformed("expected SEQUENCE entry"));
            }

            let (tag, serial_content, mut entry_rest) =
                asn1::split_tlv(entry).map_err(|e| malformed(&e.to_string()))?;
            if tag != asn1::TAG_INTEGER {
                return Err(malformed("expected serialNumber"));
            }
            let serial = BigUint::from_bytes_be(serial_content);

            let mut cert_raw: Option<&[u8]> = None;
            while !entry_rest.is_empty() {
                let (tag, tagged, rest) =
                    asn1::split_tlv(entry_rest).map_err(|e| malformed(&e.to_string()))?;
                entry_rest = rest;
                match tag {
                    0xa0 => {
                        let (_, _, raw, _) = asn1::split_tlv_raw(tagged)
                            .map_err(|e| malformed(&e.to_string()))?;
                        cert_raw = Some(raw);
                    }
                    // [1] profileName; issuance metadata the status store
                    // does not record
                    0xa1 => {}
                    _ => {}
                }
            }

            let Some(cert_raw) = cert_raw else {
                continue;
            };

            let (_, cert) = X509Certificate::from_der(cert_raw)
                .map_err(|e| malformed(&format!("embedded certificate: {e}")))?;

            if cert.issuer().as_raw() != self.ca.subject_raw.as_slice() {
                warn!(serial = %serial_hex(&serial), "issuer mismatch in crlCertset entry, ignoring it");
                continue;
            }
            if cert.tbs_certificate.serial != serial {
                warn!(serial = %serial_hex(&serial), "serialNumber mismatch in crlCertset entry, ignoring it");
                continue;
            }

            let log_id = format!("(issuer='{}', serial={})", self.ca.subject, serial_hex(&serial));
            self.add_certificate(conn, issuer_id, max_id, select_id_sql, cert_raw, &cert, &log_id)
                .await?;
        }
        Ok(())
    }

    /// Ingests loose certificate material from `certs/`.
    async fn import_certs_dir(
        &self,
        conn: &mut AnyConnection,
        issuer_id: i64,
        max_id: &mut i64,
        select_id_sql: &str,
    ) -> Result<(), ImportError> {
        let certs_dir = self.basedir.join("certs");
        if !certs_dir.is_dir() {
            warn!(dir = %certs_dir.display(), "certs folder does not exist, ignoring it");
            return Ok(());
        }

        let mut paths: Vec<PathBuf> = match fs::read_dir(&certs_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .collect(),
            Err(err) => {
                warn!(dir = %certs_dir.display(), error = %err, "certs folder is not readable, ignoring it");
                return Ok(());
            }
        };
        // sort-stable enumeration keeps runs reproducible across filesystems
        paths.sort();

        for path in paths.iter().filter(|p| has_extension(p, &["der", "crt", "pem"])) {
            let raw = match read_cert_der(path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "could not read certificate, ignoring it");
                    continue;
                }
            };
            let parsed = X509Certificate::from_der(&raw);
            let cert = match &parsed {
                Ok((_, cert)) => cert,
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "could not parse certificate, ignoring it");
                    continue;
                }
            };
            let log_id = format!("(file {})", path.display());
            self.add_certificate(conn, issuer_id, max_id, select_id_sql, &raw, cert, &log_id)
                .await?;
        }

        for path in paths.iter().filter(|p| has_extension(p, &["serials"])) {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "could not read serial numbers, ignoring the file");
                    continue;
                }
            };
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(serial) = BigUint::parse_bytes(line.as_bytes(), 16) else {
                    warn!(file = %path.display(), line, "invalid serial number, ignoring it");
                    continue;
                };
                self.add_certificate_by_serial(conn, issuer_id, max_id, select_id_sql, &serial)
                    .await?;
            }
        }
        Ok(())
    }

    /// Upserts one known certificate with full metadata.
    ///
    /// Admission control: material not issued by the CA (by subject or,
    /// when both sides carry key identifiers, by AKI/SKI) is logged and
    /// skipped so a stray file cannot contaminate another issuer's rows.
    #[allow(clippy::too_many_arguments)]
    async fn add_certificate(
        &self,
        conn: &mut AnyConnection,
        issuer_id: i64,
        max_id: &mut i64,
        select_id_sql: &str,
        cert_raw: &[u8],
        cert: &X509Certificate<'_>,
        log_id: &str,
    ) -> Result<(), ImportError> {
        if cert.issuer().as_raw() != self.ca.subject_raw.as_slice() {
            warn!(cert = log_id, "certificate is not issued by the given CA, ignoring it");
            return Ok(());
        }

        if let Some(ca_ski) = &self.ca.ski {
            match extract_aki(cert) {
                Some(aki) if &aki == ca_ski => {}
                _ => {
                    warn!(cert = log_id, "certificate is not issued by the given CA, ignoring it");
                    return Ok(());
                }
            }
        }

        let b64_hash = self.certhash_algo.base64_hash(cert_raw);
        let sn = serial_hex(&cert.tbs_certificate.serial);
        let nbefore = cert.validity().not_before.timestamp();
        let nafter = cert.validity().not_after.timestamp();

        debug!(cert = log_id, "importing certificate");
        let id = cert_id(conn, select_id_sql, issuer_id, &sn).await?;
        let lupdate = self.clock.now().timestamp();

        match id {
            None => {
                *max_id += 1;
                sqlx::query(&self.datasource.translate(schema::SQL_INSERT_CERT))
                    .bind(*max_id)
                    .bind(issuer_id)
                    .bind(&sn)
                    .bind(0_i64)
                    .bind(None::<i64>)
                    .bind(None::<i64>)
                    .bind(None::<i64>)
                    .bind(lupdate)
                    .bind(nbefore)
                    .bind(nafter)
                    .bind(Some(b64_hash))
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
            }
            Some(id) => {
                sqlx::query(&self.datasource.translate(schema::SQL_UPDATE_CERT))
                    .bind(lupdate)
                    .bind(nbefore)
                    .bind(nafter)
                    .bind(Some(b64_hash))
                    .bind(id)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
            }
        }
        Ok(())
    }

    /// Upserts a serial-only row: the serial is known good, the certificate
    /// itself is not available, so validity bounds are sentinels and the
    /// hash stays null.
    async fn add_certificate_by_serial(
        &self,
        conn: &mut AnyConnection,
        issuer_id: i64,
        max_id: &mut i64,
        select_id_sql: &str,
        serial: &BigUint,
    ) -> Result<(), ImportError> {
        let sn = serial_hex(serial);
        debug!(serial = %sn, "importing certificate by serial number");

        let id = cert_id(conn, select_id_sql, issuer_id, &sn).await?;
        let lupdate = self.clock.now().timestamp();

        match id {
            None => {
                *max_id += 1;
                sqlx::query(&self.datasource.translate(schema::SQL_INSERT_CERT))
                    .bind(*max_id)
                    .bind(issuer_id)
                    .bind(&sn)
                    .bind(0_i64)
                    .bind(None::<i64>)
                    .bind(None::<i64>)
                    .bind(None::<i64>)
                    .bind(lupdate)
                    .bind(0_i64)
                    .bind(i64::MAX)
                    .bind(None::<String>)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
            }
            Some(id) => {
                sqlx::query(&self.datasource.translate(schema::SQL_UPDATE_CERT))
                    .bind(lupdate)
                    .bind(0_i64)
                    .bind(i64::MAX)
                    .bind(None::<String>)
                    .bind(id)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
            }
        }
        Ok(())
    }

    /// Post-full-CRL sweep: drop every row of this issuer the run did not
    /// touch. Delta CRLs never sweep — they only know about changes.
    async fn delete_entries_not_updated_since(
        &self,
        conn: &mut AnyConnection,
        issuer_id: i64,
        since: i64,
    ) -> Result<(), ImportError> {
        let result = sqlx::query(&self.datasource.translate(schema::SQL_DELETE_CERT_NOT_UPDATED))
            .bind(issuer_id)
            .bind(since)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::from)?;
        info!(
            removed = result.rows_affected(),
            "swept entries absent from the full CRL"
        );
        Ok(())
    }
}

/// Looks up the `CERT.ID` of `(issuer_id, sn)`.
async fn cert_id(
    conn: &mut AnyConnection,
    select_id_sql: &str,
    issuer_id: i64,
    sn: &str,
) -> Result<Option<i64>, ImportError> {
    let row = sqlx::query(select_id_sql)
        .bind(issuer_id)
        .bind(sn)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from)?;
    match row {
        None => Ok(None),
        Some(row) => Ok(Some(row.try_get("ID").map_err(StoreError::from)?)),
    }
}

/// Builds the OCSP `CrlID` for this import:
/// `SEQUENCE { [0] IA5String url OPTIONAL, [1] INTEGER crlNumber,
/// [2] GeneralizedTime thisUpdate }`, all tags explicit.
fn build_crl_id(
    basedir: &Path,
    crl_number: &BigUint,
    this_update: DateTime<Utc>,
) -> Result<Vec<u8>, ImportError> {
    let mut content = Vec::new();

    let url_file = basedir.join("crl.url");
    if url_file.exists() {
        let url = fs::read_to_string(&url_file)?;
        let url = url.trim();
        if !url.is_empty() {
            let ia5 = asn1::encode_tlv(0x16, url.as_bytes());
            content.extend(asn1::encode_tlv(0xa0, &ia5));
        }
    }

    let number = asn1::encode_uint_be(&crl_number.to_bytes_be());
    content.extend(asn1::encode_tlv(0xa1, &number));
    content.extend(asn1::encode_tlv(0xa2, &asn1::generalized_time(this_update)));

    Ok(asn1::encode_tlv(asn1::TAG_SEQUENCE, &content))
}

/// Reads a certificate file, transparently unwrapping PEM armor.
fn read_cert_der(path: &Path) -> Result<Vec<u8>, ImportError> {
    let data = fs::read(path)?;
    if data.starts_with(b"-----BEGIN") {
        let (_, pem) = x509_parser::pem::parse_x509_pem(&data).map_err(|e| {
            ImportError::InputMalformed(format!("could not parse PEM {}: {e}", path.display()))
        })?;
        Ok(pem.contents)
    } else {
        Ok(data)
    }
}

/// Parses the optional `REVOCATION` properties file.
fn load_revocation_properties(path: &Path) -> Result<Option<CertRevocationInfo>, ImportError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let props = parse_properties(&content);

    let Some(revocation) = props.get(KEY_CA_REVOCATION_TIME).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let revocation_time = parse_utc_yyyymmddhhmmss(revocation)?;
    let invalidity_time = match props.get(KEY_CA_INVALIDITY_TIME).filter(|v| !v.is_empty()) {
        Some(value) => Some(parse_utc_yyyymmddhhmmss(value)?),
        None => None,
    };

    Ok(Some(CertRevocationInfo {
        reason: CrlReason::Unspecified,
        revocation_time,
        invalidity_time,
    }))
}

/// Java-properties subset: `key=value` or `key:value` per line, `#` and `!`
/// comments; enough for the operator tooling that writes these files.
fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                return None;
            }
            let idx = line.find(['=', ':'])?;
            Some((
                line[..idx].trim().to_string(),
                line[idx + 1..].trim().to_string(),
            ))
        })
        .collect()
}

/// Parses the strict `yyyyMMddhhmmss` UTC stamp used by the properties file.
fn parse_utc_yyyymmddhhmmss(value: &str) -> Result<DateTime<Utc>, ImportError> {
    NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S")
        .map(|dt| dt.and_utc())
        .map_err(|e| ImportError::InputMalformed(format!("invalid UTC timestamp {value:?}: {e}")))
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// RFC 4519 style one-line DN, attributes in encoding order.
fn rfc4519_name(name: &X509Name<'_>) -> String {
    let mut parts = Vec::new();
    for rdn in name.iter() {
        for attr in rdn.iter() {
            let oid = attr.attr_type().to_id_string();
            let key = match oid.as_str() {
                "2.5.4.3" => "CN",
                "2.5.4.6" => "C",
                "2.5.4.7" => "L",
                "2.5.4.8" => "ST",
                "2.5.4.10" => "O",
                "2.5.4.11" => "OU",
                "2.5.4.5" => "serialNumber",
                "0.9.2342.19200300.100.1.25" => "DC",
                "0.9.2342.19200300.100.1.1" => "UID",
                _ => oid.as_str(),
            };
            let value = attr.as_str().unwrap_or("<binary>");
            parts.push(format!("{key}={value}"));
        }
    }
    parts.join(",")
}

fn extract_ski(cert: &X509Certificate<'_>) -> Option<Vec<u8>> {
    cert.extensions().iter().find_map(|ext| match ext.parsed_extension() {
        ParsedExtension::SubjectKeyIdentifier(ki) => Some(ki.0.to_vec()),
        _ => None,
    })
}

fn extract_aki(cert: &X509Certificate<'_>) -> Option<Vec<u8>> {
    cert.extensions().iter().find_map(|ext| match ext.parsed_extension() {
        ParsedExtension::AuthorityKeyIdentifier(aki) => {
            aki.key_identifier.as_ref().map(|ki| ki.0.to_vec())
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn properties_parsing() {
        let props = parse_properties(
            "# a comment\n\
             ! another comment\n\
             \n\
             ca.revocation.time=20240102030405\n\
             ca.invalidity.time: 20240101000000\n\
             trailing.space = value  \n",
        );
        assert_eq!(props.get("ca.revocation.time").unwrap(), "20240102030405");
        assert_eq!(props.get("ca.invalidity.time").unwrap(), "20240101000000");
        assert_eq!(props.get("trailing.space").unwrap(), "value");
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn utc_stamp_parsing() {
        let t = parse_utc_yyyymmddhhmmss("20240102030405").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert!(parse_utc_yyyymmddhhmmss("2024-01-02").is_err());
        assert!(parse_utc_yyyymmddhhmmss("99999999999999").is_err());
    }

    #[test]
    fn crl_id_layout_without_url() {
        let der = build_crl_id(
            Path::new("/nonexistent"),
            &BigUint::from(5u8),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let (tag, mut content, _) = asn1::split_tlv(&der).unwrap();
        assert_eq!(tag, asn1::TAG_SEQUENCE);

        let (tag, number, rest) = asn1::split_tlv(content).unwrap();
        assert_eq!(tag, 0xa1);
        assert_eq!(number, &[0x02, 0x01, 0x05]);
        content = rest;

        let (tag, time, rest) = asn1::split_tlv(content).unwrap();
        assert_eq!(tag, 0xa2);
        assert_eq!(&time[2..], b"20240101000000Z");
        assert!(rest.is_empty());
    }

    #[test]
    fn extension_filter() {
        assert!(has_extension(Path::new("a/b/c.der"), &["der", "crt", "pem"]));
        assert!(has_extension(Path::new("c.PEM"), &["der", "crt", "pem"]));
        assert!(!has_extension(Path::new("c.serials"), &["der", "crt", "pem"]));
        assert!(has_extension(Path::new("c.serials"), &["serials"]));
        assert!(!has_extension(Path::new("noext"), &["der"]));
    }
}
