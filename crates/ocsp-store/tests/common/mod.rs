//! Shared fixtures for the import integration tests
//!
//! Builds a complete test PKI in memory: a CA certificate via rcgen, leaf
//! certificates signed by it, and CRLs assembled DER piece by piece and
//! signed with the CA key. Everything runs against in-process SQLite through
//! the same data-source collaborator production uses with PostgreSQL.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ocsp_proto::asn1;
use ocsp_proto::hash::HashAlgo;
use ocsp_store::clock::Clock;
use ocsp_store::datasource::Datasource;
use ocsp_store::schema;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use sqlx::Row;
use std::fs;
use std::sync::{Arc, Mutex};
use x509_parser::prelude::{FromDer, X509Certificate};

/// AlgorithmIdentifier for ecdsa-with-SHA256 (no parameters).
pub const ECDSA_SHA256_ALG: [u8; 12] = [
    0x30, 0x0a, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02,
];

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// A clock the tests wind forward by hand.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(FixedClock(Mutex::new(start)))
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut guard = self.0.lock().unwrap();
        *guard += chrono::Duration::seconds(secs);
    }

    pub fn timestamp(&self) -> i64 {
        self.0.lock().unwrap().timestamp()
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// A test CA: rcgen certificate plus the matching P-256 key in both rcgen
/// and RustCrypto form, so the same key signs certificates and CRLs.
pub struct TestCa {
    pub cert_der: Vec<u8>,
    pub subject_raw: Vec<u8>,
    pub key: SigningKey,
    pub rcgen_cert: rcgen::Certificate,
    pub rcgen_key: rcgen::KeyPair,
}

pub fn test_ca(cn: &str) -> TestCa {
    let rcgen_key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
    let key = SigningKey::from_pkcs8_der(&rcgen_key.serialize_der()).unwrap();

    let mut params = rcgen::CertificateParams::default();
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, cn);
    dn.push(rcgen::DnType::OrganizationName, "xipki");
    dn.push(rcgen::DnType::CountryName, "DE");
    params.distinguished_name = dn;
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    params.key_usages = vec![
        rcgen::KeyUsagePurpose::DigitalSignature,
        rcgen::KeyUsagePurpose::KeyCertSign,
        rcgen::KeyUsagePurpose::CrlSign,
    ];
    params.not_before = time::OffsetDateTime::from_unix_timestamp(
        utc(2023, 1, 1, 0, 0, 0).timestamp(),
    )
    .unwrap();
    params.not_after = time::OffsetDateTime::from_unix_timestamp(
        utc(2033, 1, 1, 0, 0, 0).timestamp(),
    )
    .unwrap();

    let rcgen_cert = params.self_signed(&rcgen_key).unwrap();
    let cert_der = rcgen_cert.der().to_vec();
    let subject_raw = subject_raw(&cert_der);

    TestCa {
        cert_der,
        subject_raw,
        key,
        rcgen_cert,
        rcgen_key,
    }
}

/// Issues a leaf certificate under `ca` with the given serial, carrying an
/// AuthorityKeyIdentifier so the import engine's admission check has
/// something to verify.
pub fn issue_cert(ca: &TestCa, serial: &[u8], cn: &str) -> Vec<u8> {
    let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
    let mut params = rcgen::CertificateParams::default();
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.serial_number = Some(rcgen::SerialNumber::from(serial.to_vec()));
    params.use_authority_key_identifier_extension = true;
    params.not_before = time::OffsetDateTime::from_unix_timestamp(
        utc(2024, 1, 1, 0, 0, 0).timestamp(),
    )
    .unwrap();
    params.not_after = time::OffsetDateTime::from_unix_timestamp(
        utc(2026, 1, 1, 0, 0, 0).timestamp(),
    )
    .unwrap();

    let cert = params
        .signed_by(&key, &ca.rcgen_cert, &ca.rcgen_key)
        .unwrap();
    cert.der().to_vec()
}

pub fn subject_raw(cert_der: &[u8]) -> Vec<u8> {
    let (_, cert) = X509Certificate::from_der(cert_der).unwrap();
    cert.subject().as_raw().to_vec()
}

/// Encodes one `Extension` TLV.
pub fn extension(oid: &str, critical: bool, inner: &[u8]) -> Vec<u8> {
    let mut content = asn1::encode_oid(oid);
    if critical {
        content.extend([0x01, 0x01, 0xff]);
    }
    content.extend(asn1::encode_tlv(asn1::TAG_OCTET_STRING, inner));
    asn1::encode_tlv(asn1::TAG_SEQUENCE, &content)
}

/// The proprietary cert-set extension: entries of (serial, optional DER
/// certificate).
pub fn crl_certset_extension(entries: &[(Vec<u8>, Option<Vec<u8>>)]) -> Vec<u8> {
    let mut set = Vec::new();
    for (serial, cert) in entries {
        let mut seq = asn1::encode_uint_be(serial);
        if let Some(der) = cert {
            seq.extend(asn1::encode_tlv(0xa0, der));
        }
        set.extend(asn1::encode_tlv(asn1::TAG_SEQUENCE, &seq));
    }
    let set = asn1::encode_tlv(asn1::TAG_SET, &set);
    extension(ocsp_store::import::OID_CRL_CERTSET, false, &set)
}

pub struct Entry {
    pub serial: Vec<u8>,
    pub revoked_at: DateTime<Utc>,
    pub reason: Option<u8>,
    pub invalidity: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(serial: &[u8], revoked_at: DateTime<Utc>) -> Self {
        Entry {
            serial: serial.to_vec(),
            revoked_at,
            reason: None,
            invalidity: None,
        }
    }

    pub fn with_reason(serial: &[u8], revoked_at: DateTime<Utc>, reason: u8) -> Self {
        Entry {
            serial: serial.to_vec(),
            revoked_at,
            reason: Some(reason),
            invalidity: None,
        }
    }
}

pub struct CrlBuilder {
    pub issuer: Vec<u8>,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub crl_number: Option<u64>,
    pub base_crl_number: Option<u64>,
    pub entries: Vec<Entry>,
    pub extra_extensions: Vec<Vec<u8>>,
}

impl CrlBuilder {
    pub fn new(issuer: &[u8], crl_number: u64) -> Self {
        CrlBuilder {
            issuer: issuer.to_vec(),
            this_update: utc(2024, 1, 1, 0, 0, 0),
            next_update: Some(utc(2024, 2, 1, 0, 0, 0)),
            crl_number: Some(crl_number),
            base_crl_number: None,
            entries: Vec::new(),
            extra_extensions: Vec::new(),
        }
    }

    pub fn delta(issuer: &[u8], crl_number: u64, base: u64) -> Self {
        let mut builder = CrlBuilder::new(issuer, crl_number);
        builder.base_crl_number = Some(base);
        builder
    }

    fn entry(&self, e: &Entry) -> Vec<u8> {
        let mut content = asn1::encode_uint_be(&e.serial);
        content.extend(asn1::generalized_time(e.revoked_at));
        let mut exts = Vec::new();
        if let Some(code) = e.reason {
            exts.extend(extension(
                "2.5.29.21",
                false,
                &asn1::encode_tlv(asn1::TAG_ENUMERATED, &[code]),
            ));
        }
        if let Some(inv) = e.invalidity {
            exts.extend(extension("2.5.29.24", false, &asn1::generalized_time(inv)));
        }
        if !exts.is_empty() {
            content.extend(asn1::encode_tlv(asn1::TAG_SEQUENCE, &exts));
        }
        asn1::encode_tlv(asn1::TAG_SEQUENCE, &content)
    }

    pub fn build(&self, key: &SigningKey) -> Vec<u8> {
        let mut tbs = Vec::new();
        tbs.extend(asn1::encode_tlv(asn1::TAG_INTEGER, &[1]));
        tbs.extend(ECDSA_SHA256_ALG);
        tbs.extend(&self.issuer);
        tbs.extend(asn1::generalized_time(self.this_update));
        if let Some(nu) = self.next_update {
            tbs.extend(asn1::generalized_time(nu));
        }
        if !self.entries.is_empty() {
            let mut list = Vec::new();
            for e in &self.entries {
                list.extend(self.entry(e));
            }
            tbs.extend(asn1::encode_tlv(asn1::TAG_SEQUENCE, &list));
        }
        let mut exts = Vec::new();
        if let Some(n) = self.crl_number {
            exts.extend(extension(
                "2.5.29.20",
                false,
                &asn1::encode_uint_be(&n.to_be_bytes()),
            ));
        }
        if let Some(base) = self.base_crl_number {
            exts.extend(extension(
                "2.5.29.27",
                true,
                &asn1::encode_uint_be(&base.to_be_bytes()),
            ));
        }
        for ext in &self.extra_extensions {
            exts.extend(ext);
        }
        if !exts.is_empty() {
            let seq = asn1::encode_tlv(asn1::TAG_SEQUENCE, &exts);
            tbs.extend(asn1::encode_tlv(0xa0, &seq));
        }
        let tbs = asn1::encode_tlv(asn1::TAG_SEQUENCE, &tbs);

        let sig: Signature = key.sign(&tbs);
        let sig_der = sig.to_der();
        let mut bits = vec![0u8];
        bits.extend_from_slice(sig_der.as_bytes());

        let mut outer = tbs;
        outer.extend(ECDSA_SHA256_ALG);
        outer.extend(asn1::encode_tlv(0x03, &bits));
        asn1::encode_tlv(asn1::TAG_SEQUENCE, &outer)
    }
}

/// One prepared import environment: a basedir, a CA, a SQLite-backed
/// datasource with the schema migrated, and a hand-wound clock.
pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub ca: TestCa,
    pub datasource: Datasource,
    pub clock: Arc<FixedClock>,
}

pub async fn setup(cn: &str) -> TestEnv {
    let datasource = Datasource::connect("sqlite::memory:", 1).await.unwrap();
    schema::migrate(&datasource, HashAlgo::Sha256).await.unwrap();

    let ca = test_ca(cn);
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ca.crt"), &ca.cert_der).unwrap();

    TestEnv {
        dir,
        ca,
        datasource,
        clock: FixedClock::new(utc(2024, 6, 1, 12, 0, 0)),
    }
}

impl TestEnv {
    pub fn importer(&self) -> ocsp_store::CrlImporter {
        ocsp_store::CrlImporter::with_clock(
            self.datasource.clone(),
            self.dir.path(),
            self.clock.clone(),
        )
    }

    pub fn write_crl(&self, builder: &CrlBuilder) {
        fs::write(self.dir.path().join("ca.crl"), builder.build(&self.ca.key)).unwrap();
    }

    pub fn write_crl_signed_by(&self, builder: &CrlBuilder, key: &SigningKey) {
        fs::write(self.dir.path().join("ca.crl"), builder.build(key)).unwrap();
    }

    pub fn certs_dir(&self) -> std::path::PathBuf {
        let dir = self.dir.path().join("certs");
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}

/// A fully-materialised `CERT` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRow {
    pub iid: i64,
    pub sn: String,
    pub rev: i64,
    pub rr: Option<i64>,
    pub rt: Option<i64>,
    pub rit: Option<i64>,
    pub lupdate: i64,
    pub nbefore: Option<i64>,
    pub nafter: Option<i64>,
    pub hash: Option<String>,
}

pub async fn cert_rows(datasource: &Datasource) -> Vec<CertRow> {
    let mut conn = datasource.acquire().await.unwrap();
    let rows = sqlx::query(
        "SELECT IID,SN,REV,RR,RT,RIT,LUPDATE,NBEFORE,NAFTER,HASH FROM CERT ORDER BY SN",
    )
    .fetch_all(&mut *conn)
    .await
    .unwrap();
    rows.iter()
        .map(|row| CertRow {
            iid: row.get("IID"),
            sn: row.get("SN"),
            rev: row.get("REV"),
            rr: row.get("RR"),
            rt: row.get("RT"),
            rit: row.get("RIT"),
            lupdate: row.get("LUPDATE"),
            nbefore: row.get("NBEFORE"),
            nafter: row.get("NAFTER"),
            hash: row.get("HASH"),
        })
        .collect()
}

pub async fn cert_row(datasource: &Datasource, sn: &str) -> Option<CertRow> {
    cert_rows(datasource).await.into_iter().find(|r| r.sn == sn)
}

/// The single `ISSUER` row, as (id, subject, rev_info, crl_info).
pub async fn issuer_row(
    datasource: &Datasource,
) -> Option<(i64, String, Option<String>, Option<String>)> {
    let mut conn = datasource.acquire().await.unwrap();
    let row = sqlx::query("SELECT ID,SUBJECT,REV_INFO,CRL_INFO FROM ISSUER")
        .fetch_optional(&mut *conn)
        .await
        .unwrap();
    row.map(|row| {
        (
            row.get("ID"),
            row.get("SUBJECT"),
            row.get("REV_INFO"),
            row.get("CRL_INFO"),
        )
    })
}

/// Writes a `basedir` file relative to the test directory.
pub fn write_file(env: &TestEnv, name: &str, content: impl AsRef<[u8]>) {
    fs::write(env.dir.path().join(name), content.as_ref()).unwrap();
}

/// Convenience for tests comparing certificate hashes.
pub fn sha256_b64(data: &[u8]) -> String {
    HashAlgo::Sha256.base64_hash(data)
}
