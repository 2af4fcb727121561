//! Pull-style CRL parser over a file
//!
//! One construction pass reads the `CertificateList` framing: TBS offsets,
//! version, algorithm, issuer, update times, the *location* of the
//! revoked-certificate block (which is seeked over, never read) and the CRL
//! extensions. Revoked entries are then streamed on demand.

use super::verify::{self, SignatureAlgorithm};
use super::{CrlError, CrlReason};
use crate::asn1;
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use x509_parser::x509::SubjectPublicKeyInfo;

/// CRL extension OIDs this parser understands.
const OID_CRL_NUMBER: &str = "2.5.29.20";
const OID_DELTA_CRL_INDICATOR: &str = "2.5.29.27";
const OID_CRL_REASON: &str = "2.5.29.21";
const OID_INVALIDITY_DATE: &str = "2.5.29.24";
const OID_CERTIFICATE_ISSUER: &str = "2.5.29.29";

/// A raw CRL extension: OID, criticality and the unwrapped extnValue octets.
#[derive(Debug, Clone)]
pub struct CrlExtension {
    pub oid: String,
    pub critical: bool,
    pub value: Vec<u8>,
}

/// One entry of the `revokedCertificates` list.
#[derive(Debug, Clone)]
pub struct RevokedCert {
    /// Serial number as a positive magnitude.
    pub serial: BigUint,
    pub revocation_date: DateTime<Utc>,
    pub invalidity_date: Option<DateTime<Utc>>,
    /// Reason code; `Unspecified` when the entry carries none.
    pub reason: CrlReason,
    /// Raw DER `Name` from the certificateIssuer entry extension, present
    /// only in indirect CRLs.
    pub certificate_issuer: Option<Vec<u8>>,
}

/// Streaming parser over a CRL file.
///
/// Construction parses and retains everything *except* the revoked-entry
/// list, which may be arbitrarily large. [`CrlStreamParser::revoked_certificates`]
/// reopens the file and yields entries lazily; each call restarts from the
/// first entry.
pub struct CrlStreamParser {
    path: PathBuf,
    issuer_raw: Vec<u8>,
    this_update: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
    crl_number: Option<BigUint>,
    base_crl_number: Option<BigUint>,
    extensions: Vec<CrlExtension>,
    signature_algorithm: String,
    signature: Vec<u8>,
    tbs_offset: u64,
    tbs_len: u64,
    revoked_offset: u64,
    revoked_len: usize,
}

impl CrlStreamParser {
    /// Opens and frames a DER-encoded CRL file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CrlError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut rd = DerFile::new(file);

        // CertificateList ::= SEQUENCE { tbsCertList, signatureAlgorithm, signatureValue }
        let (tag, _, _) = rd.read_header()?;
        expect_tag(tag, asn1::TAG_SEQUENCE, "CertificateList")?;

        let tbs_offset = rd.pos;
        let (tag, tbs_content_len, tbs_hdr) = rd.read_header()?;
        expect_tag(tag, asn1::TAG_SEQUENCE, "tbsCertList")?;
        let tbs_len = (tbs_hdr.len() + tbs_content_len) as u64;
        let tbs_end = tbs_offset + tbs_len;

        // version is OPTIONAL; only v2 CRLs can carry extensions
        if rd.peek_tag()? == asn1::TAG_INTEGER {
            let (_, len, _) = rd.read_header()?;
            rd.skip(len as u64)?;
        }

        let sig_alg_tbs = rd.read_raw_tlv(asn1::TAG_SEQUENCE, "signature algorithm")?;
        let issuer_raw = rd.read_raw_tlv(asn1::TAG_SEQUENCE, "issuer")?;
        let this_update = rd.read_time()?;

        let mut next_update = None;
        if rd.pos < tbs_end
            && matches!(rd.peek_tag()?, asn1::TAG_UTC_TIME | asn1::TAG_GENERALIZED_TIME)
        {
            next_update = Some(rd.read_time()?);
        }

        // revokedCertificates: record the span, skip the content
        let mut revoked_offset = 0u64;
        let mut revoked_len = 0usize;
        if rd.pos < tbs_end && rd.peek_tag()? == asn1::TAG_SEQUENCE {
            let (_, len, _) = rd.read_header()?;
            revoked_offset = rd.pos;
            revoked_len = len;
            rd.skip(len as u64)?;
        }

        // crlExtensions [0] EXPLICIT Extensions
        let mut extensions = Vec::new();
        if rd.pos < tbs_end && rd.peek_tag()? == 0xa0 {
            let (_, len, _) = rd.read_header()?;
            let blob = rd.read_vec(len)?;
            extensions = parse_extensions(&blob)?;
        }

        if rd.pos != tbs_end {
            return Err(CrlError::Malformed(
                "trailing data inside tbsCertList".into(),
            ));
        }

        let sig_alg_outer = rd.read_raw_tlv(asn1::TAG_SEQUENCE, "signatureAlgorithm")?;
        if sig_alg_outer != sig_alg_tbs {
            // RFC 5280: the two AlgorithmIdentifier fields MUST match
            return Err(CrlError::Malformed(
                "signature algorithm differs between tbsCertList and CertificateList".into(),
            ));
        }

        let (tag, len, _) = rd.read_header()?;
        expect_tag(tag, 0x03, "signatureValue")?;
        let bits = rd.read_vec(len)?;
        if bits.first() != Some(&0) {
            return Err(CrlError::Malformed(
                "signatureValue with unused bits".into(),
            ));
        }
        let signature = bits[1..].to_vec();

        let (_, alg_content, _) = asn1::split_tlv(&sig_alg_tbs)?;
        let (tag, oid_content, _) = asn1::split_tlv(alg_content)?;
        expect_tag(tag, asn1::TAG_OID, "signature algorithm OID")?;
        let signature_algorithm = asn1::decode_oid_content(oid_content)?;

        let crl_number = extension_biguint(&extensions, OID_CRL_NUMBER)?;
        let base_crl_number = extension_biguint(&extensions, OID_DELTA_CRL_INDICATOR)?;

        Ok(CrlStreamParser {
            path,
            issuer_raw,
            this_update,
            next_update,
            crl_number,
            base_crl_number,
            extensions,
            signature_algorithm,
            signature,
            tbs_offset,
            tbs_len,
            revoked_offset,
            revoked_len,
        })
    }

    /// Raw DER `Name` of the CRL issuer, suitable for byte comparison
    /// against a certificate subject.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    pub fn this_update(&self) -> DateTime<Utc> {
        self.this_update
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.next_update
    }

    /// The `cRLNumber` extension value; a CRL without one cannot be imported.
    pub fn crl_number(&self) -> Option<&BigUint> {
        self.crl_number.as_ref()
    }

    /// The `deltaCRLIndicator` extension value; present iff this is a delta CRL.
    pub fn base_crl_number(&self) -> Option<&BigUint> {
        self.base_crl_number.as_ref()
    }

    pub fn is_delta_crl(&self) -> bool {
        self.base_crl_number.is_some()
    }

    /// All CRL extensions, in file order.
    pub fn crl_extensions(&self) -> &[CrlExtension] {
        &self.extensions
    }

    /// The extnValue octets of the extension with the given OID.
    pub fn extension_value(&self, oid: &str) -> Option<&[u8]> {
        self.extensions
            .iter()
            .find(|e| e.oid == oid)
            .map(|e| e.value.as_slice())
    }

    /// Dotted OID of the signature algorithm.
    pub fn signature_algorithm(&self) -> &str {
        &self.signature_algorithm
    }

    /// Verifies the CRL signature against a subject public key.
    ///
    /// The TBS region is streamed from the file through the digest, so even
    /// a multi-hundred-megabyte CRL is verified in constant memory. Callers
    /// must do this before trusting anything the entry iterator yields.
    pub fn verify_signature(&self, spki: &SubjectPublicKeyInfo<'_>) -> Result<bool, CrlError> {
        let alg = SignatureAlgorithm::from_oid(&self.signature_algorithm)
            .ok_or_else(|| CrlError::UnsupportedAlgorithm(self.signature_algorithm.clone()))?;
        let digest = alg.digest_file_range(&self.path, self.tbs_offset, self.tbs_len as usize)?;
        verify::verify_prehash(spki, alg, &digest, &self.signature)
    }

    /// Opens a fresh single-pass iterator over the revoked entries.
    ///
    /// The iterator owns its own file handle, released on drop. Entries are
    /// decoded one at a time; nothing is buffered beyond the current entry.
    pub fn revoked_certificates(&self) -> Result<RevokedCertIterator, CrlError> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.revoked_offset))?;
        Ok(RevokedCertIterator {
            rd: BufReader::new(file),
            remaining: self.revoked_len,
        })
    }
}

/// Lazy, single-pass iterator over `revokedCertificates`.
pub struct RevokedCertIterator {
    rd: BufReader<File>,
    remaining: usize,
}

impl Iterator for RevokedCertIterator {
    type Item = Result<RevokedCert, CrlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        Some(self.read_entry())
    }
}

impl RevokedCertIterator {
    fn read_entry(&mut self) -> Result<RevokedCert, CrlError> {
        let mut rd = DerFile {
            pos: 0,
            rd: &mut self.rd,
        };
        let (tag, len, hdr) = rd.read_header()?;
        expect_tag(tag, asn1::TAG_SEQUENCE, "revoked certificate entry")?;
        let consumed = hdr.len() + len;
        if consumed > self.remaining {
            return Err(CrlError::Malformed(
                "revoked entry exceeds revokedCertificates block".into(),
            ));
        }
        self.remaining -= consumed;
        let content = rd.read_vec(len)?;
        parse_entry(&content)
    }
}

fn parse_entry(content: &[u8]) -> Result<RevokedCert, CrlError> {
    let (tag, serial_content, rest) = asn1::split_tlv(content)?;
    expect_tag(tag, asn1::TAG_INTEGER, "userCertificate")?;
    let serial = BigUint::from_bytes_be(serial_content);

    let (tag, time_content, rest) = asn1::split_tlv(rest)?;
    let revocation_date = parse_time(tag, time_content)?;

    let mut reason = CrlReason::Unspecified;
    let mut invalidity_date = None;
    let mut certificate_issuer = None;

    if !rest.is_empty() {
        let (tag, ext_content, _) = asn1::split_tlv(rest)?;
        expect_tag(tag, asn1::TAG_SEQUENCE, "crlEntryExtensions")?;
        for ext in parse_extensions_content(ext_content)? {
            match ext.oid.as_str() {
                OID_CRL_REASON => {
                    let (tag, code, _) = asn1::split_tlv(&ext.value)?;
                    expect_tag(tag, asn1::TAG_ENUMERATED, "reasonCode")?;
                    let code = *code.last().unwrap_or(&0);
                    reason = CrlReason::from_code(code).ok_or_else(|| {
                        CrlError::Malformed(format!("invalid revocation reason code {code}"))
                    })?;
                }
                OID_INVALIDITY_DATE => {
                    let (tag, t, _) = asn1::split_tlv(&ext.value)?;
                    invalidity_date = Some(parse_time(tag, t)?);
                }
                OID_CERTIFICATE_ISSUER => {
                    certificate_issuer = parse_certificate_issuer(&ext.value)?;
                }
                _ => {}
            }
        }
    }

    Ok(RevokedCert {
        serial,
        revocation_date,
        invalidity_date,
        reason,
        certificate_issuer,
    })
}

/// Extracts the directoryName alternative out of a GeneralNames value.
fn parse_certificate_issuer(value: &[u8]) -> Result<Option<Vec<u8>>, CrlError> {
    let (tag, mut names, _) = asn1::split_tlv(value)?;
    expect_tag(tag, asn1::TAG_SEQUENCE, "GeneralNames")?;
    while !names.is_empty() {
        let (tag, content, rest) = asn1::split_tlv(names)?;
        if tag == 0xa4 {
            // directoryName [4] is explicitly tagged (Name is a CHOICE)
            let (_, _, name_raw, _) = asn1::split_tlv_raw(content)?;
            return Ok(Some(name_raw.to_vec()));
        }
        names = rest;
    }
    Ok(None)
}

fn parse_time(tag: u8, content: &[u8]) -> Result<DateTime<Utc>, CrlError> {
    match tag {
        asn1::TAG_UTC_TIME => Ok(asn1::parse_utc_time(content)?),
        asn1::TAG_GENERALIZED_TIME => Ok(asn1::parse_generalized_time(content)?),
        _ => Err(CrlError::Malformed(format!(
            "unexpected tag {tag:#04x} for Time"
        ))),
    }
}

/// Parses an `Extensions ::= SEQUENCE OF Extension` TLV.
fn parse_extensions(blob: &[u8]) -> Result<Vec<CrlExtension>, CrlError> {
    let (tag, content, _) = asn1::split_tlv(blob)?;
    expect_tag(tag, asn1::TAG_SEQUENCE, "Extensions")?;
    parse_extensions_content(content)
}

fn parse_extensions_content(mut content: &[u8]) -> Result<Vec<CrlExtension>, CrlError> {
    let mut out = Vec::new();
    while !content.is_empty() {
        let (tag, ext, rest) = asn1::split_tlv(content)?;
        expect_tag(tag, asn1::TAG_SEQUENCE, "Extension")?;
        content = rest;

        let (tag, oid_content, ext_rest) = asn1::split_tlv(ext)?;
        expect_tag(tag, asn1::TAG_OID, "extnID")?;
        let oid = asn1::decode_oid_content(oid_content)?;

        let (tag, body, ext_rest) = asn1::split_tlv(ext_rest)?;
        let (critical, value) = if tag == 0x01 {
            let critical = body.first().copied().unwrap_or(0) != 0;
            let (tag, value, _) = asn1::split_tlv(ext_rest)?;
            expect_tag(tag, asn1::TAG_OCTET_STRING, "extnValue")?;
            (critical, value)
        } else {
            expect_tag(tag, asn1::TAG_OCTET_STRING, "extnValue")?;
            (false, body)
        };

        out.push(CrlExtension {
            oid,
            critical,
            value: value.to_vec(),
        });
    }
    Ok(out)
}

fn extension_biguint(
    extensions: &[CrlExtension],
    oid: &str,
) -> Result<Option<BigUint>, CrlError> {
    let Some(ext) = extensions.iter().find(|e| e.oid == oid) else {
        return Ok(None);
    };
    let (tag, content, _) = asn1::split_tlv(&ext.value)?;
    expect_tag(tag, asn1::TAG_INTEGER, "extension INTEGER")?;
    Ok(Some(BigUint::from_bytes_be(content)))
}

fn expect_tag(found: u8, expected: u8, what: &str) -> Result<(), CrlError> {
    if found == expected {
        Ok(())
    } else {
        Err(CrlError::Malformed(format!(
            "expected {what} (tag {expected:#04x}), found tag {found:#04x}"
        )))
    }
}

/// Cursor-tracking DER reader over a buffered file.
struct DerFile<R> {
    rd: R,
    pos: u64,
}

impl DerFile<BufReader<File>> {
    fn new(file: File) -> Self {
        DerFile {
            rd: BufReader::new(file),
            pos: 0,
        }
    }

    fn peek_tag(&mut self) -> Result<u8, CrlError> {
        let buf = self.rd.fill_buf()?;
        buf.first()
            .copied()
            .ok_or_else(|| CrlError::Malformed("unexpected end of CRL".into()))
    }

    fn skip(&mut self, n: u64) -> Result<(), CrlError> {
        self.rd.seek_relative(n as i64)?;
        self.pos += n;
        Ok(())
    }
}

impl<R: Read> DerFile<R> {
    fn read_u8(&mut self) -> Result<u8, CrlError> {
        let mut b = [0u8; 1];
        self.rd.read_exact(&mut b)?;
        self.pos += 1;
        Ok(b[0])
    }

    fn read_vec(&mut self, n: usize) -> Result<Vec<u8>, CrlError> {
        let mut out = vec![0u8; n];
        self.rd.read_exact(&mut out)?;
        self.pos += n as u64;
        Ok(out)
    }

    /// Reads a header, returning `(tag, content_len, raw_header_bytes)`.
    fn read_header(&mut self) -> Result<(u8, usize, Vec<u8>), CrlError> {
        let tag = self.read_u8()?;
        if tag & 0x1f == 0x1f {
            return Err(CrlError::Malformed("multi-byte tags are not supported".into()));
        }
        let first = self.read_u8()?;
        if first < 0x80 {
            return Ok((tag, first as usize, vec![tag, first]));
        }
        if first == 0x80 {
            return Err(CrlError::Malformed("indefinite length is not DER".into()));
        }
        let n = (first & 0x7f) as usize;
        if n > 8 {
            return Err(CrlError::Malformed("unsupported length-of-length".into()));
        }
        let mut header = vec![tag, first];
        let mut len: usize = 0;
        for _ in 0..n {
            let b = self.read_u8()?;
            header.push(b);
            len = len
                .checked_mul(256)
                .and_then(|l| l.checked_add(b as usize))
                .ok_or_else(|| CrlError::Malformed("length overflow".into()))?;
        }
        Ok((tag, len, header))
    }

    /// Reads one full TLV of the expected tag, returning its raw bytes.
    fn read_raw_tlv(&mut self, expected: u8, what: &str) -> Result<Vec<u8>, CrlError> {
        let (tag, len, mut header) = self.read_header()?;
        expect_tag(tag, expected, what)?;
        let content = self.read_vec(len)?;
        header.extend_from_slice(&content);
        Ok(header)
    }

    fn read_time(&mut self) -> Result<DateTime<Utc>, CrlError> {
        let (tag, len, _) = self.read_header()?;
        let content = self.read_vec(len)?;
        parse_time(tag, &content)
    }
}
