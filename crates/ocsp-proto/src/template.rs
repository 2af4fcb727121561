//! Precomputed OCSP response extension templates
//!
//! Everything an OCSP single-response needs beyond the status itself has a
//! fixed DER shape: only a digest, a timestamp or a one-byte reason code
//! varies. The templates below are encoded once at first use; the hot path
//! is a copy plus an in-place [`asn1::write_generalized_time`] and, for
//! revoked responses, one reason byte.
//!
//! The byte layouts are part of the public interface: cached responses
//! elsewhere in the responder embed them verbatim.

use crate::asn1;
use crate::crl::CrlReason;
use crate::hash::HashAlgo;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::LazyLock;

/// `id-isismtt-at-certHash` (ISIS-MTT, also known as Common PKI).
pub const OID_CERT_HASH: &str = "1.3.36.8.3.13";
/// `id-ce-invalidityDate`.
pub const OID_INVALIDITY_DATE: &str = "2.5.29.24";
/// `id-pkix-ocsp-archive-cutoff`.
pub const OID_ARCHIVE_CUTOFF: &str = "1.3.6.1.5.5.7.48.1.6";

const REVOKED_INFO_NO_REASON_PREFIX: [u8; 2] = [0xa1, 0x11];
const REVOKED_INFO_WITH_REASON_PREFIX: [u8; 2] = [0xa1, 0x16];
const REASON_PREFIX: [u8; 4] = [0xa0, 0x03, 0x0a, 0x01];

/// Per-algorithm CertHash extension encodings, truncated before the digest.
static CERT_HASH_PREFIXES: LazyLock<HashMap<HashAlgo, Vec<u8>>> = LazyLock::new(|| {
    HashAlgo::ALL
        .iter()
        .map(|&algo| {
            let hlen = algo.length();
            // CertHash ::= SEQUENCE { hashAlgorithm AlgorithmIdentifier,
            //                         certificateHash OCTET STRING }
            // with an explicit NULL parameter on the AlgorithmIdentifier.
            let mut alg_id = algo.oid_der().to_vec();
            alg_id.extend_from_slice(&[0x05, 0x00]);
            let mut cert_hash = asn1::encode_tlv(asn1::TAG_SEQUENCE, &alg_id);
            cert_hash.extend_from_slice(&asn1::encode_tlv(asn1::TAG_OCTET_STRING, &vec![0u8; hlen]));
            let cert_hash = asn1::encode_tlv(asn1::TAG_SEQUENCE, &cert_hash);
            let encoded = encode_extension(OID_CERT_HASH, &cert_hash);
            let prefix = encoded[..encoded.len() - hlen].to_vec();
            (algo, prefix)
        })
        .collect()
});

/// Full invalidityDate extension with a zeroed 17-byte time window.
static EXTN_INVALIDITY_DATE: LazyLock<Vec<u8>> =
    LazyLock::new(|| encode_extension(OID_INVALIDITY_DATE, &[0u8; 17]));

/// Full archiveCutoff extension with a zeroed 17-byte time window.
static EXTN_ARCHIVE_CUTOFF: LazyLock<Vec<u8>> =
    LazyLock::new(|| encode_extension(OID_ARCHIVE_CUTOFF, &[0u8; 17]));

/// DER-encodes a non-critical `Extension { extnID, extnValue OCTET STRING }`.
fn encode_extension(oid: &str, value: &[u8]) -> Vec<u8> {
    let mut content = asn1::encode_oid(oid);
    content.extend_from_slice(&asn1::encode_tlv(asn1::TAG_OCTET_STRING, value));
    asn1::encode_tlv(asn1::TAG_SEQUENCE, &content)
}

/// Returns the encoded CertHash extension for `cert_hash`.
///
/// # Panics
///
/// Panics if `cert_hash` does not have exactly `algo`'s digest length; that
/// is a programmer error, not an input condition.
pub fn cert_hash_extension(algo: HashAlgo, cert_hash: &[u8]) -> Vec<u8> {
    assert_eq!(
        algo.length(),
        cert_hash.len(),
        "hash algorithm and certificate hash do not match"
    );
    let prefix = &CERT_HASH_PREFIXES[&algo];
    let mut out = Vec::with_capacity(prefix.len() + cert_hash.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(cert_hash);
    out
}

/// Returns the encoded invalidityDate extension for `invalidity_date`.
pub fn invalidity_date_extension(invalidity_date: DateTime<Utc>) -> Vec<u8> {
    stamp_time_extension(&EXTN_INVALIDITY_DATE, invalidity_date)
}

/// Returns the encoded archiveCutoff extension for `archive_cutoff`.
pub fn archive_cutoff_extension(archive_cutoff: DateTime<Utc>) -> Vec<u8> {
    stamp_time_extension(&EXTN_ARCHIVE_CUTOFF, archive_cutoff)
}

fn stamp_time_extension(template: &[u8], time: DateTime<Utc>) -> Vec<u8> {
    let mut out = template.to_vec();
    let offset = out.len() - 17;
    asn1::write_generalized_time(time, &mut out, offset);
    out
}

/// Encodes the `revokedInfo` choice of an OCSP CertStatus.
///
/// Without a reason the result is exactly 19 bytes; with one it is exactly
/// 24 bytes and the final byte is the reason code. Callers rely on these
/// widths when sizing response buffers.
pub fn encode_revoked_info(reason: Option<CrlReason>, revocation_time: DateTime<Utc>) -> Vec<u8> {
    match reason {
        None => {
            let mut out = vec![0u8; 19];
            out[..2].copy_from_slice(&REVOKED_INFO_NO_REASON_PREFIX);
            asn1::write_generalized_time(revocation_time, &mut out, 2);
            out
        }
        Some(reason) => {
            let mut out = vec![0u8; 24];
            out[..2].copy_from_slice(&REVOKED_INFO_WITH_REASON_PREFIX);
            asn1::write_generalized_time(revocation_time, &mut out, 2);
            out[19..23].copy_from_slice(&REASON_PREFIX);
            out[23] = reason.code();
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::split_tlv;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn cert_hash_extension_sha256_exact_bytes() {
        let encoded = cert_hash_extension(HashAlgo::Sha256, &[0u8; 32]);
        let mut expected = vec![
            0x30, 0x3c, // Extension
            0x06, 0x05, 0x2b, 0x24, 0x08, 0x03, 0x0d, // id-isismtt-at-certHash
            0x04, 0x33, // extnValue
            0x30, 0x31, // CertHash
            0x30, 0x0d, // AlgorithmIdentifier
            0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, // sha256
            0x05, 0x00, // NULL
            0x04, 0x20, // certificateHash
        ];
        expected.extend_from_slice(&[0u8; 32]);
        assert_eq!(encoded, expected);
    }

    #[test]
    fn cert_hash_extension_parses_back() {
        for algo in HashAlgo::ALL {
            let hash: Vec<u8> = (0..algo.length() as u8).collect();
            let encoded = cert_hash_extension(algo, &hash);

            let (tag, ext, rest) = split_tlv(&encoded).unwrap();
            assert_eq!(tag, 0x30);
            assert!(rest.is_empty());
            let (tag, oid, ext) = split_tlv(ext).unwrap();
            assert_eq!(tag, 0x06);
            assert_eq!(crate::asn1::decode_oid_content(oid).unwrap(), OID_CERT_HASH);
            // no BOOLEAN: criticality is DEFAULT FALSE and must be absent
            let (tag, value, rest) = split_tlv(ext).unwrap();
            assert_eq!(tag, 0x04);
            assert!(rest.is_empty());

            let (tag, cert_hash, _) = split_tlv(value).unwrap();
            assert_eq!(tag, 0x30);
            let (tag, alg_id, after_alg) = split_tlv(cert_hash).unwrap();
            assert_eq!(tag, 0x30);
            let (tag, oid, null_rest) = split_tlv(alg_id).unwrap();
            assert_eq!(tag, 0x06);
            assert_eq!(
                crate::asn1::decode_oid_content(oid).unwrap(),
                algo.oid(),
                "{algo}"
            );
            assert_eq!(null_rest, &[0x05, 0x00]);
            let (tag, digest, _) = split_tlv(after_alg).unwrap();
            assert_eq!(tag, 0x04);
            assert_eq!(digest, &hash[..]);
        }
    }

    #[test]
    #[should_panic(expected = "do not match")]
    fn cert_hash_extension_rejects_wrong_length() {
        cert_hash_extension(HashAlgo::Sha256, &[0u8; 20]);
    }

    #[test]
    fn invalidity_date_extension_layout() {
        let t = utc(2024, 6, 15, 12, 0, 0);
        let encoded = invalidity_date_extension(t);
        assert_eq!(encoded.len(), 26);

        let (tag, ext, _) = split_tlv(&encoded).unwrap();
        assert_eq!(tag, 0x30);
        let (tag, oid, ext) = split_tlv(ext).unwrap();
        assert_eq!(tag, 0x06);
        assert_eq!(
            crate::asn1::decode_oid_content(oid).unwrap(),
            OID_INVALIDITY_DATE
        );
        let (tag, value, _) = split_tlv(ext).unwrap();
        assert_eq!(tag, 0x04);
        assert_eq!(value.len(), 17);
        assert_eq!(&value[2..], b"20240615120000Z");
    }

    #[test]
    fn archive_cutoff_extension_layout() {
        let t = utc(2020, 1, 1, 0, 0, 0);
        let encoded = archive_cutoff_extension(t);
        let (_, ext, _) = split_tlv(&encoded).unwrap();
        let (_, oid, ext) = split_tlv(ext).unwrap();
        assert_eq!(
            crate::asn1::decode_oid_content(oid).unwrap(),
            OID_ARCHIVE_CUTOFF
        );
        let (_, value, _) = split_tlv(ext).unwrap();
        assert_eq!(&value[2..], b"20200101000000Z");
    }

    #[test]
    fn revoked_info_widths() {
        let t = utc(2024, 6, 15, 12, 0, 0);
        assert_eq!(encode_revoked_info(None, t).len(), 19);
        for reason in [
            CrlReason::Unspecified,
            CrlReason::KeyCompromise,
            CrlReason::AaCompromise,
        ] {
            let encoded = encode_revoked_info(Some(reason), t);
            assert_eq!(encoded.len(), 24);
            assert_eq!(encoded[23], reason.code());
        }
    }

    #[test]
    fn revoked_info_key_compromise_exact_bytes() {
        let t = utc(2024, 6, 15, 12, 0, 0);
        let encoded = encode_revoked_info(Some(CrlReason::KeyCompromise), t);
        assert_eq!(
            encoded,
            [
                0xa1, 0x16, 0x18, 0x0f, 0x32, 0x30, 0x32, 0x34, 0x30, 0x36, 0x31, 0x35, 0x31,
                0x32, 0x30, 0x30, 0x30, 0x30, 0x5a, 0xa0, 0x03, 0x0a, 0x01, 0x01
            ]
        );
    }

    #[test]
    fn revoked_info_no_reason_layout() {
        let t = utc(2031, 12, 24, 18, 30, 0);
        let encoded = encode_revoked_info(None, t);
        assert_eq!(&encoded[..2], &[0xa1, 0x11]);
        assert_eq!(encoded[2], 0x18);
        assert_eq!(encoded[3], 15);
        assert_eq!(&encoded[4..], b"20311224183000Z");
    }
}
