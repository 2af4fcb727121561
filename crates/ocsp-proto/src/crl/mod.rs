//! CRL stream parsing (RFC 5280)
//!
//! Certificate Revocation Lists published by busy CAs routinely reach
//! hundreds of megabytes. The parser in this module therefore never
//! materialises the `revokedCertificates` block: one header pass records the
//! file offsets of the TBS region and the revoked-entry list, and entries are
//! yielded lazily by [`RevokedCertIterator`], one at a time, straight off the
//! file.
//!
//! Callers must verify the CRL signature (against the CA's or the delegated
//! CRL signer's public key) *before* consuming the entry iterator; the import
//! engine always does.

mod parser;
mod verify;

pub use parser::{CrlExtension, CrlStreamParser, RevokedCert, RevokedCertIterator};

use crate::asn1::DerError;
use num_bigint::BigUint;

/// Errors produced while parsing or verifying a CRL.
#[derive(Debug, thiserror::Error)]
pub enum CrlError {
    /// I/O failure reading the CRL file.
    #[error("I/O error reading CRL: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid CRL.
    #[error("malformed CRL: {0}")]
    Malformed(String),

    /// Signature or public-key algorithm this crate cannot verify.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl From<DerError> for CrlError {
    fn from(err: DerError) -> Self {
        CrlError::Malformed(err.to_string())
    }
}

/// CRL entry revocation reason (RFC 5280 section 5.3.1).
///
/// The numeric codes are wire values; `RemoveFromCrl` (8) only has meaning
/// inside delta CRLs, where it withdraws a previously published entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrlReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl CrlReason {
    /// The wire code of the reason.
    pub fn code(&self) -> u8 {
        match self {
            CrlReason::Unspecified => 0,
            CrlReason::KeyCompromise => 1,
            CrlReason::CaCompromise => 2,
            CrlReason::AffiliationChanged => 3,
            CrlReason::Superseded => 4,
            CrlReason::CessationOfOperation => 5,
            CrlReason::CertificateHold => 6,
            CrlReason::RemoveFromCrl => 8,
            CrlReason::PrivilegeWithdrawn => 9,
            CrlReason::AaCompromise => 10,
        }
    }

    /// Maps a wire code back to a reason.
    pub fn from_code(code: u8) -> Option<CrlReason> {
        let reason = match code {
            0 => CrlReason::Unspecified,
            1 => CrlReason::KeyCompromise,
            2 => CrlReason::CaCompromise,
            3 => CrlReason::AffiliationChanged,
            4 => CrlReason::Superseded,
            5 => CrlReason::CessationOfOperation,
            6 => CrlReason::CertificateHold,
            8 => CrlReason::RemoveFromCrl,
            9 => CrlReason::PrivilegeWithdrawn,
            10 => CrlReason::AaCompromise,
            _ => return None,
        };
        Some(reason)
    }
}

/// Renders a serial number the way the certificate store keys it: lowercase
/// base-16 of the positive magnitude, no leading zeros, no sign, no prefix.
///
/// Leading zero octets of the DER INTEGER are not preserved; a serial that
/// needs byte-exact round-tripping must be carried as raw DER instead.
pub fn serial_hex(serial: &BigUint) -> String {
    format!("{serial:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_round_trip() {
        for code in [0u8, 1, 2, 3, 4, 5, 6, 8, 9, 10] {
            assert_eq!(CrlReason::from_code(code).unwrap().code(), code);
        }
        assert!(CrlReason::from_code(7).is_none());
        assert!(CrlReason::from_code(11).is_none());
    }

    #[test]
    fn serial_hex_drops_leading_zeros() {
        let serial = BigUint::from_bytes_be(&[0x00, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(serial_hex(&serial), "deadbeef");
        let serial = BigUint::from_bytes_be(&[0x0a, 0xbc]);
        assert_eq!(serial_hex(&serial), "abc");
        assert_eq!(serial_hex(&BigUint::from(0u8)), "0");
    }
}
