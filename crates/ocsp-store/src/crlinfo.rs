//! Encoded issuer descriptors
//!
//! Two small records live in string columns of the `ISSUER` table:
//!
//! - [`CrlInfo`] — which CRL the store currently reflects. It drives the
//!   CRL-number monotonicity and delta-base checks on the next import and
//!   carries the `CrlID` structure embedded into OCSP responses. Stored as
//!   base64 of a DER sequence.
//! - [`CertRevocationInfo`] — revocation of the CA itself, as declared by
//!   the operator-provided `REVOCATION` properties file. Stored as a short
//!   comma-separated string: `reason,revocationTime[,invalidityTime]`.

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use ocsp_proto::asn1;
use ocsp_proto::crl::CrlReason;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Failure to encode or decode one of the issuer descriptors.
#[derive(Debug, thiserror::Error)]
#[error("invalid issuer descriptor: {0}")]
pub struct EncodingError(pub String);

impl From<asn1::DerError> for EncodingError {
    fn from(err: asn1::DerError) -> Self {
        EncodingError(err.to_string())
    }
}

/// The CRL state of one issuer.
///
/// `base_crl_number` is set while the store reflects a delta CRL and cleared
/// again by the next full import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlInfo {
    pub crl_number: BigUint,
    pub base_crl_number: Option<BigUint>,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    /// Raw DER of the OCSP `CrlID` structure built at import time.
    pub crl_id: Vec<u8>,
}

impl CrlInfo {
    /// Encodes to the base64 column form.
    pub fn encode(&self) -> String {
        let mut content = asn1::encode_uint_be(&self.crl_number.to_bytes_be());
        if let Some(base) = &self.base_crl_number {
            let base_tlv = asn1::encode_uint_be(&base.to_bytes_be());
            let (_, base_content, _) = asn1::split_tlv(&base_tlv).expect("own encoding");
            content.extend(asn1::encode_tlv(0x80, base_content));
        }
        content.extend(asn1::generalized_time(self.this_update));
        if let Some(next) = self.next_update {
            content.extend(asn1::encode_tlv(0x81, &asn1::generalized_time(next)[2..]));
        }
        content.extend(asn1::encode_tlv(asn1::TAG_OCTET_STRING, &self.crl_id));
        BASE64.encode(asn1::encode_tlv(asn1::TAG_SEQUENCE, &content))
    }

    /// Decodes the base64 column form.
    pub fn decode(encoded: &str) -> Result<Self, EncodingError> {
        let der = BASE64
            .decode(encoded)
            .map_err(|e| EncodingError(format!("bad base64: {e}")))?;
        let (tag, mut content, _) = asn1::split_tlv(&der)?;
        if tag != asn1::TAG_SEQUENCE {
            return Err(EncodingError("expected SEQUENCE".into()));
        }

        let (tag, number, rest) = asn1::split_tlv(content)?;
        if tag != asn1::TAG_INTEGER {
            return Err(EncodingError("expected crlNumber INTEGER".into()));
        }
        let crl_number = BigUint::from_bytes_be(number);
        content = rest;

        let mut base_crl_number = None;
        let (tag, body, rest) = asn1::split_tlv(content)?;
        let this_update = if tag == 0x80 {
            base_crl_number = Some(BigUint::from_bytes_be(body));
            let (tag, time, rest) = asn1::split_tlv(rest)?;
            if tag != asn1::TAG_GENERALIZED_TIME {
                return Err(EncodingError("expected thisUpdate".into()));
            }
            content = rest;
            asn1::parse_generalized_time(time)?
        } else if tag == asn1::TAG_GENERALIZED_TIME {
            content = rest;
            asn1::parse_generalized_time(body)?
        } else {
            return Err(EncodingError("expected thisUpdate".into()));
        };

        let mut next_update = None;
        let (tag, body, rest) = asn1::split_tlv(content)?;
        let crl_id = if tag == 0x81 {
            next_update = Some(asn1::parse_generalized_time(body)?);
            let (tag, id, _) = asn1::split_tlv(rest)?;
            if tag != asn1::TAG_OCTET_STRING {
                return Err(EncodingError("expected crlID OCTET STRING".into()));
            }
            id.to_vec()
        } else if tag == asn1::TAG_OCTET_STRING {
            body.to_vec()
        } else {
            return Err(EncodingError("expected crlID OCTET STRING".into()));
        };

        Ok(CrlInfo {
            crl_number,
            base_crl_number,
            this_update,
            next_update,
            crl_id,
        })
    }
}

/// Revocation of a CA certificate: `reason|revocationTime|invalidityTime?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRevocationInfo {
    pub reason: CrlReason,
    pub revocation_time: DateTime<Utc>,
    pub invalidity_time: Option<DateTime<Utc>>,
}

impl CertRevocationInfo {
    /// Encodes to the column form, times in epoch seconds.
    pub fn encode(&self) -> String {
        match self.invalidity_time {
            Some(invalidity) => format!(
                "{},{},{}",
                self.reason.code(),
                self.revocation_time.timestamp(),
                invalidity.timestamp()
            ),
            None => format!("{},{}", self.reason.code(), self.revocation_time.timestamp()),
        }
    }

    /// Decodes the column form.
    pub fn decode(encoded: &str) -> Result<Self, EncodingError> {
        let mut parts = encoded.split(',');
        let reason = parts
            .next()
            .and_then(|p| p.parse::<u8>().ok())
            .and_then(CrlReason::from_code)
            .ok_or_else(|| EncodingError(format!("bad revocation reason in {encoded:?}")))?;
        let revocation_time = parts
            .next()
            .and_then(|p| p.parse::<i64>().ok())
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .ok_or_else(|| EncodingError(format!("bad revocation time in {encoded:?}")))?;
        let invalidity_time = match parts.next() {
            None => None,
            Some(p) => Some(
                p.parse::<i64>()
                    .ok()
                    .and_then(|s| DateTime::from_timestamp(s, 0))
                    .ok_or_else(|| EncodingError(format!("bad invalidity time in {encoded:?}")))?,
            ),
        };
        Ok(CertRevocationInfo {
            reason,
            revocation_time,
            invalidity_time,
        })
    }
}
