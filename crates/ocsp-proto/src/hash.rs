//! Digest algorithm catalogue
//!
//! The responder deals with a closed set of digest algorithms: SHA-1 (issuer
//! fingerprints), the SHA-2 family and the SHA-3 family (certificate hashes
//! and `CertHash` extensions). Each variant knows its OID, its output length
//! and how to produce a base64 digest in one shot. The cert-hash algorithm is
//! selected by configuration and persisted in the `DBSCHEMA` table, so the
//! enum also round-trips through its textual name.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512};
use std::fmt;

/// A supported digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgo {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

/// Error returned when a digest algorithm name is not in the catalogue.
#[derive(Debug, thiserror::Error)]
#[error("unsupported hash algorithm: {0}")]
pub struct UnknownHashAlgo(pub String);

impl HashAlgo {
    /// Every supported variant, in catalogue order.
    pub const ALL: [HashAlgo; 9] = [
        HashAlgo::Sha1,
        HashAlgo::Sha224,
        HashAlgo::Sha256,
        HashAlgo::Sha384,
        HashAlgo::Sha512,
        HashAlgo::Sha3_224,
        HashAlgo::Sha3_256,
        HashAlgo::Sha3_384,
        HashAlgo::Sha3_512,
    ];

    /// Dotted object identifier of the algorithm.
    pub fn oid(&self) -> &'static str {
        match self {
            HashAlgo::Sha1 => "1.3.14.3.2.26",
            HashAlgo::Sha224 => "2.16.840.1.101.3.4.2.4",
            HashAlgo::Sha256 => "2.16.840.1.101.3.4.2.1",
            HashAlgo::Sha384 => "2.16.840.1.101.3.4.2.2",
            HashAlgo::Sha512 => "2.16.840.1.101.3.4.2.3",
            HashAlgo::Sha3_224 => "2.16.840.1.101.3.4.2.7",
            HashAlgo::Sha3_256 => "2.16.840.1.101.3.4.2.8",
            HashAlgo::Sha3_384 => "2.16.840.1.101.3.4.2.9",
            HashAlgo::Sha3_512 => "2.16.840.1.101.3.4.2.10",
        }
    }

    /// DER encoding of the OID, header included.
    pub fn oid_der(&self) -> &'static [u8] {
        match self {
            HashAlgo::Sha1 => &[0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a],
            HashAlgo::Sha224 => &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x04],
            HashAlgo::Sha256 => &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
            HashAlgo::Sha384 => &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02],
            HashAlgo::Sha512 => &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03],
            HashAlgo::Sha3_224 => &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x07],
            HashAlgo::Sha3_256 => &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x08],
            HashAlgo::Sha3_384 => &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x09],
            HashAlgo::Sha3_512 => &[0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x0a],
        }
    }

    /// Digest output length in bytes.
    pub fn length(&self) -> usize {
        match self {
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha224 | HashAlgo::Sha3_224 => 28,
            HashAlgo::Sha256 | HashAlgo::Sha3_256 => 32,
            HashAlgo::Sha384 | HashAlgo::Sha3_384 => 48,
            HashAlgo::Sha512 | HashAlgo::Sha3_512 => 64,
        }
    }

    /// One-shot digest of `data`.
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgo::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgo::Sha224 => Sha224::digest(data).to_vec(),
            HashAlgo::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgo::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgo::Sha512 => Sha512::digest(data).to_vec(),
            HashAlgo::Sha3_224 => Sha3_224::digest(data).to_vec(),
            HashAlgo::Sha3_256 => Sha3_256::digest(data).to_vec(),
            HashAlgo::Sha3_384 => Sha3_384::digest(data).to_vec(),
            HashAlgo::Sha3_512 => Sha3_512::digest(data).to_vec(),
        }
    }

    /// One-shot digest of `data`, rendered as standard base64 with padding.
    pub fn base64_hash(&self, data: &[u8]) -> String {
        BASE64.encode(self.hash(data))
    }

    /// Looks an algorithm up by name.
    ///
    /// Both the compact (`SHA256`) and the hyphenated (`SHA-256`) spellings
    /// are accepted, case-insensitively.
    pub fn from_name(name: &str) -> Result<HashAlgo, UnknownHashAlgo> {
        let normalized: String = name
            .to_ascii_uppercase()
            .chars()
            .filter(|c| *c != '-')
            .collect();
        let algo = match normalized.as_str() {
            "SHA1" => HashAlgo::Sha1,
            "SHA224" => HashAlgo::Sha224,
            "SHA256" => HashAlgo::Sha256,
            "SHA384" => HashAlgo::Sha384,
            "SHA512" => HashAlgo::Sha512,
            "SHA3224" => HashAlgo::Sha3_224,
            "SHA3256" => HashAlgo::Sha3_256,
            "SHA3384" => HashAlgo::Sha3_384,
            "SHA3512" => HashAlgo::Sha3_512,
            _ => return Err(UnknownHashAlgo(name.to_string())),
        };
        Ok(algo)
    }

    /// Looks an algorithm up by dotted OID.
    pub fn from_oid(oid: &str) -> Option<HashAlgo> {
        HashAlgo::ALL.iter().copied().find(|h| h.oid() == oid)
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlgo::Sha1 => "SHA1",
            HashAlgo::Sha224 => "SHA224",
            HashAlgo::Sha256 => "SHA256",
            HashAlgo::Sha384 => "SHA384",
            HashAlgo::Sha512 => "SHA512",
            HashAlgo::Sha3_224 => "SHA3-224",
            HashAlgo::Sha3_256 => "SHA3-256",
            HashAlgo::Sha3_384 => "SHA3-384",
            HashAlgo::Sha3_512 => "SHA3-512",
        };
        f.write_str(name)
    }
}
