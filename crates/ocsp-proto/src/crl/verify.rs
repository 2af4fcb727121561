//! CRL signature verification over prehashed digests
//!
//! Verification is split from parsing so the TBS region can be streamed
//! through the digest: the RSA and ECDSA backends here all verify against
//! the finished digest rather than the message, which keeps memory flat no
//! matter how large the CRL is.

use super::CrlError;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use rsa::pkcs1::DecodeRsaPublicKey as _;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;
use x509_parser::x509::SubjectPublicKeyInfo;

const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_SECP256R1: &str = "1.2.840.10045.3.1.7";
const OID_SECP384R1: &str = "1.3.132.0.34";

/// Signature algorithms accepted on CRLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignatureAlgorithm {
    RsaSha1,
    RsaSha256,
    RsaSha384,
    RsaSha512,
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
}

impl SignatureAlgorithm {
    pub(crate) fn from_oid(oid: &str) -> Option<Self> {
        let alg = match oid {
            "1.2.840.113549.1.1.5" => SignatureAlgorithm::RsaSha1,
            "1.2.840.113549.1.1.11" => SignatureAlgorithm::RsaSha256,
            "1.2.840.113549.1.1.12" => SignatureAlgorithm::RsaSha384,
            "1.2.840.113549.1.1.13" => SignatureAlgorithm::RsaSha512,
            "1.2.840.10045.4.3.2" => SignatureAlgorithm::EcdsaSha256,
            "1.2.840.10045.4.3.3" => SignatureAlgorithm::EcdsaSha384,
            "1.2.840.10045.4.3.4" => SignatureAlgorithm::EcdsaSha512,
            _ => return None,
        };
        Some(alg)
    }

    /// Digests `len` bytes of `path` starting at `offset` with this
    /// algorithm's message digest, in fixed-size chunks.
    pub(crate) fn digest_file_range(
        &self,
        path: &Path,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, CrlError> {
        match self {
            SignatureAlgorithm::RsaSha1 => hash_range::<Sha1>(path, offset, len),
            SignatureAlgorithm::RsaSha256 | SignatureAlgorithm::EcdsaSha256 => {
                hash_range::<Sha256>(path, offset, len)
            }
            SignatureAlgorithm::RsaSha384 | SignatureAlgorithm::EcdsaSha384 => {
                hash_range::<Sha384>(path, offset, len)
            }
            SignatureAlgorithm::RsaSha512 | SignatureAlgorithm::EcdsaSha512 => {
                hash_range::<Sha512>(path, offset, len)
            }
        }
    }
}

fn hash_range<D: Digest>(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, CrlError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            return Err(CrlError::Malformed("CRL truncated inside TBS".into()));
        }
        hasher.update(&buf[..n]);
        remaining -= n;
    }
    Ok(hasher.finalize().to_vec())
}

/// Verifies `signature` over the prehashed `digest` with the key in `spki`.
///
/// Returns `Ok(false)` on a signature that simply does not check out;
/// structural problems (key/algorithm mismatch, undecodable key) are errors.
pub(crate) fn verify_prehash(
    spki: &SubjectPublicKeyInfo<'_>,
    alg: SignatureAlgorithm,
    digest: &[u8],
    signature: &[u8],
) -> Result<bool, CrlError> {
    let key_alg = spki.algorithm.algorithm.to_id_string();
    let key_bytes: &[u8] = &spki.subject_public_key.data;

    match alg {
        SignatureAlgorithm::RsaSha1
        | SignatureAlgorithm::RsaSha256
        | SignatureAlgorithm::RsaSha384
        | SignatureAlgorithm::RsaSha512 => {
            if key_alg != OID_RSA_ENCRYPTION {
                return Err(CrlError::Malformed(format!(
                    "RSA signature but public key algorithm is {key_alg}"
                )));
            }
            let key = RsaPublicKey::from_pkcs1_der(key_bytes)
                .map_err(|e| CrlError::Malformed(format!("invalid RSA public key: {e}")))?;
            let scheme = match alg {
                SignatureAlgorithm::RsaSha1 => Pkcs1v15Sign::new::<Sha1>(),
                SignatureAlgorithm::RsaSha256 => Pkcs1v15Sign::new::<Sha256>(),
                SignatureAlgorithm::RsaSha384 => Pkcs1v15Sign::new::<Sha384>(),
                _ => Pkcs1v15Sign::new::<Sha512>(),
            };
            let ok = key.verify(scheme, digest, signature).is_ok();
            if !ok {
                debug!("RSA signature verification failed");
            }
            Ok(ok)
        }
        SignatureAlgorithm::EcdsaSha256
        | SignatureAlgorithm::EcdsaSha384
        | SignatureAlgorithm::EcdsaSha512 => {
            if key_alg != OID_EC_PUBLIC_KEY {
                return Err(CrlError::Malformed(format!(
                    "ECDSA signature but public key algorithm is {key_alg}"
                )));
            }
            // namedCurve parameters: an OID; decode its content octets
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| crate::asn1::decode_oid_content(&p.data).ok())
                .ok_or_else(|| CrlError::Malformed("missing EC curve parameters".into()))?;
            match curve.as_str() {
                OID_SECP256R1 => {
                    let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes)
                        .map_err(|e| CrlError::Malformed(format!("invalid P-256 key: {e}")))?;
                    let sig = match p256::ecdsa::Signature::from_der(signature) {
                        Ok(sig) => sig,
                        Err(_) => return Ok(false),
                    };
                    Ok(key.verify_prehash(digest, &sig).is_ok())
                }
                OID_SECP384R1 => {
                    let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes)
                        .map_err(|e| CrlError::Malformed(format!("invalid P-384 key: {e}")))?;
                    let sig = match p384::ecdsa::Signature::from_der(signature) {
                        Ok(sig) => sig,
                        Err(_) => return Ok(false),
                    };
                    Ok(key.verify_prehash(digest, &sig).is_ok())
                }
                other => Err(CrlError::UnsupportedAlgorithm(format!(
                    "EC curve {other}"
                ))),
            }
        }
    }
}
