//! OCSP Responder Wire-Level Building Blocks
//!
//! This crate provides the codec layer shared by the OCSP certificate-status
//! store and the responder front-ends:
//!
//! - Minimal DER primitives for the handful of structures the responder
//!   writes itself ([`asn1`])
//! - The closed catalogue of supported digest algorithms ([`hash`])
//! - A streaming, constant-memory CRL parser with signature verification
//!   ([`crl`])
//! - Precomputed, byte-exact OCSP response extension templates ([`template`])
//!
//! # Example
//!
//! ```no_run
//! use ocsp_proto::crl::CrlStreamParser;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let crl = CrlStreamParser::open("ca.crl")?;
//! println!("issuer CRL number: {:?}", crl.crl_number());
//! for entry in crl.revoked_certificates()? {
//!     let entry = entry?;
//!     println!("revoked: {:x}", entry.serial);
//! }
//! # Ok(())
//! # }
//! ```

pub mod asn1;
pub mod crl;
pub mod hash;
pub mod template;

pub use crl::{CrlError, CrlReason, CrlStreamParser, RevokedCert, RevokedCertIterator};
pub use hash::{HashAlgo, UnknownHashAlgo};
