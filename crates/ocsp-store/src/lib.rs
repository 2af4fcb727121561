//! OCSP Certificate-Status Store
//!
//! This crate owns the persistent side of an OCSP responder: the `ISSUER`
//! and `CERT` tables, the data-source collaborator that fronts the database,
//! and the CRL import engine that keeps the tables in sync with what a CA
//! publishes.
//!
//! The responder front-end reads what this crate writes; the wire-level
//! building blocks (CRL parsing, digest catalogue, response templates) live
//! in the `ocsp-proto` crate.
//!
//! # Example
//!
//! ```no_run
//! use ocsp_store::{CrlImporter, Datasource, StoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::from_file("ocsp-store.json")?;
//! let datasource = Datasource::connect(&config.database_url, config.max_connections).await?;
//! ocsp_store::schema::migrate(&datasource, config.certhash_algo()?).await?;
//!
//! let importer = CrlImporter::new(datasource, "/var/lib/ocsp/rootca1");
//! if !importer.import_crl_to_ocsp_db().await {
//!     eprintln!("import failed, see logs");
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod crlinfo;
pub mod datasource;
pub mod import;
pub mod schema;

pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, StoreConfig};
pub use crlinfo::{CertRevocationInfo, CrlInfo, EncodingError};
pub use datasource::{Datasource, Dialect, StoreError};
pub use import::{CrlImporter, ImportError};
