//! # k-export
//!
//! Point-in-time database exports through external dump utilities.
//!
//! An [`Exporter`](export::exporter::Exporter) produces one artifact per call
//! and always hands back an [`ExportResult`](export::exporter::ExportResult)
//! carrying the artifact path, its content type and the captured output of the
//! dump utility, failed or not.
//!
//! ## Quick Start
//!
//! ```no_run
//! use k_export::export::exporter::Exporter;
//! use k_export::export::postgres::PostgresExporter;
//!
//! let exporter = PostgresExporter::builder()
//!     .host("127.0.0.1")
//!     .port("5432")
//!     .database("shop")
//!     .username("backup")
//!     .options(vec!["-Fp".to_string()])
//!     .build();
//!
//! let result = exporter.export();
//! match result.error() {
//!     None => println!("exported {:?} ({})", result.path(), result.mime()),
//!     Some(e) => eprintln!("{e}"),
//! }
//! ```

pub mod export;
