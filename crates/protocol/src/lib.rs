//! Wire protocol for the Shadow Clone stream service.
//!
//! Holds the heartbeat sentinels, the report-ready control prefix, HTTP
//! endpoint paths, inbound frame classification and outbound payload
//! encoding. Nothing in this crate performs I/O.

pub mod constants;
pub mod frames;
pub mod payload;
pub mod report;

pub use frames::InboundFrame;
pub use payload::{PayloadError, ScanFieldKind, encode_payload, mismatched_scan_fields};
pub use report::report_filename;
