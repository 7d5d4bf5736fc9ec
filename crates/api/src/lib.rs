//! HTTP client for the Shadow Clone server.
//!
//! Covers the one-shot calls made around the stream: exchanging a bearer
//! credential for a session token, fetching a generated report, and the
//! report listing, bulk download and wake-up endpoints.

pub mod client;
pub mod types;

pub use client::{ApiError, Client};
pub use types::{Credential, ReportEntry, SessionToken};
