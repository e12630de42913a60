//! Hostscan Core - Core types, request parsing, and report formatting
//!
//! This crate provides the foundational types for the hostscan system:
//! - Target ranges parsed and validated from CIDR requests
//! - Host records produced by discovery and filled in by enrichment
//! - The management descriptor catalog queried on every host
//! - Text formatting of scan reports for the wire protocol

pub mod descriptor;
pub mod host;
pub mod range;
pub mod report;

pub use descriptor::{Catalog, CatalogEntry, Descriptor};
pub use host::{DiscoverySource, Enrichment, HostRecord, LinkAddress, LinkAddressError};
pub use range::{RangeError, TargetRange};
