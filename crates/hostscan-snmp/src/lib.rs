//! Hostscan SNMP - Management attribute queries
//!
//! A minimal SNMPv2c GET client: BER codec, async UDP transport, and
//! resolution of catalog descriptors to object identifiers.

pub mod ber;
pub mod query;
pub mod transport;

pub use ber::{CodecError, SnmpValue};
pub use query::{
    fetch_management_info, resolve_descriptor, SnmpError, DEFAULT_COMMUNITY, DEFAULT_TIMEOUT_MS,
    SNMP_PORT,
};
pub use transport::SnmpTransport;
