//! Management descriptor catalog
//!
//! The catalog is the fixed, ordered list of attributes fetched from every
//! host that speaks the management protocol. It is built once at startup
//! and shared read-only between sessions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How a management attribute is addressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descriptor {
    /// Dotted numeric object identifier, e.g. `1.3.6.1.2.1.1.1.0`
    NumericOid { oid: String },
    /// Symbolic object from a named module, plus its instance index
    NamedObject {
        module: String,
        object: String,
        #[serde(default)]
        index: u32,
    },
}

impl Descriptor {
    pub fn oid(oid: &str) -> Self {
        Self::NumericOid {
            oid: oid.to_string(),
        }
    }

    pub fn named(module: &str, object: &str, index: u32) -> Self {
        Self::NamedObject {
            module: module.to_string(),
            object: object.to_string(),
            index,
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NumericOid { oid } => write!(f, "{}", oid),
            Self::NamedObject {
                module,
                object,
                index,
            } => write!(f, "{}::{}.{}", module, object, index),
        }
    }
}

/// A labelled catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Label shown to clients in front of the value
    pub label: String,
    #[serde(flatten)]
    pub descriptor: Descriptor,
}

impl CatalogEntry {
    pub fn new(label: &str, descriptor: Descriptor) -> Self {
        Self {
            label: label.to_string(),
            descriptor,
        }
    }
}

/// Ordered, immutable descriptor catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Arc<[CatalogEntry]>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    /// System description, uptime, contact, name, location and interface count
    pub fn builtin() -> Self {
        Self::new(builtin_entries())
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn builtin_entries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("Descrição do Sistema", Descriptor::oid("1.3.6.1.2.1.1.1.0")),
        CatalogEntry::new("Tempo Ativo", Descriptor::named("SNMPv2-MIB", "sysUpTime", 0)),
        CatalogEntry::new("Contato", Descriptor::named("SNMPv2-MIB", "sysContact", 0)),
        CatalogEntry::new("Nome do Sistema", Descriptor::named("SNMPv2-MIB", "sysName", 0)),
        CatalogEntry::new("Localização", Descriptor::oid("1.3.6.1.2.1.1.6.0")),
        CatalogEntry::new("Interfaces", Descriptor::named("IF-MIB", "ifNumber", 0)),
    ]
}
