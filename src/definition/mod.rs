//! # Definitions
//!
//! A [`Definition`] is the immutable, exported form of a subgraph: the
//! boundary plugs a reference instance exposes, the internal nodes, and the
//! connections between them. It is serialized as JSON.
//!
//! ```text
//! Graph subtree ──export()──▶ Definition ──to_bytes()──▶ JSON bytes
//! JSON bytes ──import()──▶ migrate::upgrade ──▶ Definition (current schema)
//! ```

pub mod export;
pub mod import;
pub mod migrate;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{PlugSpec, Value};
use crate::Result;

pub use export::{export, export_to_file};
pub use import::{import, import_with_issues};

/// Value of the `format` field every definition document carries.
pub const FORMAT_TAG: &str = "refgraph.definition";
/// Schema version written by this crate.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;
/// Oldest schema version the migration chain can upgrade.
pub const MIN_SCHEMA_VERSION: u32 = 1;

/// Transient metadata keys exposing the producer stamp on a loaded instance.
pub const MILESTONE_VERSION_KEY: &str = "producer:milestoneVersion";
pub const MAJOR_VERSION_KEY: &str = "producer:majorVersion";
pub const MINOR_VERSION_KEY: &str = "producer:minorVersion";
pub const PATCH_VERSION_KEY: &str = "producer:patchVersion";

// ============================================================================
// Producer stamp
// ============================================================================

/// Version of the software that exported a definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProducerVersion {
    pub milestone: u32,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProducerVersion {
    pub fn new(milestone: u32, major: u32, minor: u32, patch: u32) -> Self {
        Self { milestone, major, minor, patch }
    }

    /// This crate's own version: semver `x.y.z` maps onto `x.y.z.0`.
    pub fn current() -> Self {
        let part = |s: &str| s.parse().unwrap_or(0);
        Self {
            milestone: part(env!("CARGO_PKG_VERSION_MAJOR")),
            major: part(env!("CARGO_PKG_VERSION_MINOR")),
            minor: part(env!("CARGO_PKG_VERSION_PATCH")),
            patch: 0,
        }
    }

    /// The stamp as `(key, value)` pairs for instance metadata.
    pub fn metadata_entries(&self) -> [(&'static str, Value); 4] {
        [
            (MILESTONE_VERSION_KEY, Value::Int(self.milestone.into())),
            (MAJOR_VERSION_KEY, Value::Int(self.major.into())),
            (MINOR_VERSION_KEY, Value::Int(self.minor.into())),
            (PATCH_VERSION_KEY, Value::Int(self.patch.into())),
        ]
    }
}

impl fmt::Display for ProducerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.milestone, self.major, self.minor, self.patch)
    }
}

// ============================================================================
// Document model
// ============================================================================

/// An internal node of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub class: String,
    #[serde(default)]
    pub plugs: Vec<PlugSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            plugs: Vec::new(),
            children: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_plug(mut self, spec: PlugSpec) -> Self {
        self.plugs.push(spec);
        self
    }

    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// A connection, as dot paths relative to the exported root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub source: String,
    pub destination: String,
}

impl ConnectionSpec {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self { source: source.into(), destination: destination.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub format: String,
    pub schema_version: u32,
    #[serde(default)]
    pub producer: ProducerVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    /// Persistent metadata of the exported root.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Boundary plugs with defaults frozen to their exported values.
    #[serde(default)]
    pub boundary: Vec<PlugSpec>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
}

impl Default for Definition {
    fn default() -> Self {
        Self {
            format: FORMAT_TAG.to_string(),
            schema_version: CURRENT_SCHEMA_VERSION,
            producer: ProducerVersion::current(),
            exported_at: None,
            metadata: BTreeMap::new(),
            boundary: Vec::new(),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }
}

impl Definition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boundary_names(&self) -> Vec<String> {
        self.boundary.iter().map(|p| p.name.clone()).collect()
    }

    /// Internal node by dot path (`inner.n1`).
    pub fn node(&self, path: &str) -> Option<&NodeSpec> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.nodes.iter().find(|n| n.name == first)?;
        for segment in segments {
            current = current.children.iter().find(|n| n.name == segment)?;
        }
        Some(current)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        Ok(())
    }
}
