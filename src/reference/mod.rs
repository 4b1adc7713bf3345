//! # Reference Instances
//!
//! Loading a [`Definition`](crate::Definition) into a reference instance and
//! reloading it later without losing the host's customizations.
//!
//! The engine itself (`load`) only mutates the graph it is handed; the
//! [`Document`](crate::Document) wraps every call in a transaction, so a
//! fatal error leaves the instance exactly as it was.

pub mod ledger;
pub(crate) mod load;

use std::path::PathBuf;

use crate::Result;

pub use ledger::{EditKind, EditLedger, EditRecord, ReferenceState};

// ============================================================================
// Inputs
// ============================================================================

/// Where definition bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionSource {
    Path(PathBuf),
    /// Bytes already in memory, e.g. fetched by the host ahead of time.
    Bytes { identity: String, bytes: Vec<u8> },
}

impl DefinitionSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        DefinitionSource::Path(path.into())
    }

    pub fn bytes(identity: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        DefinitionSource::Bytes { identity: identity.into(), bytes: bytes.into() }
    }

    /// The file reference stored on the instance after a successful load.
    pub fn identity(&self) -> String {
        match self {
            DefinitionSource::Path(p) => p.display().to_string(),
            DefinitionSource::Bytes { identity, .. } => identity.clone(),
        }
    }

    pub(crate) fn read(&self) -> Result<Vec<u8>> {
        match self {
            DefinitionSource::Path(p) => Ok(std::fs::read(p)?),
            DefinitionSource::Bytes { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Skip node subtrees whose class cannot be resolved instead of aborting.
    pub continue_on_error: bool,
}

impl LoadOptions {
    pub fn strict() -> Self {
        Self { continue_on_error: false }
    }

    pub fn best_effort() -> Self {
        Self { continue_on_error: true }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::best_effort()
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Recoverable problem met while loading; collected, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadIssue {
    #[error("Unresolved node class '{class}' for node '{node}'; subtree skipped")]
    UnresolvedNodeClass { class: String, node: String },

    #[error("Edit on '{plug}' dropped: cannot apply {old} to a {new} plug")]
    IncompatibleEditType { plug: String, old: String, new: String },

    #[error("Legacy value for '{plug}' ignored: no such plug")]
    BoundaryPlugMissingOnLegacyDefinition { plug: String },

    #[error("Connection {source_plug} -> {destination} not made: {reason}")]
    DanglingConnection { source_plug: String, destination: String, reason: String },

    #[error("Plug '{plug}' on '{node}' does not match class '{class}'")]
    SchemaPlugMismatch { node: String, plug: String, class: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    /// Boundary plug names after the load, in definition order.
    pub boundary_plugs: Vec<String>,
    pub file_name: String,
    /// True for every committed load; warnings do not clear it.
    pub success: bool,
    pub warnings: Vec<LoadIssue>,
}

impl LoadResult {
    /// Definition paths of node subtrees that were skipped.
    pub fn skipped_nodes(&self) -> Vec<&str> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                LoadIssue::UnresolvedNodeClass { node, .. } => Some(node.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
