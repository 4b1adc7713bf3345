//! # refgraph: Referenced Subgraphs for Node Graphs
//!
//! A mutable node graph can embed an externally authored subgraph (a
//! [`Definition`]) as a single opaque *reference instance*, and reload
//! that definition later without losing the host's local customizations:
//! connections into and out of the instance, and explicit overrides of its
//! exposed parameters.
//!
//! ## Design Principles
//!
//! 1. **Arena graph**: [`Graph`] owns every node and plug; ids are never reused
//! 2. **Edits are explicit**: a boundary plug only overrides its definition
//!    once a caller edits it, never because values happen to coincide
//! 3. **One transaction per call**: every mutating [`Document`] operation
//!    is a single undo step restoring the full prior state
//! 4. **Legacy quirks are isolated**: old definition formats are upgraded
//!    by a migration chain before reconciliation ever sees them
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use refgraph::{ClassRegistry, DefinitionSource, Document, LoadOptions, Value};
//!
//! # fn example() -> refgraph::Result<()> {
//! let mut doc = Document::new(Arc::new(ClassRegistry::with_builtins()));
//! let r = doc.transact_custom("create", |g| g.add_reference(None, "r"))?;
//!
//! let result = doc.load(r, DefinitionSource::path("asset.grf"), LoadOptions::best_effort())?;
//! for name in &result.boundary_plugs {
//!     println!("exposed: {name}");
//! }
//!
//! let gain = doc.graph().descendant_plug(r, "gain").expect("boundary plug");
//! doc.set_value(gain, Value::Int(100))?;
//! assert!(doc.has_edit(r, gain)?);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod graph;
pub mod registry;
pub mod definition;
pub mod reference;
pub mod tx;
pub mod event;
pub mod config;
pub mod document;

// ============================================================================
// Re-exports: Model (the plain data)
// ============================================================================

pub use model::{
    Direction, Metadata, Node, NodeId, Plug, PlugFlags, PlugId, PlugKind, PlugParent, PlugSpec,
    Value, ValueType,
};

// ============================================================================
// Re-exports: Graph, registry, definitions
// ============================================================================

pub use graph::{Graph, Item, PRIVATE_PREFIX, USER_PLUG};
pub use registry::{ClassRegistry, ClassResolver, NodeSchema};
pub use definition::{ConnectionSpec, Definition, NodeSpec, ProducerVersion, CURRENT_SCHEMA_VERSION};

// ============================================================================
// Re-exports: Reconciliation, transactions, events
// ============================================================================

pub use reference::{
    DefinitionSource, EditKind, EditLedger, EditRecord, LoadIssue, LoadOptions, LoadResult,
    ReferenceState,
};
pub use tx::{TxId, TxKind, UndoStack, UndoStep};
pub use event::{ReferenceLoaded, SubscriptionId};
pub use config::{BoundarySelection, DocumentConfig, ExportOptions};
pub use document::Document;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed definition: {0}")]
    MalformedDefinition(String),

    #[error("Unresolved node class '{class}' for node '{node}'")]
    UnresolvedNodeClass { class: String, node: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Name conflict: '{name}' already exists in {owner}")]
    NameConflict { name: String, owner: String },

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Cycle: connecting {source_plug} into {destination} would make a plug its own input")]
    Cycle { source_plug: String, destination: String },

    #[error("Not a reference instance: {0}")]
    NotAReference(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
