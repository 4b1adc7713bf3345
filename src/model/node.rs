//! Node in the graph ownership tree.

use serde::{Deserialize, Serialize};

use super::{Metadata, PlugId};

/// Opaque node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Class name of plain containers.
pub const BOX_CLASS: &str = "Box";
/// Class name of reference instances.
pub const REFERENCE_CLASS: &str = "Reference";

/// A vertex of the graph. Owns its child nodes and its top-level plugs.
///
/// Children and plugs share one namespace: a name is unique across both.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub class: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub plugs: Vec<PlugId>,
    pub metadata: Metadata,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            class: class.into(),
            parent: None,
            children: Vec::new(),
            plugs: Vec::new(),
            metadata: Metadata::new(),
        }
    }
}
