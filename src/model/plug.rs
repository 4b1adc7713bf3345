//! Plugs: typed ports owned by a node or by a compound plug.

use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{Metadata, NodeId, Value, ValueType};

/// Opaque plug identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlugId(pub u64);

impl std::fmt::Display for PlugId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Owner of a plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlugParent {
    Node(NodeId),
    Plug(PlugId),
}

/// Data-flow direction of a plug relative to its node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    In,
    Out,
}

/// Plug flag set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlugFlags(u8);

impl PlugFlags {
    pub const NONE: PlugFlags = PlugFlags(0);
    /// Created outside a node class schema.
    pub const DYNAMIC: PlugFlags = PlugFlags(1);

    pub fn contains(self, other: PlugFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: PlugFlags, on: bool) {
        if on {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl BitOr for PlugFlags {
    type Output = PlugFlags;
    fn bitor(self, rhs: PlugFlags) -> PlugFlags {
        PlugFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for PlugFlags {
    fn bitor_assign(&mut self, rhs: PlugFlags) {
        self.0 |= rhs.0;
    }
}

/// Body of a plug: either a value-carrying leaf or a compound of child plugs.
#[derive(Debug, Clone, PartialEq)]
pub enum PlugKind {
    Leaf { ty: ValueType, value: Value, default: Value },
    Compound { children: Vec<PlugId> },
}

/// A port in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Plug {
    pub id: PlugId,
    pub name: String,
    pub parent: PlugParent,
    pub direction: Direction,
    pub flags: PlugFlags,
    pub metadata: Metadata,
    /// At most one incoming connection.
    pub input: Option<PlugId>,
    /// Plugs holding this one as their input (fan-out).
    pub outputs: SmallVec<[PlugId; 4]>,
    pub kind: PlugKind,
}

impl Plug {
    pub fn is_compound(&self) -> bool {
        matches!(self.kind, PlugKind::Compound { .. })
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match &self.kind {
            PlugKind::Leaf { ty, .. } => Some(*ty),
            PlugKind::Compound { .. } => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            PlugKind::Leaf { value, .. } => Some(value),
            PlugKind::Compound { .. } => None,
        }
    }

    pub fn default_value(&self) -> Option<&Value> {
        match &self.kind {
            PlugKind::Leaf { default, .. } => Some(default),
            PlugKind::Compound { .. } => None,
        }
    }

    pub fn children(&self) -> &[PlugId] {
        match &self.kind {
            PlugKind::Leaf { .. } => &[],
            PlugKind::Compound { children } => children,
        }
    }
}

// ============================================================================
// PlugSpec: structural descriptor
// ============================================================================

/// Detached description of a plug tree.
///
/// Used to create plugs, to declare node class schemas and as the plug
/// record inside serialized definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlugSpec {
    pub name: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub flags: PlugFlags,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub body: PlugSpecBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlugSpecBody {
    Leaf { ty: ValueType, default: Value, value: Value },
    Compound { children: Vec<PlugSpec> },
}

impl PlugSpec {
    pub fn leaf(name: impl Into<String>, ty: ValueType, default: impl Into<Value>) -> Self {
        let default = ty.coerce(default.into());
        Self {
            name: name.into(),
            direction: Direction::In,
            flags: PlugFlags::default(),
            metadata: BTreeMap::new(),
            body: PlugSpecBody::Leaf { ty, value: default.clone(), default },
        }
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::leaf(name, ValueType::Bool, default)
    }

    pub fn int(name: impl Into<String>, default: i64) -> Self {
        Self::leaf(name, ValueType::Int, default)
    }

    pub fn float(name: impl Into<String>, default: f64) -> Self {
        Self::leaf(name, ValueType::Float, default)
    }

    pub fn string(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::leaf(name, ValueType::String, Value::String(default.into()))
    }

    pub fn compound(name: impl Into<String>, children: Vec<PlugSpec>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::In,
            flags: PlugFlags::default(),
            metadata: BTreeMap::new(),
            body: PlugSpecBody::Compound { children },
        }
    }

    pub fn output(mut self) -> Self {
        self.direction = Direction::Out;
        if let PlugSpecBody::Compound { children } = &mut self.body {
            for child in children {
                *child = child.clone().output();
            }
        }
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.flags |= PlugFlags::DYNAMIC;
        self
    }

    /// Current value differing from the default. No-op on compounds.
    pub fn with_value(mut self, v: impl Into<Value>) -> Self {
        if let PlugSpecBody::Leaf { ty, value, .. } = &mut self.body {
            *value = ty.coerce(v.into());
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
