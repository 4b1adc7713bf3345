//! # Arena Graph
//!
//! The single owner of every node and plug. Ownership is a tree: nodes own
//! child nodes and top-level plugs, compound plugs own child plugs.
//! Connections are directed single-input / multi-output links between plugs.
//!
//! ## Contract
//!
//! - Names are unique within a node's combined child-and-plug namespace,
//!   and within a compound plug's children.
//! - Removing a node or plug clears the input of every plug downstream of
//!   it. Rewiring is opt-in: see [`Graph::delete_nodes`].
//! - Ids are allocated monotonically and never handed out twice.
//!
//! Caller-facing writes (`set_value`, `set_input`, `set_to_default`) note an
//! edit in the owning reference instance's ledger. Engine-internal writes go
//! through the crate-private `write_*` / `connect` twins, which never do.

mod connect;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::model::*;
use crate::reference::{EditKind, ReferenceState};
use crate::registry::NodeSchema;
use crate::{Error, Result};

/// Name of the permanent user namespace plug on reference instances.
pub const USER_PLUG: &str = "user";
/// Plugs whose top-level name starts with this prefix are host-private.
pub const PRIVATE_PREFIX: &str = "__";

/// Names a reference instance keeps for the host: the user namespace and
/// anything host-private.
pub fn is_reserved_name(name: &str) -> bool {
    name == USER_PLUG || name.starts_with(PRIVATE_PREFIX)
}

/// Anything addressable in the ownership tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    Node(NodeId),
    Plug(PlugId),
}

impl From<PlugParent> for Item {
    fn from(p: PlugParent) -> Self {
        match p {
            PlugParent::Node(n) => Item::Node(n),
            PlugParent::Plug(p) => Item::Plug(p),
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    plugs: HashMap<PlugId, Plug>,
    /// Parentless nodes, in creation order.
    roots: Vec<NodeId>,
    references: HashMap<NodeId, ReferenceState>,
    next_id: u64,
}

/// Structural equality: the id allocator position is not part of a graph's state.
impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.plugs == other.plugs
            && self.roots == other.roots
            && self.references == other.references
    }
}

impl Graph {
    pub fn new() -> Self {
        Self { next_id: 1, ..Self::default() }
    }

    fn alloc(&mut self) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    /// Adopt `other` wholesale while keeping the id allocator monotonic.
    pub(crate) fn restore(&mut self, other: Graph) {
        let next_id = self.next_id.max(other.next_id);
        *self = other;
        self.next_id = next_id;
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn plug(&self, id: PlugId) -> Option<&Plug> {
        self.plugs.get(&id)
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }

    pub(crate) fn plug_ref(&self, id: PlugId) -> Result<&Plug> {
        self.plugs.get(&id).ok_or_else(|| Error::NotFound(format!("Plug {id}")))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }

    pub(crate) fn plug_mut(&mut self, id: PlugId) -> Result<&mut Plug> {
        self.plugs.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Plug {id}")))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn contains_plug(&self, id: PlugId) -> bool {
        self.plugs.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn plug_count(&self) -> usize {
        self.plugs.len()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Child node by name.
    pub fn child(&self, node: NodeId, name: &str) -> Option<NodeId> {
        let n = self.nodes.get(&node)?;
        n.children.iter().copied().find(|c| self.nodes[c].name == name)
    }

    /// Root node by name.
    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots.iter().copied().find(|r| self.nodes[r].name == name)
    }

    /// Direct plug child of a node or compound plug.
    pub fn plug_named(&self, owner: PlugParent, name: &str) -> Option<PlugId> {
        let ids: &[PlugId] = match owner {
            PlugParent::Node(n) => &self.nodes.get(&n)?.plugs,
            PlugParent::Plug(p) => self.plugs.get(&p)?.children(),
        };
        ids.iter().copied().find(|p| self.plugs[p].name == name)
    }

    /// Resolve a dot-separated path below `node` (e.g. `n1.op1`, `user.p`).
    pub fn descendant(&self, node: NodeId, path: &str) -> Option<Item> {
        let mut current = Item::Node(node);
        for segment in path.split('.') {
            current = match current {
                Item::Node(n) => match self.child(n, segment) {
                    Some(c) => Item::Node(c),
                    None => Item::Plug(self.plug_named(PlugParent::Node(n), segment)?),
                },
                Item::Plug(p) => Item::Plug(self.plug_named(PlugParent::Plug(p), segment)?),
            };
        }
        Some(current)
    }

    pub fn descendant_plug(&self, node: NodeId, path: &str) -> Option<PlugId> {
        match self.descendant(node, path)? {
            Item::Plug(p) => Some(p),
            Item::Node(_) => None,
        }
    }

    pub fn descendant_node(&self, node: NodeId, path: &str) -> Option<NodeId> {
        match self.descendant(node, path)? {
            Item::Node(n) => Some(n),
            Item::Plug(_) => None,
        }
    }

    /// Node owning `plug`, looking through compound parents.
    pub fn owning_node(&self, plug: PlugId) -> Option<NodeId> {
        let mut current = plug;
        loop {
            match self.plugs.get(&current)?.parent {
                PlugParent::Node(n) => return Some(n),
                PlugParent::Plug(p) => current = p,
            }
        }
    }

    /// Outermost compound ancestor of `plug` (the plug itself if top-level).
    pub fn top_level_plug(&self, plug: PlugId) -> Option<PlugId> {
        let mut current = plug;
        loop {
            match self.plugs.get(&current)?.parent {
                PlugParent::Node(_) => return Some(current),
                PlugParent::Plug(p) => current = p,
            }
        }
    }

    /// True if `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.nodes.get(&n).and_then(|x| x.parent);
        }
        false
    }

    /// True if `plug` lives anywhere inside the subtree rooted at `node`.
    pub fn node_contains_plug(&self, node: NodeId, plug: PlugId) -> bool {
        self.owning_node(plug).is_some_and(|owner| self.is_ancestor_or_self(node, owner))
    }

    /// `plug` and all its descendants, pre-order.
    pub fn plug_tree(&self, plug: PlugId) -> Vec<PlugId> {
        let mut out = Vec::new();
        let mut stack = vec![plug];
        while let Some(p) = stack.pop() {
            if let Some(data) = self.plugs.get(&p) {
                out.push(p);
                stack.extend(data.children().iter().rev().copied());
            }
        }
        out
    }

    /// `node` and all descendant nodes, pre-order.
    pub fn node_tree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if let Some(data) = self.nodes.get(&n) {
                out.push(n);
                stack.extend(data.children.iter().rev().copied());
            }
        }
        out
    }

    /// Every plug owned (directly or through compounds) by nodes in the
    /// subtree rooted at `node`.
    pub fn subtree_plugs(&self, node: NodeId) -> Vec<PlugId> {
        self.node_tree(node)
            .into_iter()
            .flat_map(|n| self.nodes[&n].plugs.clone())
            .flat_map(|p| self.plug_tree(p))
            .collect()
    }

    /// Dot path of `plug` relative to `ancestor`, if `plug` lives below it.
    pub fn relative_path(&self, ancestor: NodeId, plug: PlugId) -> Option<String> {
        let mut segments = Vec::new();
        let mut item = Item::Plug(plug);
        loop {
            match item {
                Item::Plug(p) => {
                    let data = self.plugs.get(&p)?;
                    segments.push(data.name.as_str());
                    item = data.parent.into();
                }
                Item::Node(n) if n == ancestor => break,
                Item::Node(n) => {
                    let data = self.nodes.get(&n)?;
                    segments.push(data.name.as_str());
                    item = Item::Node(data.parent?);
                }
            }
        }
        segments.reverse();
        Some(segments.join("."))
    }

    /// Absolute dot path of a plug, starting at its root node.
    pub fn plug_path(&self, plug: PlugId) -> String {
        let mut segments = Vec::new();
        let mut item = Some(Item::Plug(plug));
        while let Some(current) = item {
            item = match current {
                Item::Plug(p) => self.plugs.get(&p).map(|d| {
                    segments.push(d.name.clone());
                    d.parent.into()
                }),
                Item::Node(n) => self.nodes.get(&n).and_then(|d| {
                    segments.push(d.name.clone());
                    d.parent.map(Item::Node)
                }),
            };
        }
        segments.reverse();
        segments.join(".")
    }

    pub fn node_path(&self, node: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            match self.nodes.get(&n) {
                Some(d) => {
                    segments.push(d.name.clone());
                    current = d.parent;
                }
                None => break,
            }
        }
        segments.reverse();
        segments.join(".")
    }

    // ========================================================================
    // Naming
    // ========================================================================

    fn name_taken(&self, owner: Option<PlugParent>, name: &str) -> bool {
        match owner {
            None => self.root(name).is_some(),
            Some(PlugParent::Node(n)) => {
                self.child(n, name).is_some()
                    || self.plug_named(PlugParent::Node(n), name).is_some()
            }
            Some(PlugParent::Plug(p)) => self.plug_named(PlugParent::Plug(p), name).is_some(),
        }
    }

    fn check_name(&self, owner: Option<PlugParent>, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('.') {
            return Err(Error::InvalidOperation(format!("invalid name '{name}'")));
        }
        if self.name_taken(owner, name) {
            let owner = match owner {
                None => "graph root".to_string(),
                Some(PlugParent::Node(n)) => format!("node '{}'", self.node_path(n)),
                Some(PlugParent::Plug(p)) => format!("plug '{}'", self.plug_path(p)),
            };
            return Err(Error::NameConflict { name: name.to_string(), owner });
        }
        Ok(())
    }

    /// A free name in `node`'s namespace derived from `base`: `op2` becomes
    /// `op3`, `sum` becomes `sum1`.
    pub fn unique_name(&self, node: NodeId, base: &str) -> String {
        let owner = Some(PlugParent::Node(node));
        if !self.name_taken(owner, base) {
            return base.to_string();
        }
        let stem = base.trim_end_matches(|c: char| c.is_ascii_digit());
        let mut n: u64 = base[stem.len()..].parse().map(|n: u64| n + 1).unwrap_or(1);
        loop {
            let candidate = format!("{stem}{n}");
            if !self.name_taken(owner, &candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    // ========================================================================
    // Node creation / removal
    // ========================================================================

    /// Add an empty node. `parent = None` creates a root.
    pub fn add_node(&mut self, parent: Option<NodeId>, name: &str, class: &str) -> Result<NodeId> {
        if let Some(p) = parent {
            self.node_ref(p)?;
        }
        self.check_name(parent.map(PlugParent::Node), name)?;
        let id = NodeId(self.alloc());
        let mut node = Node::new(id, name, class);
        node.parent = parent;
        self.nodes.insert(id, node);
        match parent {
            Some(p) => self.node_mut(p)?.children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    pub fn add_box(&mut self, parent: Option<NodeId>, name: &str) -> Result<NodeId> {
        self.add_node(parent, name, BOX_CLASS)
    }

    /// Create an empty reference instance: no boundary plugs, one user namespace.
    pub fn add_reference(&mut self, parent: Option<NodeId>, name: &str) -> Result<NodeId> {
        let id = self.add_node(parent, name, REFERENCE_CLASS)?;
        self.add_plug(PlugParent::Node(id), &PlugSpec::compound(USER_PLUG, Vec::new()))?;
        self.references.insert(id, ReferenceState::default());
        Ok(id)
    }

    /// Add a node carrying the plugs declared by `schema`.
    pub fn add_node_from_schema(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        schema: &NodeSchema,
    ) -> Result<NodeId> {
        let id = self.add_node(parent, name, &schema.class)?;
        for spec in &schema.plugs {
            self.add_plug(PlugParent::Node(id), spec)?;
        }
        Ok(id)
    }

    /// Remove a node and its whole subtree. Downstream inputs are cleared.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        let parent = self.node_ref(node)?.parent;
        self.remove_node_tree(node);
        match parent {
            Some(p) => {
                if let Some(pn) = self.nodes.get_mut(&p) {
                    pn.children.retain(|c| *c != node);
                }
            }
            None => self.roots.retain(|r| *r != node),
        }
        Ok(())
    }

    fn remove_node_tree(&mut self, node: NodeId) {
        let Some(data) = self.nodes.get(&node) else { return };
        let children = data.children.clone();
        let plugs = data.plugs.clone();
        for child in children {
            self.remove_node_tree(child);
        }
        for plug in plugs {
            self.remove_plug_tree(plug);
        }
        self.nodes.remove(&node);
        self.references.remove(&node);
    }

    /// Rename a node or plug within its owner's namespace.
    pub fn rename(&mut self, item: Item, name: &str) -> Result<()> {
        let owner = match item {
            Item::Node(n) => self.node_ref(n)?.parent.map(PlugParent::Node),
            Item::Plug(p) => Some(self.plug_ref(p)?.parent),
        };
        let current = match item {
            Item::Node(n) => &self.node_ref(n)?.name,
            Item::Plug(p) => &self.plug_ref(p)?.name,
        };
        if current == name {
            return Ok(());
        }
        self.check_name(owner, name)?;
        match item {
            Item::Node(n) => self.node_mut(n)?.name = name.to_string(),
            Item::Plug(p) => self.plug_mut(p)?.name = name.to_string(),
        }
        Ok(())
    }

    /// Move `node` under `new_parent`, appended last.
    pub(crate) fn reparent_node(&mut self, node: NodeId, new_parent: NodeId) -> Result<()> {
        let name = self.node_ref(node)?.name.clone();
        if self.is_ancestor_or_self(node, new_parent) {
            return Err(Error::InvalidOperation(format!(
                "cannot move node '{}' below itself",
                self.node_path(node)
            )));
        }
        self.check_name(Some(PlugParent::Node(new_parent)), &name)?;
        let old_parent = self.node_ref(node)?.parent;
        match old_parent {
            Some(p) => self.node_mut(p)?.children.retain(|c| *c != node),
            None => self.roots.retain(|r| *r != node),
        }
        self.node_mut(node)?.parent = Some(new_parent);
        self.node_mut(new_parent)?.children.push(node);
        Ok(())
    }

    // ========================================================================
    // Plug creation / removal
    // ========================================================================

    /// Create the plug tree described by `spec` under `owner`.
    pub fn add_plug(&mut self, owner: PlugParent, spec: &PlugSpec) -> Result<PlugId> {
        match owner {
            PlugParent::Node(n) => {
                self.node_ref(n)?;
            }
            PlugParent::Plug(p) => {
                if !self.plug_ref(p)?.is_compound() {
                    return Err(Error::InvalidOperation(format!(
                        "plug '{}' is not a compound plug",
                        self.plug_path(p)
                    )));
                }
            }
        }
        self.check_name(Some(owner), &spec.name)?;
        self.check_spec(spec)?;
        let id = self.insert_plug_tree(owner, spec);
        match owner {
            PlugParent::Node(n) => self.node_mut(n)?.plugs.push(id),
            PlugParent::Plug(p) => {
                if let PlugKind::Compound { children } = &mut self.plug_mut(p)?.kind {
                    children.push(id);
                }
            }
        }
        Ok(id)
    }

    fn check_spec(&self, spec: &PlugSpec) -> Result<()> {
        match &spec.body {
            PlugSpecBody::Leaf { ty, default, value } => {
                for v in [default, value] {
                    if !ty.accepts(v) {
                        return Err(Error::TypeError {
                            expected: ty.name().into(),
                            got: v.type_name().into(),
                        });
                    }
                }
                Ok(())
            }
            PlugSpecBody::Compound { children } => {
                for (i, child) in children.iter().enumerate() {
                    if child.name.is_empty() || child.name.contains('.') {
                        let msg = format!("invalid name '{}'", child.name);
                        return Err(Error::InvalidOperation(msg));
                    }
                    if children[..i].iter().any(|c| c.name == child.name) {
                        return Err(Error::NameConflict {
                            name: child.name.clone(),
                            owner: format!("plug spec '{}'", spec.name),
                        });
                    }
                    self.check_spec(child)?;
                }
                Ok(())
            }
        }
    }

    /// Insert a validated spec tree; the caller links the returned root.
    fn insert_plug_tree(&mut self, owner: PlugParent, spec: &PlugSpec) -> PlugId {
        let id = PlugId(self.alloc());
        let kind = match &spec.body {
            PlugSpecBody::Leaf { ty, default, value } => PlugKind::Leaf {
                ty: *ty,
                value: ty.coerce(value.clone()),
                default: ty.coerce(default.clone()),
            },
            PlugSpecBody::Compound { .. } => PlugKind::Compound { children: Vec::new() },
        };
        self.plugs.insert(
            id,
            Plug {
                id,
                name: spec.name.clone(),
                parent: owner,
                direction: spec.direction,
                flags: spec.flags,
                metadata: Metadata::from(spec.metadata.clone()),
                input: None,
                outputs: SmallVec::new(),
                kind,
            },
        );
        if let PlugSpecBody::Compound { children } = &spec.body {
            let ids: Vec<PlugId> = children
                .iter()
                .map(|c| self.insert_plug_tree(PlugParent::Plug(id), c))
                .collect();
            let kind = self.plugs.get_mut(&id).map(|p| &mut p.kind);
            if let Some(PlugKind::Compound { children }) = kind {
                *children = ids;
            }
        }
        id
    }

    /// Remove a plug and its children. Downstream inputs are cleared and any
    /// edit records on the removed plugs are dropped.
    pub fn remove_plug(&mut self, plug: PlugId) -> Result<()> {
        let parent = self.plug_ref(plug)?.parent;
        self.remove_plug_tree(plug);
        match parent {
            PlugParent::Node(n) => {
                if let Some(node) = self.nodes.get_mut(&n) {
                    node.plugs.retain(|p| *p != plug);
                }
            }
            PlugParent::Plug(p) => {
                let kind = self.plugs.get_mut(&p).map(|x| &mut x.kind);
                if let Some(PlugKind::Compound { children }) = kind {
                    children.retain(|c| *c != plug);
                }
            }
        }
        Ok(())
    }

    fn remove_plug_tree(&mut self, plug: PlugId) {
        let instance = self.owning_node(plug);
        for p in self.plug_tree(plug) {
            self.disconnect_all(p);
            self.plugs.remove(&p);
            if let Some(state) = instance.and_then(|n| self.references.get_mut(&n)) {
                state.edits.remove(p);
            }
        }
    }

    /// Move a top-level plug onto `node`, appended last.
    pub(crate) fn reparent_plug(&mut self, plug: PlugId, node: NodeId) -> Result<()> {
        let data = self.plug_ref(plug)?;
        let (name, old) = (data.name.clone(), data.parent);
        let PlugParent::Node(old_node) = old else {
            return Err(Error::InvalidOperation("only top-level plugs can be moved".into()));
        };
        self.check_name(Some(PlugParent::Node(node)), &name)?;
        self.node_mut(old_node)?.plugs.retain(|p| *p != plug);
        self.node_mut(node)?.plugs.push(plug);
        self.plug_mut(plug)?.parent = PlugParent::Node(node);
        Ok(())
    }

    /// Reconstruct a detached spec from a live plug tree.
    pub fn plug_spec(&self, plug: PlugId) -> Result<PlugSpec> {
        let data = self.plug_ref(plug)?;
        let body = match &data.kind {
            PlugKind::Leaf { ty, value, default } => PlugSpecBody::Leaf {
                ty: *ty,
                default: default.clone(),
                value: value.clone(),
            },
            PlugKind::Compound { children } => PlugSpecBody::Compound {
                children: children.iter().map(|c| self.plug_spec(*c)).collect::<Result<_>>()?,
            },
        };
        Ok(PlugSpec {
            name: data.name.clone(),
            direction: data.direction,
            flags: data.flags,
            metadata: data.metadata.persistent().clone(),
            body,
        })
    }

    /// Overwrite values, defaults and persistent metadata of an existing plug
    /// tree from a spec of the same shape.
    pub(crate) fn apply_spec_values(&mut self, plug: PlugId, spec: &PlugSpec) -> Result<()> {
        self.check_spec(spec)?;
        let data = self.plug_mut(plug)?;
        for (key, value) in &spec.metadata {
            data.metadata.register(key.clone(), value.clone(), true);
        }
        let mismatch = || Error::TypeError {
            expected: "plug of the same shape".into(),
            got: format!("spec '{}'", spec.name),
        };
        match &spec.body {
            PlugSpecBody::Leaf { ty: spec_ty, value: v, default: d } => match &mut data.kind {
                PlugKind::Leaf { ty, value, default } if *ty == *spec_ty => {
                    *value = spec_ty.coerce(v.clone());
                    *default = spec_ty.coerce(d.clone());
                    Ok(())
                }
                _ => Err(mismatch()),
            },
            PlugSpecBody::Compound { children: specs } => {
                let children = match &data.kind {
                    PlugKind::Compound { children } => children.clone(),
                    PlugKind::Leaf { .. } => return Err(mismatch()),
                };
                for child_spec in specs {
                    let child = children
                        .iter()
                        .copied()
                        .find(|c| self.plugs.get(c).is_some_and(|x| x.name == child_spec.name))
                        .ok_or_else(|| Error::NotFound(format!("plug '{}'", child_spec.name)))?;
                    self.apply_spec_values(child, child_spec)?;
                }
                Ok(())
            }
        }
    }

    pub(crate) fn set_flags(&mut self, plug: PlugId, flags: PlugFlags, on: bool) -> Result<()> {
        self.plug_mut(plug)?.flags.set(flags, on);
        Ok(())
    }

    // ========================================================================
    // Values
    // ========================================================================

    pub fn value(&self, plug: PlugId) -> Option<&Value> {
        self.plugs.get(&plug)?.value()
    }

    pub fn default_value(&self, plug: PlugId) -> Option<&Value> {
        self.plugs.get(&plug)?.default_value()
    }

    /// Set a leaf plug's value. Counts as an edit on reference boundary plugs.
    pub fn set_value(&mut self, plug: PlugId, value: impl Into<Value>) -> Result<()> {
        self.write_value(plug, value.into())?;
        self.note_edit(plug, EditKind::Value);
        Ok(())
    }

    /// Reset a plug tree to its defaults. Counts as an edit on reference
    /// boundary plugs, even though the value then equals the default.
    pub fn set_to_default(&mut self, plug: PlugId) -> Result<()> {
        self.reset_to_default(plug)?;
        self.note_edit(plug, EditKind::Default);
        Ok(())
    }

    pub(crate) fn write_value(&mut self, plug: PlugId, new: Value) -> Result<()> {
        let data = self.plug_mut(plug)?;
        match &mut data.kind {
            PlugKind::Leaf { ty, value, .. } => {
                if !ty.accepts(&new) {
                    return Err(Error::TypeError {
                        expected: ty.name().into(),
                        got: new.type_name().into(),
                    });
                }
                *value = ty.coerce(new);
                Ok(())
            }
            PlugKind::Compound { .. } => Err(Error::TypeError {
                expected: "leaf plug".into(),
                got: "compound plug".into(),
            }),
        }
    }

    pub(crate) fn reset_to_default(&mut self, plug: PlugId) -> Result<()> {
        self.plug_ref(plug)?;
        for p in self.plug_tree(plug) {
            let kind = self.plugs.get_mut(&p).map(|x| &mut x.kind);
            if let Some(PlugKind::Leaf { value, default, .. }) = kind {
                *value = default.clone();
            }
        }
        Ok(())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub fn metadata(&self, item: Item) -> Option<&Metadata> {
        match item {
            Item::Node(n) => self.nodes.get(&n).map(|x| &x.metadata),
            Item::Plug(p) => self.plugs.get(&p).map(|x| &x.metadata),
        }
    }

    pub fn metadata_mut(&mut self, item: Item) -> Result<&mut Metadata> {
        match item {
            Item::Node(n) => Ok(&mut self.node_mut(n)?.metadata),
            Item::Plug(p) => Ok(&mut self.plug_mut(p)?.metadata),
        }
    }

    pub fn register_metadata(
        &mut self,
        item: Item,
        key: &str,
        value: impl Into<Value>,
        persistent: bool,
    ) -> Result<()> {
        self.metadata_mut(item)?.register(key, value, persistent);
        Ok(())
    }

    /// Metadata lookup with ownership fallback: plug → parent plug →
    /// owning node → ancestor nodes.
    pub fn metadata_value(&self, item: Item, key: &str) -> Option<&Value> {
        let mut current = Some(item);
        while let Some(it) = current {
            if let Some(v) = self.metadata(it).and_then(|m| m.get(key)) {
                return Some(v);
            }
            current = match it {
                Item::Plug(p) => self.plugs.get(&p).map(|x| x.parent.into()),
                Item::Node(n) => self.nodes.get(&n).and_then(|x| x.parent).map(Item::Node),
            };
        }
        None
    }

    // ========================================================================
    // Reference state
    // ========================================================================

    pub fn reference_state(&self, node: NodeId) -> Option<&ReferenceState> {
        self.references.get(&node)
    }

    pub(crate) fn reference_state_mut(&mut self, node: NodeId) -> Result<&mut ReferenceState> {
        self.references
            .get_mut(&node)
            .ok_or_else(|| Error::NotAReference(format!("Node {node}")))
    }

    pub fn reference_instances(&self) -> impl Iterator<Item = (NodeId, &ReferenceState)> {
        self.references.iter().map(|(k, v)| (*k, v))
    }

    /// Whether a top-level plug of `node` is reference-owned: not the user
    /// namespace and not host-private.
    pub fn is_reference_plug(&self, node: NodeId, plug: PlugId) -> bool {
        self.references.contains_key(&node)
            && self.plugs.get(&plug).is_some_and(|p| {
                p.parent == PlugParent::Node(node) && !is_reserved_name(&p.name)
            })
    }

    /// Reference-owned top-level plugs of an instance, in order.
    pub fn boundary_plugs(&self, node: NodeId) -> Vec<PlugId> {
        self.nodes
            .get(&node)
            .map(|n| n.plugs.iter().copied().filter(|p| self.is_reference_plug(node, *p)).collect())
            .unwrap_or_default()
    }

    /// The instance whose boundary plug tree contains `plug`, if any.
    pub fn edit_target(&self, plug: PlugId) -> Option<NodeId> {
        let top = self.top_level_plug(plug)?;
        let node = self.owning_node(top)?;
        self.is_reference_plug(node, top).then_some(node)
    }
}
