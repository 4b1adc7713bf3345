//! Connections, pass-through rewiring and plug promotion.

use hashbrown::HashSet;
use tracing::debug;

use super::Graph;
use crate::model::*;
use crate::reference::EditKind;
use crate::{Error, Result};

impl Graph {
    // ========================================================================
    // Connections
    // ========================================================================

    /// Connect `dst` to `src` (or disconnect with `None`). Compound plugs
    /// connect child-wise. Counts as an edit on reference boundary plugs.
    pub fn set_input(&mut self, dst: PlugId, src: Option<PlugId>) -> Result<()> {
        self.connect(dst, src)?;
        self.note_edit(dst, EditKind::Input);
        Ok(())
    }

    pub fn input(&self, plug: PlugId) -> Option<PlugId> {
        self.plug(plug)?.input
    }

    pub fn outputs(&self, plug: PlugId) -> &[PlugId] {
        self.plug(plug).map(|p| p.outputs.as_slice()).unwrap_or(&[])
    }

    /// Whether `dst` may take `src` as its input (types and shape).
    pub fn accepts_input(&self, dst: PlugId, src: PlugId) -> bool {
        let (Some(d), Some(s)) = (self.plug(dst), self.plug(src)) else { return false };
        match (&d.kind, &s.kind) {
            (PlugKind::Leaf { ty: dt, .. }, PlugKind::Leaf { ty: st, .. }) => {
                dt == st || (*dt == ValueType::Float && *st == ValueType::Int)
            }
            (PlugKind::Compound { children: dc }, PlugKind::Compound { children: sc }) => {
                dc.len() == sc.len() && dc.iter().zip(sc).all(|(a, b)| self.accepts_input(*a, *b))
            }
            _ => false,
        }
    }

    pub(crate) fn connect(&mut self, dst: PlugId, src: Option<PlugId>) -> Result<()> {
        match src {
            Some(s) => self.check_connection(dst, s)?,
            None => {
                self.plug_ref(dst)?;
            }
        }
        self.link(dst, src);
        Ok(())
    }

    pub(crate) fn check_connection(&self, dst: PlugId, src: PlugId) -> Result<()> {
        let d = self.plug_ref(dst)?;
        let s = self.plug_ref(src)?;
        if !self.accepts_input(dst, src) {
            let describe = |p: &Plug| match p.value_type() {
                Some(ty) => ty.name().to_string(),
                None => format!("compound[{}]", p.children().len()),
            };
            return Err(Error::TypeError { expected: describe(d), got: describe(s) });
        }
        if self.reaches(src, dst) {
            return Err(Error::Cycle {
                source_plug: self.plug_path(src),
                destination: self.plug_path(dst),
            });
        }
        Ok(())
    }

    /// True if following input links upstream from `from` arrives at
    /// `target`, for the plug itself or any child pair.
    fn reaches(&self, from: PlugId, target: PlugId) -> bool {
        let mut current = Some(from);
        while let Some(p) = current {
            if p == target {
                return true;
            }
            current = self.plug(p).and_then(|x| x.input);
        }
        let (Some(f), Some(t)) = (self.plug(from), self.plug(target)) else { return false };
        f.children().iter().zip(t.children()).any(|(a, b)| self.reaches(*a, *b))
    }

    /// Unchecked link update; callers validate first.
    fn link(&mut self, dst: PlugId, src: Option<PlugId>) {
        if let Some(old) = self.plug(dst).and_then(|p| p.input) {
            if let Some(o) = self.plugs.get_mut(&old) {
                o.outputs.retain(|x| *x != dst);
            }
        }
        if let Some(d) = self.plugs.get_mut(&dst) {
            d.input = src;
        }
        if let Some(s) = src.and_then(|s| self.plugs.get_mut(&s)) {
            if !s.outputs.contains(&dst) {
                s.outputs.push(dst);
            }
        }

        let dst_children = self.plug(dst).map(|p| p.children().to_vec()).unwrap_or_default();
        match src {
            Some(s) => {
                let src_children = self.plug(s).map(|p| p.children().to_vec()).unwrap_or_default();
                for (d, s) in dst_children.into_iter().zip(src_children) {
                    self.link(d, Some(s));
                }
            }
            None => {
                for d in dst_children {
                    self.link(d, None);
                }
            }
        }
    }

    /// Detach `plug` from its input and clear every downstream input.
    pub(super) fn disconnect_all(&mut self, plug: PlugId) {
        let Some(data) = self.plugs.get(&plug) else { return };
        let input = data.input;
        let outputs = data.outputs.clone();
        if let Some(i) = input.and_then(|i| self.plugs.get_mut(&i)) {
            i.outputs.retain(|x| *x != plug);
        }
        for o in outputs {
            if let Some(op) = self.plugs.get_mut(&o) {
                op.input = None;
            }
        }
        if let Some(d) = self.plugs.get_mut(&plug) {
            d.input = None;
            d.outputs.clear();
        }
    }

    // ========================================================================
    // Pass-through rewiring
    // ========================================================================

    /// The `(source, consumer)` pair to reconnect if every plug in `members`
    /// disappeared: exactly one upstream source and exactly one downstream
    /// consumer outside the set that `survives`, with compatible types.
    /// Child links of a connected compound count once.
    pub(crate) fn pass_through(
        &self,
        members: &HashSet<PlugId>,
        survives: impl Fn(PlugId) -> bool,
    ) -> Option<(PlugId, PlugId)> {
        let mut sources: Vec<PlugId> = Vec::new();
        let mut consumers: Vec<PlugId> = Vec::new();
        for p in members {
            let Some(data) = self.plug(*p) else { continue };
            if let Some(i) = data.input {
                if !members.contains(&i) && survives(i) && !sources.contains(&i) {
                    sources.push(i);
                }
            }
            for o in &data.outputs {
                if !members.contains(o) && survives(*o) && !consumers.contains(o) {
                    consumers.push(*o);
                }
            }
        }
        let outermost = |set: &[PlugId]| -> Vec<PlugId> {
            set.iter()
                .copied()
                .filter(|p| !self.has_plug_ancestor_in(*p, set))
                .collect()
        };
        match (outermost(&sources).as_slice(), outermost(&consumers).as_slice()) {
            ([s], [c]) if self.accepts_input(*c, *s) => Some((*s, *c)),
            _ => None,
        }
    }

    fn has_plug_ancestor_in(&self, plug: PlugId, set: &[PlugId]) -> bool {
        let mut current = self.plug(plug).map(|p| p.parent);
        while let Some(PlugParent::Plug(parent)) = current {
            if set.contains(&parent) {
                return true;
            }
            current = self.plug(parent).map(|p| p.parent);
        }
        false
    }

    /// Reconnect `consumer` to `source` if that is still a legal connection.
    pub(crate) fn rewire(&mut self, source: PlugId, consumer: PlugId) -> bool {
        if self.check_connection(consumer, source).is_err() {
            return false;
        }
        self.link(consumer, Some(source));
        debug!(
            source = %self.plug_path(source),
            consumer = %self.plug_path(consumer),
            "pass-through reconnect"
        );
        true
    }

    /// Delete nodes, reconnecting around each one that sits between a single
    /// upstream source and a single downstream consumer.
    pub fn delete_nodes(&mut self, nodes: &[NodeId]) -> Result<()> {
        for node in nodes {
            self.node_ref(*node)?;
        }
        for &node in nodes {
            // may already be gone as a descendant of an earlier entry
            if !self.contains_node(node) {
                continue;
            }
            let members: HashSet<PlugId> = self.subtree_plugs(node).into_iter().collect();
            let rewire = self.pass_through(&members, |_| true);
            self.remove_node(node)?;
            if let Some((source, consumer)) = rewire {
                self.rewire(source, consumer);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Promotion
    // ========================================================================

    /// Expose a plug of a node inside `container` as a dynamic top-level
    /// plug of the container, wired through to the inner plug.
    pub fn promote_plug(&mut self, container: NodeId, inner: PlugId) -> Result<PlugId> {
        let owner = self
            .owning_node(inner)
            .ok_or_else(|| Error::NotFound(format!("Plug {inner}")))?;
        if owner == container || !self.is_ancestor_or_self(container, owner) {
            return Err(Error::InvalidOperation(format!(
                "plug '{}' is not inside '{}'",
                self.plug_path(inner),
                self.node_path(container)
            )));
        }
        let mut spec = self.plug_spec(inner)?;
        spec.name = self.unique_name(container, &spec.name);
        spec.flags = PlugFlags::DYNAMIC;
        spec.metadata.clear();
        let direction = spec.direction;

        let promoted = self.add_plug(PlugParent::Node(container), &spec)?;
        match direction {
            Direction::In => self.connect(inner, Some(promoted))?,
            Direction::Out => self.connect(promoted, Some(inner))?,
        }
        Ok(promoted)
    }
}
