//! Export a subgraph as a [`Definition`].
//!
//! ```text
//! root (Box)                       Definition
//!   ├─ boundary plugs     ──▶      boundary  (defaults := live values)
//!   ├─ child nodes        ──▶      nodes     (values and defaults as-is,
//!   │                                         reserved names skipped)
//!   └─ internal links     ──▶      connections (both ends inside root)
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::Utc;
use hashbrown::HashSet;
use tracing::debug;

use super::{ConnectionSpec, Definition, NodeSpec};
use crate::config::{BoundarySelection, ExportOptions};
use crate::graph::{Graph, USER_PLUG, is_reserved_name};
use crate::model::*;
use crate::{Error, Result};

/// Export the subtree rooted at `root`.
///
/// Boundary plug defaults are frozen to their current values, so a fresh
/// instance starts out showing exactly what the author saw. Only
/// persistent metadata is written. Child nodes named like the user
/// namespace or a host-private plug are left out, since an instance keeps
/// those names for itself.
pub fn export(graph: &Graph, root: NodeId, options: &ExportOptions) -> Result<Definition> {
    let root_node = graph.node_ref(root)?;
    let boundary = select_boundary(graph, root, options)?;

    let mut def = Definition {
        exported_at: Some(Utc::now()),
        metadata: root_node.metadata.persistent().clone(),
        ..Definition::new()
    };

    for plug in &boundary {
        let mut spec = graph.plug_spec(*plug)?;
        freeze_defaults(&mut spec);
        def.boundary.push(spec);
    }
    let children: Vec<NodeId> = root_node
        .children
        .iter()
        .copied()
        .filter(|c| graph.node(*c).is_some_and(|n| !is_reserved_name(&n.name)))
        .collect();
    if children.len() < root_node.children.len() {
        debug!(
            root = %graph.node_path(root),
            skipped = root_node.children.len() - children.len(),
            "skipped reserved child names"
        );
    }
    for child in &children {
        def.nodes.push(node_spec(graph, *child)?);
    }

    // Pre-order over everything written, boundary first.
    let ordered: Vec<PlugId> = boundary
        .iter()
        .flat_map(|p| graph.plug_tree(*p))
        .chain(children.iter().flat_map(|c| graph.subtree_plugs(*c)))
        .collect();
    let written: HashSet<PlugId> = ordered.iter().copied().collect();

    for dst in ordered {
        let Some(src) = graph.input(dst) else { continue };
        if !written.contains(&src) || covered_by_parent(graph, dst, src) {
            continue;
        }
        let path = |p: PlugId| {
            graph
                .relative_path(root, p)
                .ok_or_else(|| Error::NotFound(format!("path of plug {p}")))
        };
        def.connections.push(ConnectionSpec::new(path(src)?, path(dst)?));
    }

    debug!(
        root = %graph.node_path(root),
        boundary = def.boundary.len(),
        nodes = def.nodes.len(),
        connections = def.connections.len(),
        "exported definition"
    );
    Ok(def)
}

/// Export and write to `path` in one step.
pub fn export_to_file(
    graph: &Graph,
    root: NodeId,
    path: impl AsRef<Path>,
    options: &ExportOptions,
) -> Result<Definition> {
    let def = export(graph, root, options)?;
    let file = File::create(path.as_ref())?;
    def.write_to(BufWriter::new(file))?;
    Ok(def)
}

fn select_boundary(graph: &Graph, root: NodeId, options: &ExportOptions) -> Result<Vec<PlugId>> {
    let root_node = graph.node_ref(root)?;
    let eligible = |p: &PlugId| {
        graph
            .plug(*p)
            .is_some_and(|d| d.name != USER_PLUG && !d.name.starts_with(&options.private_prefix))
    };
    match &options.boundary {
        BoundarySelection::AllEligible => {
            Ok(root_node.plugs.iter().copied().filter(eligible).collect())
        }
        BoundarySelection::Named(names) => names
            .iter()
            .map(|name| {
                let plug = graph.plug_named(PlugParent::Node(root), name).ok_or_else(|| {
                    Error::NotFound(format!("plug '{name}' on '{}'", root_node.name))
                })?;
                if !eligible(&plug) {
                    return Err(Error::InvalidOperation(format!(
                        "plug '{name}' cannot be exported as a boundary plug"
                    )));
                }
                Ok(plug)
            })
            .collect(),
    }
}

fn freeze_defaults(spec: &mut PlugSpec) {
    match &mut spec.body {
        PlugSpecBody::Leaf { default, value, .. } => *default = value.clone(),
        PlugSpecBody::Compound { children } => children.iter_mut().for_each(freeze_defaults),
    }
}

fn node_spec(graph: &Graph, node: NodeId) -> Result<NodeSpec> {
    let data = graph.node_ref(node)?;
    Ok(NodeSpec {
        name: data.name.clone(),
        class: data.class.clone(),
        plugs: data.plugs.iter().map(|p| graph.plug_spec(*p)).collect::<Result<_>>()?,
        children: data.children.iter().map(|c| node_spec(graph, *c)).collect::<Result<_>>()?,
        metadata: data.metadata.persistent().clone(),
    })
}

/// A child link implied by a compound-level connection of its parents.
fn covered_by_parent(graph: &Graph, dst: PlugId, src: PlugId) -> bool {
    match (graph.plug(dst).map(|p| p.parent), graph.plug(src).map(|p| p.parent)) {
        (Some(PlugParent::Plug(dp)), Some(PlugParent::Plug(sp))) => graph.input(dp) == Some(sp),
        _ => false,
    }
}
