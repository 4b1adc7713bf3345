//! The reconciliation engine.
//!
//! ```text
//! instantiate ─▶ diff boundary ─▶ reapply edits ─▶ plan reconnects
//!      │                                                 │
//!  scratch root                                    teardown old
//!                                                        │
//!                   notify ◀─ update state ◀─ swap ◀─ reconnect
//! ```
//!
//! Runs against a graph the caller has already snapshotted: any `Err`
//! leaves partial work behind that the caller discards.

use hashbrown::{HashMap, HashSet};
use tracing::{debug, warn};

use super::{EditLedger, EditRecord, LoadIssue, LoadOptions, LoadResult};
use crate::definition::{ConnectionSpec, Definition, NodeSpec};
use crate::graph::{Graph, Item, is_reserved_name};
use crate::model::*;
use crate::registry::ClassResolver;
use crate::{Error, Result};

const SCRATCH_ROOT: &str = "__loading";

/// Load `def` into `instance`, reconciling it against what is already there.
/// `warnings` carries issues found before the engine ran (migrations).
pub(crate) fn load_definition(
    graph: &mut Graph,
    resolver: &dyn ClassResolver,
    instance: NodeId,
    def: &Definition,
    file_name: &str,
    options: LoadOptions,
    mut warnings: Vec<LoadIssue>,
) -> Result<LoadResult> {
    graph.node_ref(instance)?;
    if graph.reference_state(instance).is_none() {
        return Err(Error::NotAReference(graph.node_path(instance)));
    }
    check_reserved_names(def)?;
    let inherited = warnings.len();

    // Instantiate
    let scratch = add_scratch_root(graph)?;
    instantiate(graph, resolver, scratch, def, options, &mut warnings)?;

    // Boundary diff
    let old_boundary = graph.boundary_plugs(instance);
    let new_boundary = graph.node_ref(scratch)?.plugs.clone();
    let old_children = graph.node_ref(instance)?.children.clone();
    let name_of = |g: &Graph, p: PlugId| g.plug(p).map(|d| d.name.clone()).unwrap_or_default();

    let mut kept = Vec::new();
    let mut removed = Vec::new();
    for &old in &old_boundary {
        match graph.plug_named(PlugParent::Node(scratch), &name_of(graph, old)) {
            Some(new) => kept.push((old, new)),
            None => removed.push(old),
        }
    }
    let added = new_boundary.len() - kept.len();

    let internal: Vec<PlugId> =
        old_children.iter().flat_map(|c| graph.subtree_plugs(*c)).collect();
    let dying: HashSet<PlugId> = old_boundary
        .iter()
        .flat_map(|p| graph.plug_tree(*p))
        .chain(internal.iter().copied())
        .collect();

    // Old plug -> replacement, matched by path below the instance. Kept
    // boundary trees first, then every plug of the old internal nodes.
    let candidates: Vec<PlugId> = kept
        .iter()
        .flat_map(|(old, _)| graph.plug_tree(*old))
        .chain(internal.iter().copied())
        .collect();
    let mut counterpart: HashMap<PlugId, PlugId> = HashMap::new();
    let mut matched: Vec<PlugId> = Vec::new();
    for op in candidates {
        let Some(rel) = graph.relative_path(instance, op) else { continue };
        if let Some(np) = graph.descendant_plug(scratch, &rel) {
            counterpart.insert(op, np);
            matched.push(op);
        }
    }
    let remap = |p: PlugId| {
        if dying.contains(&p) {
            counterpart.get(&p).copied()
        } else {
            Some(p)
        }
    };

    // Reapply edits. Records on plugs without a replacement are dropped.
    let edited: Vec<(PlugId, EditRecord)> = graph
        .reference_state(instance)
        .map(|s| s.edits.plugs().into_iter().filter_map(|p| Some((p, *s.edits.get(p)?))).collect())
        .unwrap_or_default();
    let mut carried = Vec::new();
    for (old, record) in edited {
        let Some(&new) = counterpart.get(&old) else { continue };
        match reapply_edit(graph, old, new, &remap) {
            Ok(()) => carried.push((new, record)),
            Err(issue) => warnings.push(issue),
        }
    }

    // Downstream connections of matched plugs follow the replacement.
    let mut transfers = Vec::new();
    for &op in &matched {
        let np = counterpart[&op];
        for &consumer in graph.outputs(op) {
            if dying.contains(&consumer) || implied_by_parent(graph, consumer, op) {
                continue;
            }
            if graph.accepts_input(consumer, np) {
                transfers.push((consumer, np));
            } else {
                warnings.push(LoadIssue::DanglingConnection {
                    source_plug: graph.plug_path(op),
                    destination: graph.plug_path(consumer),
                    reason: format!("'{}' is now {}", name_of(graph, op), describe(graph, np)),
                });
            }
        }
    }
    // Internal plugs that are gone take their outside consumers with them.
    for &op in internal.iter().filter(|p| !counterpart.contains_key(*p)) {
        for &consumer in graph.outputs(op) {
            if dying.contains(&consumer) || implied_by_parent(graph, consumer, op) {
                continue;
            }
            warnings.push(LoadIssue::DanglingConnection {
                source_plug: graph.plug_path(op),
                destination: graph.plug_path(consumer),
                reason: "source no longer exists".to_string(),
            });
        }
    }

    // Removed plugs in pass-through position hand their consumer upstream.
    let mut rewires = Vec::new();
    for &old in &removed {
        let members: HashSet<PlugId> = graph.plug_tree(old).into_iter().collect();
        if let Some(pair) = graph.pass_through(&members, |p| !dying.contains(&p)) {
            rewires.push(pair);
        }
    }

    debug!(
        instance = %graph.node_path(instance),
        kept = kept.len(),
        added,
        removed = removed.len(),
        edits = carried.len(),
        transfers = transfers.len(),
        rewires = rewires.len(),
        "boundary diff"
    );

    // Teardown
    for plug in old_boundary {
        graph.remove_plug(plug)?;
    }
    for child in old_children {
        graph.remove_node(child)?;
    }

    // Reconnect
    for (consumer, source) in transfers {
        if let Err(e) = graph.connect(consumer, Some(source)) {
            warnings.push(LoadIssue::DanglingConnection {
                source_plug: graph.plug_path(source),
                destination: graph.plug_path(consumer),
                reason: e.to_string(),
            });
        }
    }
    for (source, consumer) in rewires {
        graph.rewire(source, consumer);
    }

    // Swap
    let boundary_names: Vec<String> = new_boundary.iter().map(|p| name_of(graph, *p)).collect();
    for plug in new_boundary {
        graph.reparent_plug(plug, instance)?;
        for p in graph.plug_tree(plug) {
            graph.set_flags(p, PlugFlags::DYNAMIC, false)?;
        }
    }
    for child in graph.node_ref(scratch)?.children.clone() {
        graph.reparent_node(child, instance)?;
    }
    graph.remove_node(scratch)?;

    // State
    let mut entries = def.metadata.clone();
    entries.extend(def.producer.metadata_entries().map(|(k, v)| (k.to_string(), v)));
    let previous =
        graph.reference_state(instance).map(|s| s.metadata_keys.clone()).unwrap_or_default();
    let installed =
        graph.metadata_mut(Item::Node(instance))?.refresh_transient(&previous, entries);

    let state = graph.reference_state_mut(instance)?;
    let mut edits = EditLedger::new();
    for (plug, record) in carried {
        edits.carry(plug, record);
    }
    state.edits = edits;
    state.file_name = file_name.to_string();
    state.producer = Some(def.producer);
    state.boundary = boundary_names.clone();
    state.metadata_keys = installed;

    for issue in &warnings[inherited..] {
        warn!(instance = %graph.node_path(instance), %issue, "load issue");
    }

    Ok(LoadResult {
        boundary_plugs: boundary_names,
        file_name: file_name.to_string(),
        success: true,
        warnings,
    })
}

/// Top-level names land next to the instance's own user and private plugs.
fn check_reserved_names(def: &Definition) -> Result<()> {
    let plugs = def.boundary.iter().map(|p| (p.name.as_str(), "boundary plug"));
    let nodes = def.nodes.iter().map(|n| (n.name.as_str(), "node"));
    for (name, what) in plugs.chain(nodes) {
        if is_reserved_name(name) {
            return Err(Error::MalformedDefinition(format!(
                "'{name}' is reserved and cannot be a top-level {what}"
            )));
        }
    }
    Ok(())
}

fn add_scratch_root(graph: &mut Graph) -> Result<NodeId> {
    let mut name = SCRATCH_ROOT.to_string();
    let mut n = 1;
    while graph.root(&name).is_some() {
        name = format!("{SCRATCH_ROOT}{n}");
        n += 1;
    }
    graph.add_box(None, &name)
}

fn describe(graph: &Graph, plug: PlugId) -> String {
    match graph.plug(plug).and_then(|p| p.value_type()) {
        Some(ty) => ty.name().to_string(),
        None => "compound".to_string(),
    }
}

/// `consumer` is linked to `source` only because their parents are linked.
fn implied_by_parent(graph: &Graph, consumer: PlugId, source: PlugId) -> bool {
    match (graph.plug(consumer).map(|p| p.parent), graph.plug(source).map(|p| p.parent)) {
        (Some(PlugParent::Plug(cp)), Some(PlugParent::Plug(sp))) => graph.input(cp) == Some(sp),
        _ => false,
    }
}

// ============================================================================
// Instantiation
// ============================================================================

fn instantiate(
    graph: &mut Graph,
    resolver: &dyn ClassResolver,
    scratch: NodeId,
    def: &Definition,
    options: LoadOptions,
    warnings: &mut Vec<LoadIssue>,
) -> Result<()> {
    for spec in &def.boundary {
        graph.add_plug(PlugParent::Node(scratch), spec)?;
    }

    let mut skipped = Vec::new();
    for node in &def.nodes {
        let path = node.name.clone();
        instantiate_node(graph, resolver, scratch, node, path, options, warnings, &mut skipped)?;
    }
    for connection in &def.connections {
        connect_spec(graph, scratch, connection, &skipped, warnings);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn instantiate_node(
    graph: &mut Graph,
    resolver: &dyn ClassResolver,
    parent: NodeId,
    spec: &NodeSpec,
    path: String,
    options: LoadOptions,
    warnings: &mut Vec<LoadIssue>,
    skipped: &mut Vec<String>,
) -> Result<()> {
    let Some(schema) = resolver.resolve(&spec.class) else {
        if !options.continue_on_error {
            return Err(Error::UnresolvedNodeClass { class: spec.class.clone(), node: path });
        }
        warnings.push(LoadIssue::UnresolvedNodeClass {
            class: spec.class.clone(),
            node: path.clone(),
        });
        skipped.push(path);
        return Ok(());
    };

    let node = graph.add_node_from_schema(Some(parent), &spec.name, &schema)?;
    *graph.metadata_mut(Item::Node(node))? = Metadata::from(spec.metadata.clone());

    for plug in &spec.plugs {
        let applied = match graph.plug_named(PlugParent::Node(node), &plug.name) {
            Some(existing) => graph.apply_spec_values(existing, plug).is_ok(),
            None if plug.flags.contains(PlugFlags::DYNAMIC) => {
                graph.add_plug(PlugParent::Node(node), plug)?;
                true
            }
            None => false,
        };
        if !applied {
            warnings.push(LoadIssue::SchemaPlugMismatch {
                node: path.clone(),
                plug: plug.name.clone(),
                class: spec.class.clone(),
            });
        }
    }

    for child in &spec.children {
        let child_path = format!("{path}.{}", child.name);
        instantiate_node(graph, resolver, node, child, child_path, options, warnings, skipped)?;
    }
    Ok(())
}

fn connect_spec(
    graph: &mut Graph,
    scratch: NodeId,
    connection: &ConnectionSpec,
    skipped: &[String],
    warnings: &mut Vec<LoadIssue>,
) {
    let below_skipped = |path: &str| {
        skipped
            .iter()
            .any(|s| path.strip_prefix(s.as_str()).is_some_and(|rest| rest.starts_with('.')))
    };
    if below_skipped(&connection.source) || below_skipped(&connection.destination) {
        return;
    }

    let dangling = |reason: String| LoadIssue::DanglingConnection {
        source_plug: connection.source.clone(),
        destination: connection.destination.clone(),
        reason,
    };
    let src = graph.descendant_plug(scratch, &connection.source);
    let dst = graph.descendant_plug(scratch, &connection.destination);
    match (src, dst) {
        (Some(src), Some(dst)) => {
            if let Err(e) = graph.connect(dst, Some(src)) {
                warnings.push(dangling(e.to_string()));
            }
        }
        _ => warnings.push(dangling("endpoint not found".to_string())),
    }
}

// ============================================================================
// Edit reapplication
// ============================================================================

/// Copy the edit on `old` onto its replacement `new`: the input if its
/// source survives the reload, the value otherwise.
fn reapply_edit(
    graph: &mut Graph,
    old: PlugId,
    new: PlugId,
    remap: &impl Fn(PlugId) -> Option<PlugId>,
) -> std::result::Result<(), LoadIssue> {
    let Some(old_plug) = graph.plug(old).cloned() else { return Ok(()) };
    let incompatible = |graph: &Graph, what: String| LoadIssue::IncompatibleEditType {
        plug: graph.plug_path(old),
        old: what,
        new: describe(graph, new),
    };

    if let Some(src) = old_plug.input.and_then(remap) {
        return match graph.connect(new, Some(src)) {
            Ok(()) => Ok(()),
            Err(_) => Err(incompatible(graph, format!("input from {}", describe(graph, src)))),
        };
    }

    let new_type = graph.plug(new).and_then(|p| p.value_type());
    match (old_plug.value(), new_type) {
        (Some(value), Some(ty)) if ty.accepts(value) => graph
            .write_value(new, value.clone())
            .map_err(|_| incompatible(graph, value.type_name().to_string())),
        (Some(value), _) => Err(incompatible(graph, value.type_name().to_string())),
        (None, None) => Ok(()),
        (None, Some(_)) => Err(incompatible(graph, "compound".to_string())),
    }
}
