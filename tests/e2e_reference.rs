//! End-to-end tests for loading and reloading reference instances.
//!
//! Each test authors a source subgraph in one document, exports it, and
//! loads the resulting definition into a host document.

mod common;

use common::{Host, Source, snapshot};
use pretty_assertions::assert_eq;
use refgraph::definition::{MAJOR_VERSION_KEY, PATCH_VERSION_KEY};
use refgraph::{
    ConnectionSpec, EditKind, EditRecord, Error, Item, LoadIssue, LoadOptions, NodeSpec, PlugParent,
    PlugSpec, USER_PLUG, Value,
};

fn gain_source(value: i64) -> Source {
    let mut src = Source::new();
    src.add_boundary(PlugSpec::int("gain", 1));
    src.set("gain", value);
    src
}

// ============================================================================
// 1. First load exposes the frozen defaults
// ============================================================================

#[test]
fn test_first_load_freezes_defaults() {
    let src = gain_source(2);
    let host = Host::new(&src.export());
    let g = host.doc.graph();
    let gain = host.plug("gain");

    assert_eq!(g.value(gain), Some(&Value::Int(2)));
    assert_eq!(g.default_value(gain), Some(&Value::Int(2)));
    assert!(!host.doc.has_edit(host.r, gain).unwrap());
    assert_eq!(
        g.reference_state(host.r).unwrap().boundary,
        vec!["op1", "op2", "sum", "gain"]
    );
    assert_eq!(host.doc.file_name(host.r).unwrap(), "src.grf");
    assert!(g.descendant_node(host.r, "n1").is_some());
}

// ============================================================================
// 2. Edits survive reload, unedited plugs track new defaults
// ============================================================================

#[test]
fn test_edit_survives_new_default() {
    let mut src = gain_source(2);
    let mut host = Host::new(&src.export());
    host.doc.set_value(host.plug("gain"), 100).unwrap();
    assert!(host.doc.has_edit(host.r, host.plug("gain")).unwrap());

    src.set("gain", 5);
    host.reload(&src.export());

    let gain = host.plug("gain");
    let g = host.doc.graph();
    assert_eq!(g.value(gain), Some(&Value::Int(100)));
    assert_eq!(g.default_value(gain), Some(&Value::Int(5)));
    assert!(host.doc.has_edit(host.r, gain).unwrap());
}

#[test]
fn test_unedited_plug_tracks_default() {
    let mut src = gain_source(2);
    let mut host = Host::new(&src.export());

    src.set("gain", 5);
    host.reload(&src.export());

    let gain = host.plug("gain");
    assert_eq!(host.doc.graph().value(gain), Some(&Value::Int(5)));
    assert!(!host.doc.has_edit(host.r, gain).unwrap());
}

#[test]
fn test_edit_equal_to_new_default_is_kept() {
    let mut src = gain_source(2);
    let mut host = Host::new(&src.export());
    host.doc.set_value(host.plug("gain"), 5).unwrap();

    src.set("gain", 5);
    host.reload(&src.export());
    assert!(host.doc.has_edit(host.r, host.plug("gain")).unwrap());

    // The coincidence must not turn the override back into a default.
    src.set("gain", 7);
    host.reload(&src.export());
    let gain = host.plug("gain");
    assert_eq!(host.doc.graph().value(gain), Some(&Value::Int(5)));
    assert_eq!(host.doc.graph().default_value(gain), Some(&Value::Int(7)));
}

#[test]
fn test_edit_record_survives_reload_unchanged() {
    let mut src = gain_source(2);
    let mut host = Host::new(&src.export());
    host.doc.set_to_default(host.plug("gain")).unwrap();
    host.doc.set_value(host.plug("op2"), 4).unwrap();

    src.set("gain", 9);
    host.reload(&src.export());

    let state = host.doc.graph().reference_state(host.r).unwrap();
    let record = |path: &str| state.edits.get(host.plug(path)).copied();
    assert_eq!(record("gain"), Some(EditRecord::new(EditKind::Default)));
    assert_eq!(record("op2"), Some(EditRecord::new(EditKind::Value)));
    assert_eq!(record("op1"), Some(EditRecord::new(EditKind::Input)));
}

#[test]
fn test_set_to_default_counts_as_edit() {
    let mut src = gain_source(2);
    let mut host = Host::new(&src.export());
    host.doc.set_to_default(host.plug("gain")).unwrap();
    assert!(host.doc.has_edit(host.r, host.plug("gain")).unwrap());

    src.set("gain", 9);
    host.reload(&src.export());
    assert_eq!(host.doc.graph().value(host.plug("gain")), Some(&Value::Int(2)));
}

// ============================================================================
// 3. Reload is idempotent
// ============================================================================

#[test]
fn test_reload_same_definition_is_idempotent() {
    let src = gain_source(2);
    let def = src.export();
    let mut host = Host::new(&def);
    host.doc.set_value(host.plug("gain"), 40).unwrap();
    host.doc.set_value(host.plug("op2"), 3).unwrap();

    host.reload(&def);
    let first = snapshot(host.doc.graph());
    host.reload(&def);
    assert_eq!(snapshot(host.doc.graph()), first);
}

// ============================================================================
// 4. Connections across the boundary
// ============================================================================

#[test]
fn test_connections_follow_replacement_plugs() {
    let src = gain_source(2);
    let mut host = Host::new(&src.export());
    let old_sum = host.plug("sum");

    host.reload(&src.export());

    let g = host.doc.graph();
    let (op1, sum) = (host.plug("op1"), host.plug("sum"));
    assert_ne!(sum, old_sum);
    assert_eq!(g.input(op1), Some(host.plug_of(host.a, "sum")));
    assert!(host.doc.has_edit(host.r, op1).unwrap());
    assert_eq!(g.input(host.plug_of(host.c, "op1")), Some(sum));
    // internal wiring rebuilt from the definition
    assert_eq!(g.input(host.plug("n1.op1")), Some(op1));
    assert_eq!(g.input(sum), Some(host.plug("n1.sum")));
}

#[test]
fn test_edited_input_from_internal_plug_survives_reload() {
    let src = gain_source(2);
    let def = src.export();
    let mut host = Host::new(&def);
    let (op2, n1_sum) = (host.plug("op2"), host.plug("n1.sum"));
    host.doc.set_input(op2, Some(n1_sum)).unwrap();

    let result = host.reload(&def);

    assert!(result.warnings.is_empty());
    let op2 = host.plug("op2");
    assert_eq!(host.doc.graph().input(op2), Some(host.plug("n1.sum")));
    assert_ne!(host.plug("n1.sum"), n1_sum);
    assert!(host.doc.has_edit(host.r, op2).unwrap());
}

#[test]
fn test_outside_consumer_of_internal_plug_follows_reload() {
    let src = gain_source(2);
    let def = src.export();
    let mut host = Host::new(&def);
    let c_op2 = host.plug_of(host.c, "op2");
    host.doc.set_input(c_op2, Some(host.plug("n1.sum"))).unwrap();

    host.reload(&def);
    assert_eq!(host.doc.graph().input(c_op2), Some(host.plug("n1.sum")));

    // once the inner node is gone the connection is reported, not lost quietly
    let mut without_n1 = def.clone();
    without_n1.nodes.clear();
    without_n1.connections.clear();
    let result = host.reload(&without_n1);
    assert_eq!(host.doc.graph().input(c_op2), None);
    assert!(result.warnings.iter().any(|w| matches!(
        w,
        LoadIssue::DanglingConnection { source_plug, .. } if source_plug == "r.n1.sum"
    )));
}

#[test]
fn test_removed_pass_through_plug_is_bridged() {
    let mut src = gain_source(2);
    let thru = src.add_boundary(PlugSpec::int("thru", 0));
    let mut host = Host::new(&src.export());
    let (a_sum, c_op2) = (host.plug_of(host.a, "sum"), host.plug_of(host.c, "op2"));
    host.doc.set_input(host.plug("thru"), Some(a_sum)).unwrap();
    host.doc.set_input(c_op2, Some(host.plug("thru"))).unwrap();

    src.doc.transact_custom("remove", |g| g.remove_plug(thru)).unwrap();
    let result = host.reload(&src.export());

    assert!(!result.boundary_plugs.contains(&"thru".to_string()));
    assert_eq!(host.try_plug("thru"), None);
    assert_eq!(host.doc.graph().input(c_op2), Some(a_sum));
}

#[test]
fn test_removed_plug_with_two_consumers_is_not_bridged() {
    let mut src = gain_source(2);
    let thru = src.add_boundary(PlugSpec::int("thru", 0));
    let mut host = Host::new(&src.export());
    let a_sum = host.plug_of(host.a, "sum");
    let (c_op2, a_op2) = (host.plug_of(host.c, "op2"), host.plug_of(host.a, "op2"));
    host.doc.set_input(host.plug("thru"), Some(a_sum)).unwrap();
    host.doc.set_input(c_op2, Some(host.plug("thru"))).unwrap();
    host.doc.set_input(a_op2, Some(host.plug("thru"))).unwrap();

    src.doc.transact_custom("remove", |g| g.remove_plug(thru)).unwrap();
    host.reload(&src.export());

    assert_eq!(host.doc.graph().input(c_op2), None);
    assert_eq!(host.doc.graph().input(a_op2), None);
}

#[test]
fn test_type_change_breaks_downstream_with_warning() {
    let mut src = Source::new();
    let out = src.add_boundary(PlugSpec::int("level", 1).output());
    let mut host = Host::new(&src.export());
    let c_op2 = host.plug_of(host.c, "op2");
    host.doc.set_input(c_op2, Some(host.plug("level"))).unwrap();

    src.doc
        .transact_custom("retype", |g| {
            g.remove_plug(out)?;
            let level = PlugSpec::string("level", "high").output().dynamic();
            g.add_plug(PlugParent::Node(src.root), &level)
        })
        .unwrap();
    let result = host.reload(&src.export());

    assert!(matches!(
        result.warnings.as_slice(),
        [LoadIssue::DanglingConnection { .. }]
    ));
    assert_eq!(host.doc.graph().input(c_op2), None);
}

// ============================================================================
// 5. Partial failure and strict mode
// ============================================================================

#[test]
fn test_unresolved_class_skips_only_its_subtree() {
    let src = gain_source(2);
    let mut def = src.export();
    let inner = NodeSpec::new("inner", "Add");
    def.nodes.push(NodeSpec::new("legacy", "RetiredShader").with_child(inner));
    def.connections.push(ConnectionSpec::new("op2", "legacy.inner.op1"));

    let mut host = Host::new(&src.export());
    let result = host.reload(&def);

    assert!(result.success);
    assert_eq!(result.skipped_nodes(), vec!["legacy"]);
    assert_eq!(result.warnings.len(), 1);
    let g = host.doc.graph();
    assert!(g.descendant_node(host.r, "n1").is_some());
    assert!(g.descendant_node(host.r, "legacy").is_none());
    assert_eq!(g.input(host.plug("n1.op1")), Some(host.plug("op1")));
}

#[test]
fn test_strict_failure_leaves_instance_untouched() {
    let src = gain_source(2);
    let mut host = Host::new(&src.export());
    host.doc.set_value(host.plug("gain"), 100).unwrap();
    let before = host.doc.graph().clone();
    let steps = host.doc.history().len();

    let mut def = src.export();
    def.nodes.push(NodeSpec::new("ghost", "Missing"));
    let err = host.doc.load_definition(host.r, &def, "next.grf", LoadOptions::strict());

    assert!(matches!(err, Err(Error::UnresolvedNodeClass { .. })));
    assert_eq!(host.doc.graph(), &before);
    assert_eq!(host.doc.history().len(), steps);
    assert_eq!(host.doc.file_name(host.r).unwrap(), "src.grf");
}

#[test]
fn test_incompatible_edit_is_dropped_with_warning() {
    let mut src = gain_source(2);
    let mut host = Host::new(&src.export());
    host.doc.set_value(host.plug("gain"), 100).unwrap();

    let gain = src.plug("gain");
    src.doc
        .transact_custom("retype", |g| {
            g.remove_plug(gain)?;
            g.add_plug(PlugParent::Node(src.root), &PlugSpec::string("gain", "loud").dynamic())
        })
        .unwrap();
    let result = host.reload(&src.export());

    assert!(matches!(
        result.warnings.as_slice(),
        [LoadIssue::IncompatibleEditType { .. }]
    ));
    let gain = host.plug("gain");
    assert_eq!(host.doc.graph().value(gain), Some(&Value::from("loud")));
    assert!(!host.doc.has_edit(host.r, gain).unwrap());
}

// ============================================================================
// 6. Host-owned plugs and metadata
// ============================================================================

#[test]
fn test_user_and_private_plugs_untouched() {
    let src = gain_source(2);
    let mut host = Host::new(&src.export());
    let r = host.r;
    let (note, private) = host
        .doc
        .transact_custom("host plugs", |g| {
            let user = g.plug_named(PlugParent::Node(r), USER_PLUG).expect("user plug");
            let note = g.add_plug(PlugParent::Plug(user), &PlugSpec::int("note", 3))?;
            let private = g.add_plug(PlugParent::Node(r), &PlugSpec::string("__session", "abc"))?;
            Ok((note, private))
        })
        .unwrap();
    host.doc.set_value(note, 9).unwrap();
    assert!(!host.doc.has_edit(r, note).unwrap());

    let result = host.reload(&src.export());

    let g = host.doc.graph();
    assert_eq!(host.plug("user.note"), note);
    assert_eq!(host.plug("__session"), private);
    assert_eq!(g.value(note), Some(&Value::Int(9)));
    assert_eq!(g.value(private), Some(&Value::from("abc")));
    assert!(!result.boundary_plugs.iter().any(|n| n == USER_PLUG || n == "__session"));
}

#[test]
fn test_reserved_child_names_do_not_block_loading() {
    let mut src = gain_source(2);
    let root = src.root;
    src.doc
        .transact_custom("clutter", |g| {
            g.add_node(Some(root), USER_PLUG, "Add")?;
            g.add_node(Some(root), "__preview", "Add")
        })
        .unwrap();
    let def = src.export();
    assert!(def.node(USER_PLUG).is_none());
    assert!(def.node("__preview").is_none());

    let mut host = Host::new(&def);
    let result = host.reload(&def);
    assert!(result.success);
    assert!(host.doc.graph().descendant_node(host.r, "n1").is_some());

    // a hand-written definition with such a node is refused outright
    let mut bad = def.clone();
    bad.nodes.push(NodeSpec::new(USER_PLUG, "Add"));
    let before = host.doc.graph().clone();
    let err = host.doc.load_definition(host.r, &bad, "bad.grf", LoadOptions::best_effort());
    assert!(matches!(err, Err(Error::MalformedDefinition(_))));
    assert_eq!(host.doc.graph(), &before);
}

#[test]
fn test_host_metadata_survives_reload() {
    let mut src = gain_source(2);
    let root = src.root;
    src.doc
        .transact_custom("describe", |g| {
            g.register_metadata(Item::Node(root), "description", "from source", true)?;
            g.register_metadata(Item::Node(root), "rev", 1, true)
        })
        .unwrap();
    let mut host = Host::new(&src.export());
    let r = host.r;
    host.doc
        .transact_custom("annotate", |g| {
            g.register_metadata(Item::Node(r), "ui:color", "teal", false)?;
            g.register_metadata(Item::Node(r), "description", "pinned by host", true)
        })
        .unwrap();

    src.doc
        .transact_custom("bump", |g| g.register_metadata(Item::Node(root), "rev", 2, true))
        .unwrap();
    host.reload(&src.export());

    let meta = host.doc.graph().metadata(Item::Node(r)).unwrap();
    assert_eq!(meta.get("ui:color"), Some(&Value::from("teal")));
    assert_eq!(meta.get("description"), Some(&Value::from("pinned by host")));
    assert!(meta.is_persistent("description"));
    assert_eq!(meta.get("rev"), Some(&Value::Int(2)));
    assert!(!meta.is_persistent("rev"));
}

#[test]
fn test_definition_metadata_refreshed_on_reload() {
    let mut src = gain_source(2);
    let root = src.root;
    src.doc
        .transact_custom("describe", |g| {
            g.register_metadata(Item::Node(root), "description", "first", true)
        })
        .unwrap();
    let mut host = Host::new(&src.export());
    let r = Item::Node(host.r);
    assert_eq!(host.doc.graph().metadata_value(r, "description"), Some(&Value::from("first")));

    src.doc
        .transact_custom("describe", |g| {
            g.register_metadata(Item::Node(root), "description", "second", true)
        })
        .unwrap();
    host.reload(&src.export());
    let meta = host.doc.graph().metadata(r).unwrap();
    assert_eq!(meta.get("description"), Some(&Value::from("second")));
    assert!(!meta.keys(true).contains(&"description"));
}

#[test]
fn test_producer_stamp_is_transient() {
    let src = gain_source(2);
    let host = Host::new(&src.export());
    let meta = host.doc.graph().metadata(Item::Node(host.r)).unwrap();

    assert!(meta.get(MAJOR_VERSION_KEY).is_some());
    assert_eq!(meta.get(PATCH_VERSION_KEY), Some(&Value::Int(0)));
    assert!(meta.keys(true).is_empty());
    assert!(meta.keys(false).contains(&MAJOR_VERSION_KEY));
}
