//! Shared fixtures for the end-to-end tests.

#![allow(dead_code)]

use std::sync::Arc;

use refgraph::{
    ClassRegistry, Definition, Document, ExportOptions, Graph, LoadOptions, LoadResult, NodeId,
    NodeSchema, PlugId, PlugParent, PlugSpec, Value,
};

/// Registry with `Box` and an `Add` class (op1, op2 -> sum).
pub fn registry() -> Arc<ClassRegistry> {
    let registry = ClassRegistry::with_builtins();
    registry.register(add_schema());
    registry.register(NodeSchema::new("Scale").with_plug(PlugSpec::float("factor", 1.0)));
    Arc::new(registry)
}

pub fn add_schema() -> NodeSchema {
    NodeSchema::new("Add")
        .with_plug(PlugSpec::int("op1", 0))
        .with_plug(PlugSpec::int("op2", 0))
        .with_plug(PlugSpec::int("sum", 0).output())
}

pub fn document() -> Document {
    Document::new(registry())
}

/// Source subgraph `src` in its own document:
///
/// ```text
/// src.op1 ─▶ n1.op1    n1.sum ─▶ src.sum
/// src.op2 ─▶ n1.op2
/// ```
pub struct Source {
    pub doc: Document,
    pub root: NodeId,
    pub n1: NodeId,
}

impl Source {
    pub fn new() -> Self {
        let mut doc = document();
        let schema = add_schema();
        let (root, n1) = doc
            .transact_custom("author", |g| {
                let root = g.add_box(None, "src")?;
                let n1 = g.add_node_from_schema(Some(root), "n1", &schema)?;
                for name in ["op1", "op2", "sum"] {
                    let inner = g.descendant_plug(n1, name).expect("Add plug");
                    g.promote_plug(root, inner)?;
                }
                Ok((root, n1))
            })
            .expect("author source");
        Self { doc, root, n1 }
    }

    /// Add a dynamic boundary plug directly on the source root.
    pub fn add_boundary(&mut self, spec: PlugSpec) -> PlugId {
        let root = self.root;
        self.doc
            .transact_custom("add plug", |g| g.add_plug(PlugParent::Node(root), &spec.dynamic()))
            .expect("add boundary plug")
    }

    pub fn plug(&self, path: &str) -> PlugId {
        self.doc.graph().descendant_plug(self.root, path).expect("source plug")
    }

    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let plug = self.plug(path);
        self.doc.set_value(plug, value).expect("set source value");
    }

    pub fn export(&self) -> Definition {
        self.doc.export(self.root, &ExportOptions::default()).expect("export")
    }
}

/// Host document with a reference instance `r` between `a` and `c`:
/// `a.sum ─▶ r.op1`, `r.sum ─▶ c.op1`.
pub struct Host {
    pub doc: Document,
    pub r: NodeId,
    pub a: NodeId,
    pub c: NodeId,
}

impl Host {
    pub fn new(def: &Definition) -> Self {
        let mut doc = document();
        let schema = add_schema();
        let (r, a, c) = doc
            .transact_custom("host", |g| {
                let a = g.add_node_from_schema(None, "a", &schema)?;
                let r = g.add_reference(None, "r")?;
                let c = g.add_node_from_schema(None, "c", &schema)?;
                Ok((r, a, c))
            })
            .expect("host graph");
        doc.load_definition(r, def, "src.grf", LoadOptions::best_effort()).expect("first load");
        let mut host = Self { doc, r, a, c };
        let (a_sum, r_op1) = (host.plug_of(a, "sum"), host.plug("op1"));
        host.doc.set_input(r_op1, Some(a_sum)).expect("connect a -> r");
        let (r_sum, c_op1) = (host.plug("sum"), host.plug_of(c, "op1"));
        host.doc.set_input(c_op1, Some(r_sum)).expect("connect r -> c");
        host
    }

    pub fn plug(&self, path: &str) -> PlugId {
        self.plug_of(self.r, path)
    }

    pub fn try_plug(&self, path: &str) -> Option<PlugId> {
        self.doc.graph().descendant_plug(self.r, path)
    }

    pub fn plug_of(&self, node: NodeId, path: &str) -> PlugId {
        self.doc.graph().descendant_plug(node, path).expect("host plug")
    }

    pub fn reload(&mut self, def: &Definition) -> LoadResult {
        self.doc
            .load_definition(self.r, def, "src.grf", LoadOptions::best_effort())
            .expect("reload")
    }
}

/// Id-free description of the whole graph: paths, values, defaults, inputs,
/// edit records and reference state.
pub fn snapshot(g: &Graph) -> Vec<String> {
    let mut out = Vec::new();
    for &root in g.roots() {
        for node in g.node_tree(root) {
            let data = g.node(node).expect("node");
            out.push(format!("node {} : {}", g.node_path(node), data.class));
            if let Some(state) = g.reference_state(node) {
                out.push(format!(
                    "  reference file={} boundary={:?} edits={}",
                    state.file_name,
                    state.boundary,
                    state.edits.len()
                ));
            }
            for &top in &data.plugs {
                for p in g.plug_tree(top) {
                    let plug = g.plug(p).expect("plug");
                    let edited = g
                        .edit_target(p)
                        .and_then(|inst| g.reference_state(inst))
                        .is_some_and(|s| s.edits.contains(p));
                    out.push(format!(
                        "  plug {} value={:?} default={:?} input={} edited={edited}",
                        g.plug_path(p),
                        plug.value(),
                        plug.default_value(),
                        plug.input.map(|i| g.plug_path(i)).unwrap_or_default(),
                    ));
                }
            }
        }
    }
    out
}
