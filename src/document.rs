//! # Document
//!
//! The single-writer handle over a [`Graph`]: every public mutating
//! operation runs as one transaction and becomes one undo step.
//!
//! ```text
//! Document
//!   ├── graph       (current state)
//!   ├── history     (UndoStack of before/after snapshots)
//!   ├── resolver    (shared node class lookup)
//!   └── subscribers (ReferenceLoaded callbacks)
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::{DocumentConfig, ExportOptions};
use crate::definition::{self, Definition};
use crate::event::{ReferenceLoaded, Subscribers, SubscriptionId};
use crate::graph::Graph;
use crate::model::*;
use crate::reference::load::load_definition;
use crate::reference::{DefinitionSource, LoadIssue, LoadOptions, LoadResult};
use crate::registry::ClassResolver;
use crate::tx::{TxKind, UndoStack};
use crate::{Error, Result};

pub struct Document {
    graph: Graph,
    resolver: Arc<dyn ClassResolver>,
    history: UndoStack,
    subscribers: Subscribers,
    config: DocumentConfig,
}

impl Document {
    pub fn new<R: ClassResolver + 'static>(resolver: Arc<R>) -> Self {
        Self::with_config(resolver, DocumentConfig::default())
    }

    pub fn with_config<R: ClassResolver + 'static>(
        resolver: Arc<R>,
        config: DocumentConfig,
    ) -> Self {
        Self {
            graph: Graph::new(),
            resolver,
            history: UndoStack::new(config.undo_limit),
            subscribers: Subscribers::default(),
            config,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn resolver(&self) -> &Arc<dyn ClassResolver> {
        &self.resolver
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Run `f` as one transaction. On `Err` the graph is restored to its
    /// prior state; on `Ok` one undo step is recorded (none if nothing
    /// changed).
    pub fn transact<T>(
        &mut self,
        kind: TxKind,
        label: &str,
        merge_group: Option<&str>,
        f: impl FnOnce(&mut Graph) -> Result<T>,
    ) -> Result<T> {
        let before = self.graph.clone();
        match f(&mut self.graph) {
            Ok(value) => {
                if self.graph != before {
                    self.history.push(label, kind, merge_group, before, self.graph.clone());
                }
                Ok(value)
            }
            Err(e) => {
                self.graph.restore(before);
                Err(e)
            }
        }
    }

    pub fn transact_custom<T>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut Graph) -> Result<T>,
    ) -> Result<T> {
        self.transact(TxKind::Custom, label, None, f)
    }

    // ========================================================================
    // Edits
    // ========================================================================

    pub fn set_value(&mut self, plug: PlugId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.transact(TxKind::Edit, "Set value", None, |g| g.set_value(plug, value))
    }

    /// Like [`Document::set_value`], coalescing with the previous step when
    /// it was an edit of the same `group` (e.g. one interactive drag).
    pub fn set_value_merged(
        &mut self,
        plug: PlugId,
        value: impl Into<Value>,
        group: &str,
    ) -> Result<()> {
        let value = value.into();
        self.transact(TxKind::Edit, "Set value", Some(group), |g| g.set_value(plug, value))
    }

    pub fn set_input(&mut self, dst: PlugId, src: Option<PlugId>) -> Result<()> {
        let label = match src {
            Some(_) => "Connect",
            None => "Disconnect",
        };
        self.transact(TxKind::Edit, label, None, |g| g.set_input(dst, src))
    }

    pub fn set_to_default(&mut self, plug: PlugId) -> Result<()> {
        self.transact(TxKind::Edit, "Set to default", None, |g| g.set_to_default(plug))
    }

    pub fn promote_plug(&mut self, container: NodeId, inner: PlugId) -> Result<PlugId> {
        self.transact_custom("Promote plug", |g| g.promote_plug(container, inner))
    }

    /// Delete nodes with pass-through reconnection. Deleting a reference
    /// instance drops its edit ledger with it.
    pub fn delete_nodes(&mut self, nodes: &[NodeId]) -> Result<()> {
        self.transact(TxKind::Delete, "Delete", None, |g| g.delete_nodes(nodes))
    }

    // ========================================================================
    // Reference instances
    // ========================================================================

    /// Load (or reload) `instance` from `source`.
    ///
    /// Malformed bytes fail before anything is touched. In strict mode an
    /// unresolved node class aborts and the instance is left unchanged.
    pub fn load(
        &mut self,
        instance: NodeId,
        source: DefinitionSource,
        options: LoadOptions,
    ) -> Result<LoadResult> {
        let file_name = source.identity();
        let bytes = source.read()?;
        let (def, issues) = definition::import_with_issues(&bytes)?;
        self.load_parsed(instance, &def, &file_name, options, issues)
    }

    /// Load an in-memory definition, recording `file_name` as its identity.
    pub fn load_definition(
        &mut self,
        instance: NodeId,
        def: &Definition,
        file_name: &str,
        options: LoadOptions,
    ) -> Result<LoadResult> {
        self.load_parsed(instance, def, file_name, options, Vec::new())
    }

    /// Reload `instance` from the file it was last loaded from.
    pub fn reload(&mut self, instance: NodeId) -> Result<LoadResult> {
        let file_name = self.file_name(instance)?.to_string();
        if file_name.is_empty() {
            return Err(Error::InvalidOperation(format!(
                "'{}' has never been loaded",
                self.graph.node_path(instance)
            )));
        }
        let options = self.config.load_options();
        self.load(instance, DefinitionSource::path(file_name), options)
    }

    fn load_parsed(
        &mut self,
        instance: NodeId,
        def: &Definition,
        file_name: &str,
        options: LoadOptions,
        issues: Vec<LoadIssue>,
    ) -> Result<LoadResult> {
        let resolver = Arc::clone(&self.resolver);
        let label = format!("Load {file_name}");
        let result = self.transact(TxKind::Load, &label, None, |g| {
            load_definition(g, resolver.as_ref(), instance, def, file_name, options, issues)
        })?;

        info!(
            instance = %self.graph.node_path(instance),
            file = %result.file_name,
            boundary = result.boundary_plugs.len(),
            warnings = result.warnings.len(),
            "reference loaded"
        );
        self.subscribers.emit(&ReferenceLoaded {
            instance,
            boundary_plugs: result.boundary_plugs.clone(),
            file_name: result.file_name.clone(),
        });
        Ok(result)
    }

    pub fn file_name(&self, instance: NodeId) -> Result<&str> {
        self.graph
            .reference_state(instance)
            .map(|s| s.file_name.as_str())
            .ok_or_else(|| Error::NotAReference(format!("Node {instance}")))
    }

    pub fn has_edit(&self, instance: NodeId, plug: PlugId) -> Result<bool> {
        self.check_instance_plug(instance, plug)?;
        Ok(self.graph.is_edited(instance, plug))
    }

    /// Drop the edits on `plug` (and below), resetting values to their
    /// defaults and disconnecting edited inputs. No-op if nothing is edited.
    pub fn remove_edit(&mut self, instance: NodeId, plug: PlugId) -> Result<()> {
        self.check_instance_plug(instance, plug)?;
        if !self.graph.is_edited(instance, plug) {
            return Ok(());
        }
        self.transact(TxKind::RemoveEdit, "Remove edit", None, |g| {
            for p in g.plug_tree(plug) {
                let edited = g.reference_state_mut(instance)?.edits.remove(p).is_some();
                if edited && g.input(p).is_some() {
                    g.connect(p, None)?;
                }
            }
            g.reset_to_default(plug)
        })
    }

    fn check_instance_plug(&self, instance: NodeId, plug: PlugId) -> Result<()> {
        if self.graph.reference_state(instance).is_none() {
            return Err(Error::NotAReference(format!("Node {instance}")));
        }
        if !self.graph.contains_plug(plug) {
            return Err(Error::NotFound(format!("Plug {plug}")));
        }
        if !self.graph.node_contains_plug(instance, plug) {
            return Err(Error::InvalidOperation(format!(
                "plug '{}' does not belong to '{}'",
                self.graph.plug_path(plug),
                self.graph.node_path(instance)
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Export
    // ========================================================================

    pub fn export(&self, root: NodeId, options: &ExportOptions) -> Result<Definition> {
        definition::export(&self.graph, root, options)
    }

    pub fn export_to_file(
        &self,
        root: NodeId,
        path: impl AsRef<Path>,
        options: &ExportOptions,
    ) -> Result<Definition> {
        definition::export_to_file(&self.graph, root, path, options)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Call `callback` after every load of `instance` (or of any instance
    /// when `None`), including restores by undo and redo.
    pub fn on_reference_loaded(
        &mut self,
        instance: Option<NodeId>,
        callback: impl FnMut(&ReferenceLoaded) + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(instance, Box::new(callback))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // ========================================================================
    // Undo / redo
    // ========================================================================

    pub fn undo_available(&self) -> bool {
        self.history.can_undo()
    }

    pub fn redo_available(&self) -> bool {
        self.history.can_redo()
    }

    /// Undo the newest step. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(step) = self.history.undo() else { return Ok(false) };
        let (label, target) = (step.label.clone(), step.before.clone());
        self.apply_snapshot(target);
        info!(%label, "undo");
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let Some(step) = self.history.redo() else { return Ok(false) };
        let (label, target) = (step.label.clone(), step.after.clone());
        self.apply_snapshot(target);
        info!(%label, "redo");
        Ok(true)
    }

    /// Restore `target` and notify instances whose loaded state changed.
    fn apply_snapshot(&mut self, target: Graph) {
        let previous = self.graph.clone();
        self.graph.restore(target);

        let mut events: Vec<ReferenceLoaded> = self
            .graph
            .reference_instances()
            .filter(|(id, state)| {
                previous.reference_state(*id).is_none_or(|old| {
                    old.file_name != state.file_name || old.boundary != state.boundary
                })
            })
            .map(|(id, state)| ReferenceLoaded {
                instance: id,
                boundary_plugs: state.boundary.clone(),
                file_name: state.file_name.clone(),
            })
            .collect();
        events.sort_by_key(|e| e.instance);
        for event in &events {
            self.subscribers.emit(event);
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.graph.node_count())
            .field("undo_steps", &self.history.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
