//! Edit Ledger: which boundary plugs of an instance the host has customized.
//!
//! A record exists because a caller touched the plug, never because its
//! value happens to differ from (or equal) a default.

use hashbrown::HashMap;

use crate::definition::ProducerVersion;
use crate::graph::Graph;
use crate::model::{NodeId, PlugId};

/// The caller write that created a record. Later writes overwrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Value,
    Default,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditRecord {
    /// Made by a caller write. The engine never creates records, it only
    /// carries existing ones, so this stays `true` across reloads.
    pub explicit: bool,
    pub kind: EditKind,
}

impl EditRecord {
    pub fn new(kind: EditKind) -> Self {
        Self { explicit: true, kind }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditLedger {
    records: HashMap<PlugId, EditRecord>,
}

impl EditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, plug: PlugId, kind: EditKind) {
        self.records.insert(plug, EditRecord::new(kind));
    }

    pub fn get(&self, plug: PlugId) -> Option<&EditRecord> {
        self.records.get(&plug)
    }

    pub fn contains(&self, plug: PlugId) -> bool {
        self.records.contains_key(&plug)
    }

    pub(crate) fn remove(&mut self, plug: PlugId) -> Option<EditRecord> {
        self.records.remove(&plug)
    }

    /// Move `record` onto `plug`, the replacement of the plug it was made on.
    pub(crate) fn carry(&mut self, plug: PlugId, record: EditRecord) {
        self.records.insert(plug, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Edited plugs in ascending id order.
    pub fn plugs(&self) -> Vec<PlugId> {
        let mut plugs: Vec<PlugId> = self.records.keys().copied().collect();
        plugs.sort();
        plugs
    }
}

/// Per-instance bookkeeping stored alongside the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceState {
    /// Identity of the last loaded definition; empty before the first load.
    pub file_name: String,
    pub edits: EditLedger,
    /// Producer stamp of the loaded definition.
    pub producer: Option<ProducerVersion>,
    /// Boundary plug names as of the last load, in definition order.
    pub boundary: Vec<String>,
    /// Transient metadata keys the last load put on the instance.
    pub metadata_keys: Vec<String>,
}

impl Graph {
    /// Record an edit if `plug` sits in a reference boundary plug tree.
    pub(crate) fn note_edit(&mut self, plug: PlugId, kind: EditKind) {
        let Some(instance) = self.edit_target(plug) else { return };
        if let Ok(state) = self.reference_state_mut(instance) {
            state.edits.record(plug, kind);
        }
    }

    /// Whether `plug` (or any plug below it) carries an edit record.
    pub fn is_edited(&self, instance: NodeId, plug: PlugId) -> bool {
        let Some(state) = self.reference_state(instance) else { return false };
        self.plug_tree(plug).into_iter().any(|p| state.edits.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlugParent, PlugSpec};
    use crate::graph::USER_PLUG;

    #[test]
    fn test_carried_records_keep_their_kind() {
        let mut ledger = EditLedger::new();
        ledger.record(PlugId(1), EditKind::Default);
        ledger.record(PlugId(2), EditKind::Value);
        ledger.record(PlugId(2), EditKind::Input);
        let old = *ledger.get(PlugId(1)).unwrap();
        ledger.carry(PlugId(9), old);
        assert_eq!(ledger.get(PlugId(9)), Some(&EditRecord::new(EditKind::Default)));
        assert_eq!(ledger.get(PlugId(2)), Some(&EditRecord::new(EditKind::Input)));
        assert_eq!(ledger.plugs(), vec![PlugId(1), PlugId(2), PlugId(9)]);
        ledger.remove(PlugId(1));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_only_boundary_writes_are_edits() {
        let mut g = Graph::new();
        let r = g.add_reference(None, "r").unwrap();
        let gain = g.add_plug(PlugParent::Node(r), &PlugSpec::int("gain", 1)).unwrap();
        let private = g.add_plug(PlugParent::Node(r), &PlugSpec::int("__gui", 0)).unwrap();
        let user = g.descendant_plug(r, USER_PLUG).unwrap();
        let extra = g.add_plug(PlugParent::Plug(user), &PlugSpec::int("extra", 0)).unwrap();

        g.set_value(private, 4).unwrap();
        g.set_value(extra, 4).unwrap();
        assert!(!g.is_edited(r, private));
        assert!(!g.is_edited(r, extra));

        g.write_value(gain, 2.into()).unwrap();
        assert!(!g.is_edited(r, gain));
        g.set_to_default(gain).unwrap();
        assert!(g.is_edited(r, gain));
    }

    #[test]
    fn test_compound_child_edit_shows_on_parent() {
        let mut g = Graph::new();
        let r = g.add_reference(None, "r").unwrap();
        let c = g
            .add_plug(PlugParent::Node(r), &PlugSpec::compound("c", vec![PlugSpec::int("x", 0)]))
            .unwrap();
        let x = g.descendant_plug(r, "c.x").unwrap();
        g.set_value(x, 3).unwrap();
        assert!(g.is_edited(r, c));
        assert!(g.is_edited(r, x));

        g.remove_plug(c).unwrap();
        assert!(g.reference_state(r).unwrap().edits.is_empty());
    }
}
