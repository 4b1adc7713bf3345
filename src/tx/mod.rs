//! Transaction management.
//!
//! Each committed transaction becomes one [`UndoStep`] holding whole-graph
//! snapshots from before and after. Restoring a snapshot restores nodes,
//! plugs, connections, edit ledgers and file references together.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::graph::Graph;

/// Category of a transaction; decides whether adjacent steps may merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    Load,
    Edit,
    RemoveEdit,
    Delete,
    Custom,
}

impl TxKind {
    pub fn mergeable(self) -> bool {
        matches!(self, TxKind::Edit)
    }
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub u64);

#[derive(Debug, Clone)]
pub struct UndoStep {
    pub id: TxId,
    pub label: String,
    pub kind: TxKind,
    pub merge_group: Option<String>,
    pub before: Graph,
    pub after: Graph,
}

impl UndoStep {
    /// Whether `next` may fold into this step.
    fn absorbs(&self, kind: TxKind, merge_group: Option<&str>) -> bool {
        self.kind == kind
            && kind.mergeable()
            && merge_group.is_some()
            && self.merge_group.as_deref() == merge_group
    }
}

/// Linear undo history. Committing clears the redo side.
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    done: VecDeque<UndoStep>,
    undone: Vec<UndoStep>,
    /// `0` = unbounded.
    limit: usize,
    next_id: u64,
}

impl UndoStack {
    pub fn new(limit: usize) -> Self {
        Self { limit, ..Self::default() }
    }

    /// Record a committed transaction, merging into the previous step when
    /// both are edits of the same merge group. Returns the step's id.
    pub fn push(
        &mut self,
        label: &str,
        kind: TxKind,
        merge_group: Option<&str>,
        before: Graph,
        after: Graph,
    ) -> TxId {
        self.undone.clear();
        if let Some(last) = self.done.back_mut() {
            if last.absorbs(kind, merge_group) {
                last.after = after;
                return last.id;
            }
        }
        self.next_id += 1;
        let id = TxId(self.next_id);
        self.done.push_back(UndoStep {
            id,
            label: label.to_string(),
            kind,
            merge_group: merge_group.map(str::to_string),
            before,
            after,
        });
        if self.limit > 0 {
            while self.done.len() > self.limit {
                self.done.pop_front();
            }
        }
        id
    }

    /// Move the newest step to the redo side, returning it.
    pub fn undo(&mut self) -> Option<&UndoStep> {
        let step = self.done.pop_back()?;
        self.undone.push(step);
        self.undone.last()
    }

    pub fn redo(&mut self) -> Option<&UndoStep> {
        let step = self.undone.pop()?;
        self.done.push_back(step);
        self.done.back()
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Labels of undoable steps, oldest first.
    pub fn labels(&self) -> Vec<&str> {
        self.done.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.done.clear();
        self.undone.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphs(n: usize) -> Vec<Graph> {
        let mut g = Graph::new();
        let mut out = vec![g.clone()];
        for i in 0..n {
            g.add_box(None, &format!("b{i}")).unwrap();
            out.push(g.clone());
        }
        out
    }

    #[test]
    fn test_merge_group_coalesces_edits() {
        let g = graphs(3);
        let mut stack = UndoStack::new(0);
        let a = stack.push("drag", TxKind::Edit, Some("drag"), g[0].clone(), g[1].clone());
        let b = stack.push("drag", TxKind::Edit, Some("drag"), g[1].clone(), g[2].clone());
        assert_eq!(a, b);
        assert_eq!(stack.len(), 1);

        let step = stack.undo().unwrap();
        assert_eq!(step.before, g[0]);
        assert_eq!(step.after, g[2]);
    }

    #[test]
    fn test_no_merge_without_group_or_for_loads() {
        let g = graphs(3);
        let mut stack = UndoStack::new(0);
        stack.push("edit", TxKind::Edit, None, g[0].clone(), g[1].clone());
        stack.push("edit", TxKind::Edit, None, g[1].clone(), g[2].clone());
        assert_eq!(stack.len(), 2);

        stack.push("load", TxKind::Load, Some("x"), g[0].clone(), g[1].clone());
        stack.push("load", TxKind::Load, Some("x"), g[1].clone(), g[2].clone());
        assert_eq!(stack.len(), 4);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let g = graphs(3);
        let mut stack = UndoStack::new(2);
        for i in 0..3 {
            stack.push(&format!("s{i}"), TxKind::Custom, None, g[i].clone(), g[i + 1].clone());
        }
        assert_eq!(stack.labels(), vec!["s1", "s2"]);
    }

    #[test]
    fn test_commit_clears_redo() {
        let g = graphs(2);
        let mut stack = UndoStack::new(0);
        stack.push("a", TxKind::Custom, None, g[0].clone(), g[1].clone());
        stack.undo();
        assert!(stack.can_redo());
        stack.push("b", TxKind::Custom, None, g[0].clone(), g[2].clone());
        assert!(!stack.can_redo());
        assert!(stack.redo().is_none());
    }
}
