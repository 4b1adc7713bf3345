//! Document and export configuration.

use crate::graph::PRIVATE_PREFIX;
use crate::reference::LoadOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConfig {
    /// Maximum undo steps kept; the oldest are dropped first. `0` = unbounded.
    pub undo_limit: usize,
    /// Whether `Document::reload` aborts on unresolved node classes.
    pub strict_by_default: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { undo_limit: 256, strict_by_default: false }
    }
}

/// Which top-level plugs of the exported root become boundary plugs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BoundarySelection {
    /// Every plug except the user namespace and host-private plugs.
    #[default]
    AllEligible,
    /// Exactly these plugs, in this order.
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub boundary: BoundarySelection,
    /// Top-level plugs starting with this prefix are never exported.
    pub private_prefix: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            boundary: BoundarySelection::AllEligible,
            private_prefix: PRIVATE_PREFIX.to_string(),
        }
    }
}

impl ExportOptions {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            boundary: BoundarySelection::Named(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

impl DocumentConfig {
    /// Options used when a load call does not pass its own.
    pub fn load_options(&self) -> LoadOptions {
        if self.strict_by_default {
            LoadOptions::strict()
        } else {
            LoadOptions::best_effort()
        }
    }
}
