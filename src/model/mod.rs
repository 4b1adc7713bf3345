//! # Graph Model Types
//!
//! Plain data that every other module exchanges: identifiers, values,
//! nodes, plugs and their metadata.
//!
//! Design rule: this module is pure data: no I/O, no state, no ownership
//! bookkeeping. Structural invariants live in [`crate::graph`].

pub mod node;
pub mod plug;
pub mod value;
pub mod metadata;

pub use node::{Node, NodeId, BOX_CLASS, REFERENCE_CLASS};
pub use plug::{
    Direction, Plug, PlugFlags, PlugId, PlugKind, PlugParent, PlugSpec, PlugSpecBody,
};
pub use value::{Value, ValueType};
pub use metadata::Metadata;
