//! Schema migration chain.
//!
//! Each step upgrades a raw JSON tree by exactly one version, so the
//! reconciliation engine only ever sees the current schema.
//!
//! | From | To | Change |
//! |------|----|--------|
//! | 1 | 2 | post-hoc `values` assignments folded into plug specs; legacy `fileName` plug dropped |
//! | 2 | 3 | `serialiser:*Version` root metadata moved into `producer` |

use serde_json::{json, Map, Value as Json};

use super::CURRENT_SCHEMA_VERSION;
use crate::model::Value;
use crate::reference::LoadIssue;
use crate::{Error, Result};

/// Boundary plug every schema-1 reference carried; it has no successor.
const LEGACY_FILE_NAME_PLUG: &str = "fileName";

const LEGACY_VERSION_KEYS: [(&str, &str); 4] = [
    ("serialiser:milestoneVersion", "milestone"),
    ("serialiser:majorVersion", "major"),
    ("serialiser:minorVersion", "minor"),
    ("serialiser:patchVersion", "patch"),
];

/// Upgrade `tree` from schema `from` to the current schema.
pub fn upgrade(mut tree: Json, from: u32) -> Result<(Json, Vec<LoadIssue>)> {
    let mut issues = Vec::new();
    let mut version = from;
    while version < CURRENT_SCHEMA_VERSION {
        let root = tree
            .as_object_mut()
            .ok_or_else(|| Error::MalformedDefinition("definition is not a JSON object".into()))?;
        match version {
            1 => v1_to_v2(root, &mut issues)?,
            2 => v2_to_v3(root),
            other => {
                return Err(Error::MalformedDefinition(format!("no migration from schema {other}")));
            }
        }
        version += 1;
        root.insert("schema_version".into(), json!(version));
    }
    Ok((tree, issues))
}

fn v1_to_v2(root: &mut Map<String, Json>, issues: &mut Vec<LoadIssue>) -> Result<()> {
    if let Some(Json::Array(boundary)) = root.get_mut("boundary") {
        boundary.retain(|p| p.get("name").and_then(Json::as_str) != Some(LEGACY_FILE_NAME_PLUG));
    }

    let assignments = match root.remove("values") {
        None | Some(Json::Null) => Vec::new(),
        Some(Json::Array(values)) => values,
        Some(_) => {
            return Err(Error::MalformedDefinition("legacy 'values' must be a list".into()));
        }
    };

    let mut tree = Json::Object(std::mem::take(root));
    for entry in assignments {
        let Some(path) = entry.get("plug").and_then(Json::as_str) else {
            return Err(Error::MalformedDefinition("legacy value without a plug path".into()));
        };
        if path == LEGACY_FILE_NAME_PLUG {
            continue;
        }
        let value = entry.get("value").cloned().unwrap_or(Json::Null);
        let target = match pointer_for(&tree, path) {
            Some(ptr) => tree.pointer_mut(&ptr),
            None => None,
        };
        match target {
            Some(Json::Object(spec)) if spec.get("kind").and_then(Json::as_str) == Some("leaf") => {
                spec.insert("value".into(), value);
            }
            _ => issues.push(LoadIssue::BoundaryPlugMissingOnLegacyDefinition {
                plug: path.to_string(),
            }),
        }
    }
    if let Json::Object(map) = tree {
        *root = map;
    }
    Ok(())
}

fn v2_to_v3(root: &mut Map<String, Json>) {
    let mut producer = json!({ "milestone": 0, "major": 0, "minor": 0, "patch": 0 });
    if let Some(Json::Object(metadata)) = root.get_mut("metadata") {
        for (key, field) in LEGACY_VERSION_KEYS {
            let Some(raw) = metadata.remove(key) else { continue };
            let number = raw.as_u64().or_else(|| {
                serde_json::from_value::<Value>(raw)
                    .ok()
                    .and_then(|v| v.as_int())
                    .and_then(|i| u64::try_from(i).ok())
            });
            if let Some(n) = number {
                producer[field] = json!(n);
            }
        }
    }
    root.insert("producer".into(), producer);
}

/// JSON pointer to the plug spec at dot `path` (relative to the root).
fn pointer_for(tree: &Json, path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('.').collect();
    let (first, rest) = segments.split_first()?;
    if let Some(i) = index_by_name(tree.get("boundary"), first) {
        return plug_pointer(&tree["boundary"][i], format!("/boundary/{i}"), rest);
    }
    let i = index_by_name(tree.get("nodes"), first)?;
    node_pointer(&tree["nodes"][i], format!("/nodes/{i}"), rest)
}

fn node_pointer(node: &Json, ptr: String, rest: &[&str]) -> Option<String> {
    let (segment, tail) = rest.split_first()?;
    if let Some(i) = index_by_name(node.get("children"), segment) {
        return node_pointer(&node["children"][i], format!("{ptr}/children/{i}"), tail);
    }
    let i = index_by_name(node.get("plugs"), segment)?;
    plug_pointer(&node["plugs"][i], format!("{ptr}/plugs/{i}"), tail)
}

fn plug_pointer(plug: &Json, ptr: String, rest: &[&str]) -> Option<String> {
    match rest.split_first() {
        None => Some(ptr),
        Some((segment, tail)) => {
            let i = index_by_name(plug.get("children"), segment)?;
            plug_pointer(&plug["children"][i], format!("{ptr}/children/{i}"), tail)
        }
    }
}

fn index_by_name(list: Option<&Json>, name: &str) -> Option<usize> {
    list?
        .as_array()?
        .iter()
        .position(|e| e.get("name").and_then(Json::as_str) == Some(name))
}
