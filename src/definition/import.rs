//! Parse definition bytes, upgrading older schema versions on the way.

use tracing::warn;

use super::{migrate, Definition, CURRENT_SCHEMA_VERSION, FORMAT_TAG, MIN_SCHEMA_VERSION};
use crate::reference::LoadIssue;
use crate::{Error, Result};

/// Parse a definition, discarding migration issues.
pub fn import(bytes: &[u8]) -> Result<Definition> {
    import_with_issues(bytes).map(|(def, _)| def)
}

/// Parse a definition and report what the migration chain had to drop.
pub fn import_with_issues(bytes: &[u8]) -> Result<(Definition, Vec<LoadIssue>)> {
    let tree: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::MalformedDefinition(format!("not a JSON document: {e}")))?;

    let format = tree.get("format").and_then(|f| f.as_str());
    if format != Some(FORMAT_TAG) {
        return Err(Error::MalformedDefinition(format!(
            "expected format '{FORMAT_TAG}', found {}",
            format.map_or_else(|| "none".to_string(), |f| format!("'{f}'"))
        )));
    }

    let version = tree
        .get("schema_version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::MalformedDefinition("missing schema_version".into()))?;
    let version = u32::try_from(version)
        .ok()
        .filter(|v| (MIN_SCHEMA_VERSION..=CURRENT_SCHEMA_VERSION).contains(v))
        .ok_or_else(|| {
            Error::MalformedDefinition(format!(
                "unsupported schema version {version} \
                 (supported {MIN_SCHEMA_VERSION}..={CURRENT_SCHEMA_VERSION})"
            ))
        })?;

    let (tree, issues) = migrate::upgrade(tree, version)?;
    for issue in &issues {
        warn!(%issue, "definition migration");
    }
    let def: Definition = serde_json::from_value(tree)
        .map_err(|e| Error::MalformedDefinition(format!("invalid definition: {e}")))?;
    Ok((def, issues))
}
