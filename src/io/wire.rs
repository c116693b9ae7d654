//! Persisted/transferable node representation.
//!
//! [`NodeData`] is the wire record for both initial bulk loads and
//! lazy-load responses: a plain ordered-field record with the node's
//! key, flags, and an open bag of caller-defined data fields. It must
//! round-trip: a node converted with [`crate::Tree::to_node_data`] and
//! reloaded reproduces the same observable tree (barring auto keys).
//!
//! Payloads come in two encodings: the "nested" form (child arrays),
//! and a "flat" positional form that compresses wide trees by replacing
//! per-record objects with positional value lists plus shortened key
//! names. The flat form is decompressed into nested records before any
//! normal parsing happens.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TreeError;
use crate::tree::{NodeId, StatusNodeType, Tree};

fn is_false(v: &bool) -> bool {
    !*v
}

/// Wire record for one node (optionally with nested children).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_key: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "is_false")]
    pub expanded: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub selected: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub lazy: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub unselectable: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub colspan: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub radiogroup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkbox: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_node_type: Option<StatusNodeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// Space-separated extra style classes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NodeData>>,
    /// Open bag of caller-defined fields.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Tree-wide defaults for nodes carrying a matching `type` tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TypeDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkbox: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unselectable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Column description for the render contract. Width negotiation is the
/// row host's concern; redefinitions still flow through loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
}

/// A decoded source payload: child records plus optional tree-wide
/// redefinitions embedded in the response.
#[derive(Debug, Default)]
pub struct SourcePayload {
    pub children: Vec<NodeData>,
    pub types: HashMap<String, TypeDef>,
    pub columns: Option<Vec<ColumnDef>>,
}

/// Meta keys understood at the top level of a payload object.
static PAYLOAD_META_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "_format",
        "_version",
        "_keyMap",
        "_positional",
        "_typeList",
        "children",
        "types",
        "columns",
    ]
    .into_iter()
    .collect()
});

/// Decodes a raw payload (`Value`) into child records and embedded
/// redefinitions. Accepts a bare array of records, a nested object
/// with a `children` property, or the flat positional encoding.
pub fn parse_payload(value: Value) -> Result<SourcePayload, TreeError> {
    match value {
        Value::Array(_) => {
            let children: Vec<NodeData> =
                serde_json::from_value(value).map_err(|e| TreeError::Parse(e.to_string()))?;
            Ok(SourcePayload {
                children,
                ..SourcePayload::default()
            })
        }
        Value::Object(mut obj) => {
            for key in obj.keys() {
                if !PAYLOAD_META_KEYS.contains(key.as_str()) {
                    tracing::debug!(key = %key, "ignoring unknown payload key");
                }
            }
            let flat = obj.get("_format").and_then(Value::as_str) == Some("flat");
            let children = if flat {
                decompress_flat(&obj)?
            } else {
                let raw = obj.remove("children").ok_or_else(|| {
                    TreeError::Parse("payload object must have a `children` property".to_string())
                })?;
                serde_json::from_value(raw).map_err(|e| TreeError::Parse(e.to_string()))?
            };
            let types = match obj.remove("types") {
                Some(raw) => {
                    serde_json::from_value(raw).map_err(|e| TreeError::Parse(e.to_string()))?
                }
                None => HashMap::new(),
            };
            let columns = match obj.remove("columns") {
                Some(raw) => Some(
                    serde_json::from_value(raw).map_err(|e| TreeError::Parse(e.to_string()))?,
                ),
                None => None,
            };
            Ok(SourcePayload {
                children,
                types,
                columns,
            })
        }
        other => Err(TreeError::Parse(format!(
            "payload must be an array or object, got {other}"
        ))),
    }
}

/// Expands the flat positional encoding back into nested records.
///
/// Entry layout: `[parentRef, v1, v2, ..., {extras}?]` where
/// `parentRef` is 0 for a top-level record or the 1-based index of an
/// earlier entry, positional values map onto the `_positional` field
/// names, and a trailing object carries non-positional fields with
/// `_keyMap`-shortened names.
fn decompress_flat(obj: &Map<String, Value>) -> Result<Vec<NodeData>, TreeError> {
    let positional: Vec<String> = match obj.get("_positional") {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| TreeError::Parse(format!("bad _positional list: {e}")))?,
        None => Vec::new(),
    };
    // The wire maps long -> short; invert for decoding.
    let mut expand: HashMap<String, String> = HashMap::new();
    if let Some(key_map) = obj.get("_keyMap").and_then(Value::as_object) {
        for (long, short) in key_map {
            if let Some(s) = short.as_str() {
                expand.insert(s.to_string(), long.clone());
            }
        }
    }
    let entries = obj
        .get("children")
        .and_then(Value::as_array)
        .ok_or_else(|| TreeError::Parse("flat payload must have a `children` array".to_string()))?;

    let mut records: Vec<Option<NodeData>> = Vec::with_capacity(entries.len());
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(entries.len());

    for (idx, entry) in entries.iter().enumerate() {
        let arr = entry.as_array().ok_or_else(|| {
            TreeError::Parse(format!("flat entry #{idx} must be an array"))
        })?;
        let parent_ref = arr.first().and_then(Value::as_u64).ok_or_else(|| {
            TreeError::Parse(format!("flat entry #{idx} must start with a parent reference"))
        })? as usize;
        let parent = if parent_ref == 0 {
            None
        } else if parent_ref <= idx {
            Some(parent_ref - 1)
        } else {
            return Err(TreeError::Parse(format!(
                "flat entry #{idx} references the later entry #{parent_ref}"
            )));
        };

        // Positional values are scalars; a trailing object is always
        // the extras record.
        let has_extras = arr.len() > 1 && arr[arr.len() - 1].is_object();
        let positional_end = if has_extras { arr.len() - 1 } else { arr.len() };
        let mut fields = Map::new();
        for (slot, name) in positional.iter().enumerate() {
            if 1 + slot >= positional_end {
                break;
            }
            let v = &arr[1 + slot];
            if !v.is_null() {
                fields.insert(name.clone(), v.clone());
            }
        }
        if has_extras {
            let extras = arr[arr.len() - 1].as_object().ok_or_else(|| {
                TreeError::Parse(format!("flat entry #{idx} has a non-object trailer"))
            })?;
            for (k, v) in extras {
                let long = expand.get(k).cloned().unwrap_or_else(|| k.clone());
                fields.insert(long, v.clone());
            }
        }
        let record: NodeData = serde_json::from_value(Value::Object(fields))
            .map_err(|e| TreeError::Parse(format!("flat entry #{idx}: {e}")))?;
        records.push(Some(record));
        parents.push(parent);
    }

    let mut child_lists: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut roots = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => child_lists[*p].push(i),
            None => roots.push(i),
        }
    }
    let mut out = Vec::with_capacity(roots.len());
    for r in roots {
        out.push(assemble(r, &mut records, &child_lists));
    }
    Ok(out)
}

fn assemble(
    idx: usize,
    records: &mut Vec<Option<NodeData>>,
    child_lists: &[Vec<usize>],
) -> NodeData {
    let mut record = match records[idx].take() {
        Some(r) => r,
        None => panic!("flat entry #{idx} assembled twice"),
    };
    for &c in &child_lists[idx] {
        record
            .children
            .get_or_insert_with(Vec::new)
            .push(assemble(c, records, child_lists));
    }
    record
}

impl Tree {
    /// Converts a node back into its wire record.
    ///
    /// Status nodes are transient and never serialized; with
    /// `recursive`, the children list mirrors the loaded child state
    /// (`None` for unloaded lazy nodes, `[]` for loaded-empty).
    pub fn to_node_data(&self, id: NodeId, recursive: bool) -> Option<NodeData> {
        let node = self.node(id)?;
        let mut d = NodeData {
            key: Some(node.key().to_string()),
            ref_key: node.ref_key().map(str::to_string),
            title: node.title.clone(),
            expanded: node.expanded,
            selected: node.is_selected(),
            lazy: node.lazy,
            unselectable: node.unselectable,
            colspan: node.colspan,
            radiogroup: node.radiogroup,
            checkbox: node.checkbox,
            status_node_type: node.status_node_type(),
            tooltip: node.tooltip.clone(),
            node_type: node.node_type.clone(),
            classes: if node.extra_classes.is_empty() {
                None
            } else {
                Some(node.extra_classes.join(" "))
            },
            children: None,
            data: node.data.clone(),
        };
        if recursive {
            if let Some(child_ids) = node.child_ids() {
                let mut children = Vec::new();
                for &c in child_ids {
                    if self.node_ref(c).is_status_node() {
                        continue;
                    }
                    if let Some(cd) = self.to_node_data(c, true) {
                        children.push(cd);
                    }
                }
                d.children = Some(children);
            }
        }
        Some(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_data_round_trip_with_extras() {
        let raw = json!({
            "key": "k1",
            "refKey": "r1",
            "title": "Node",
            "expanded": true,
            "lazy": true,
            "type": "folder",
            "classes": "wide bold",
            "author": "unknown",
            "year": 1970
        });
        let d: NodeData = serde_json::from_value(raw).unwrap();
        assert_eq!(d.key.as_deref(), Some("k1"));
        assert_eq!(d.node_type.as_deref(), Some("folder"));
        assert!(d.expanded && d.lazy);
        assert_eq!(d.data["author"], "unknown");

        let back = serde_json::to_value(&d).unwrap();
        assert_eq!(back["refKey"], "r1");
        assert_eq!(back["year"], 1970);
        // Unset flags stay off the wire.
        assert!(back.get("selected").is_none());
    }

    #[test]
    fn test_parse_payload_bare_array() {
        let payload = json!([{"title": "a"}, {"title": "b", "children": [{"title": "b1"}]}]);
        let parsed = parse_payload(payload).unwrap();
        assert_eq!(parsed.children.len(), 2);
        let b = &parsed.children[1];
        assert_eq!(b.children.as_ref().unwrap()[0].title, "b1");
    }

    #[test]
    fn test_parse_payload_object_with_types_and_columns() {
        let payload = json!({
            "types": {"folder": {"checkbox": false, "classes": "wb-folder"}},
            "columns": [{"id": "*", "title": "Name"}, {"id": "size"}],
            "children": [{"title": "a", "type": "folder"}]
        });
        let parsed = parse_payload(payload).unwrap();
        assert_eq!(parsed.children.len(), 1);
        assert_eq!(parsed.types["folder"].checkbox, Some(false));
        assert_eq!(parsed.columns.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_payload_rejects_scalar() {
        assert!(parse_payload(json!(42)).is_err());
        assert!(parse_payload(json!({"notChildren": []})).is_err());
    }

    #[test]
    fn test_flat_decompression_matches_nested() {
        let flat = json!({
            "_format": "flat",
            "_positional": ["title"],
            "_keyMap": {"refKey": "r", "lazy": "l"},
            "children": [
                [0, "Node 1"],
                [1, "Node 1.1", {"r": "x1"}],
                [1, "Node 1.2"],
                [0, "Node 2", {"l": true}]
            ]
        });
        let nested = json!([
            {"title": "Node 1", "children": [
                {"title": "Node 1.1", "refKey": "x1"},
                {"title": "Node 1.2"}
            ]},
            {"title": "Node 2", "lazy": true}
        ]);
        let a = parse_payload(flat).unwrap();
        let b = parse_payload(nested).unwrap();
        assert_eq!(
            serde_json::to_value(&a.children).unwrap(),
            serde_json::to_value(&b.children).unwrap()
        );
    }

    #[test]
    fn test_flat_forward_reference_rejected() {
        let flat = json!({
            "_format": "flat",
            "_positional": ["title"],
            "children": [[2, "a"], [0, "b"]]
        });
        assert!(parse_payload(flat).is_err());
    }
}
