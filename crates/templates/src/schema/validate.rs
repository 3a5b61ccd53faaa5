//! Checking template data against a schema tree.

use serde_json::Value;

use super::{Node, SchemaError, SchemaErrorKind};

pub(super) fn walk(node: &Node, data: &Value, path: String, errors: &mut Vec<SchemaError>) {
    match node {
        Node::Wildcard => {}
        Node::Mapping(children) => {
            let Some(map) = data.as_object() else {
                errors.push(SchemaError {
                    path,
                    kind: SchemaErrorKind::ExpectedMap,
                });
                return;
            };
            for (key, child) in children {
                match map.get(key) {
                    Some(value) => walk(child, value, key_path(&path, key), errors),
                    None => errors.push(SchemaError {
                        path: path.clone(),
                        kind: SchemaErrorKind::ExpectedKey(key.clone()),
                    }),
                }
            }
        }
        Node::Sequence(element) => {
            let Some(items) = data.as_array() else {
                errors.push(SchemaError {
                    path,
                    kind: SchemaErrorKind::ExpectedList,
                });
                return;
            };
            for (i, item) in items.iter().enumerate() {
                walk(element, item, format!("{}[{}]", path, i), errors);
            }
        }
    }
}

fn key_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}
