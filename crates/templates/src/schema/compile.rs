//! Folding path strings into a schema tree.

use std::collections::BTreeMap;

use super::{Node, PathConflict, Shape};

/// Mutable tree used while merging.
///
/// `terminal` is tracked apart from the shape: a path ending at a position
/// widens it to a wildcard, while the shape is still kept so that later paths
/// are checked for list/map disagreements no matter the merge order.
#[derive(Debug, Default)]
struct Draft {
    terminal: bool,
    shape: DraftShape,
}

#[derive(Debug, Default)]
enum DraftShape {
    #[default]
    Open,
    Map(BTreeMap<String, Draft>),
    List(Box<Draft>),
}

impl DraftShape {
    fn kind(&self) -> Option<Shape> {
        match self {
            DraftShape::Open => None,
            DraftShape::Map(_) => Some(Shape::Map),
            DraftShape::List(_) => Some(Shape::List),
        }
    }
}

pub(super) fn build<'a, I>(paths: I) -> Result<Node, PathConflict>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut root = Draft::default();
    for path in paths {
        merge(&mut root, path, path, 0)?;
    }
    Ok(freeze(root))
}

fn merge(node: &mut Draft, full: &str, rest: &str, consumed: usize) -> Result<(), PathConflict> {
    if rest.is_empty() {
        node.terminal = true;
        return Ok(());
    }

    if let Some(tail) = rest.strip_prefix('.') {
        return merge(node, full, tail, consumed + 1);
    }

    if let Some(tail) = rest.strip_prefix("[]") {
        if matches!(node.shape, DraftShape::Open) {
            node.shape = DraftShape::List(Box::default());
        }
        return match &mut node.shape {
            DraftShape::List(element) => merge(element, full, tail, consumed + 2),
            other => Err(conflict(full, consumed, Shape::List, other)),
        };
    }

    let split = match (rest.find('.'), rest.find("[]")) {
        (Some(dot), Some(brackets)) => dot.min(brackets),
        (Some(dot), None) => dot,
        (None, Some(brackets)) => brackets,
        (None, None) => rest.len(),
    };
    let (key, tail) = rest.split_at(split);

    if matches!(node.shape, DraftShape::Open) {
        node.shape = DraftShape::Map(BTreeMap::new());
    }
    match &mut node.shape {
        DraftShape::Map(children) => {
            let child = children.entry(key.to_string()).or_default();
            merge(child, full, tail, consumed + split)
        }
        other => Err(conflict(full, consumed, Shape::Map, other)),
    }
}

fn conflict(full: &str, consumed: usize, expected: Shape, found: &DraftShape) -> PathConflict {
    let position = full[..consumed].trim_matches('.');
    PathConflict {
        path: full.to_string(),
        position: if position.is_empty() {
            "<root>".to_string()
        } else {
            position.to_string()
        },
        expected,
        found: found.kind().unwrap_or(expected),
    }
}

fn freeze(draft: Draft) -> Node {
    if draft.terminal {
        return Node::Wildcard;
    }
    match draft.shape {
        DraftShape::Open => Node::Wildcard,
        DraftShape::Map(children) => Node::Mapping(
            children
                .into_iter()
                .map(|(key, child)| (key, freeze(child)))
                .collect(),
        ),
        DraftShape::List(element) => Node::Sequence(Box::new(freeze(*element))),
    }
}
