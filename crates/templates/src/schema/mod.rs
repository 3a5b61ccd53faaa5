//! Variable path schemas.
//!
//! A template references data through paths such as `customer.orders[].total`:
//! `.` descends into a map by key and `[]` descends into every element of a
//! list. All paths found in a template are folded into one immutable [`Node`]
//! tree which can then check caller data for missing structure before a render.

mod compile;
mod validate;


use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use stencil_core::TemplateData;

// ── Tree ────────────────────────────────────────────────────────────

/// Shape expected at one position of the template data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Anything is accepted here, including nested structures.
    Wildcard,
    /// A map that must contain every listed key.
    Mapping(BTreeMap<String, Node>),
    /// A list whose every element must match the inner node.
    Sequence(Box<Node>),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Wildcard => f.write_str("*"),
            Node::Sequence(inner) => write!(f, "[{}]", inner),
            Node::Mapping(children) => {
                f.write_str("{")?;
                for (i, (key, child)) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, child)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Compiled variable paths and fragment references of one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    root: Node,
    variables: BTreeSet<String>,
    fragment_names: BTreeSet<String>,
}

impl Schema {
    /// Fold every variable path into a schema tree.
    ///
    /// The result does not depend on the order of `paths`, and duplicates
    /// have no effect. Fails when two paths disagree about whether a
    /// position holds a list or a map.
    pub fn compile<P, F>(paths: P, fragment_names: F) -> Result<Self, PathConflict>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        let variables: BTreeSet<String> =
            paths.into_iter().map(|p| p.as_ref().to_string()).collect();
        let root = compile::build(&variables)?;
        Ok(Self {
            root,
            variables,
            fragment_names: fragment_names
                .into_iter()
                .map(|f| f.as_ref().to_string())
                .collect(),
        })
    }

    /// Schema that accepts any data and references no fragments.
    pub fn empty() -> Self {
        Self {
            root: Node::Wildcard,
            variables: BTreeSet::new(),
            fragment_names: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    pub fn fragment_names(&self) -> &BTreeSet<String> {
        &self.fragment_names
    }

    /// Collect every missing piece of structure in `data`.
    ///
    /// Extra keys are allowed and leaf values are never inspected.
    pub fn validate(&self, data: &Value) -> Vec<SchemaError> {
        let mut errors = Vec::new();
        validate::walk(&self.root, data, String::new(), &mut errors);
        errors
    }

    /// Like [`validate`](Self::validate) but folds all errors into one.
    pub fn throw_when_invalid(&self, data: &TemplateData) -> Result<(), InvalidData> {
        let errors = self.validate(data.as_value());
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InvalidData { errors })
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────

/// What kind of structure a position holds, as implied by the paths seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Map,
    List,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Map => f.write_str("map"),
            Shape::List => f.write_str("list"),
        }
    }
}

/// Two variable paths imply both a list and a map at the same position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("path '{path}' expects a {expected} at '{position}' but another path declared a {found}")]
pub struct PathConflict {
    /// The path that could not be merged.
    pub path: String,
    /// Position of the disagreement, `<root>` for the top level.
    pub position: String,
    pub expected: Shape,
    pub found: Shape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaErrorKind {
    ExpectedMap,
    ExpectedKey(String),
    ExpectedList,
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaErrorKind::ExpectedMap => f.write_str("Expected map"),
            SchemaErrorKind::ExpectedKey(key) => write!(f, "Expected key {}", key),
            SchemaErrorKind::ExpectedList => f.write_str("Expected list"),
        }
    }
}

/// One piece of structure missing from template data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    /// Location in the data, e.g. `a.x[0]`. Empty for the top level.
    pub path: String,
    pub kind: SchemaErrorKind,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} at <root>", self.kind)
        } else {
            write!(f, "{} at {}", self.kind, self.path)
        }
    }
}

/// Template data failed validation; carries every individual error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidData {
    pub errors: Vec<SchemaError>,
}

impl fmt::Display for InvalidData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Schema error: \n")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for InvalidData {}
