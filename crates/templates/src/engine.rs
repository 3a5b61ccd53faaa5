//! Seam to the document engine that actually compiles and renders templates.
//!
//! The engine is a black box here: it turns a source file into an opaque
//! compiled value plus the variable paths and fragment names it found, and it
//! renders a compiled value against data.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use stencil_core::{EvalError, ParseError, PrepareOptions, TemplateData};

pub(crate) type Cleanup = Box<dyn FnOnce() + Send + Sync>;

/// What an engine produces for one source file.
pub struct CompiledSource<T> {
    pub value: T,
    /// Variable paths such as `customer.orders[].total`.
    pub variables: BTreeSet<String>,
    /// Names of fragments the source includes.
    pub fragment_names: BTreeSet<String>,
    pub(crate) cleanup: Option<Cleanup>,
}

impl<T> CompiledSource<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            variables: BTreeSet::new(),
            fragment_names: BTreeSet::new(),
            cleanup: None,
        }
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables.extend(variables.into_iter().map(Into::into));
        self
    }

    pub fn with_fragment_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fragment_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Action to run once the prepared resource is closed, e.g. removing a
    /// scratch directory the engine unpacked the source into.
    pub fn on_close(mut self, cleanup: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

impl<T: fmt::Debug> fmt::Debug for CompiledSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSource")
            .field("value", &self.value)
            .field("variables", &self.variables)
            .field("fragment_names", &self.fragment_names)
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// A document engine.
pub trait TemplateEngine: Send + Sync {
    type Compiled: Send + Sync + 'static;
    type Output;

    fn compile(
        &self,
        source: &Path,
        options: &PrepareOptions,
    ) -> Result<CompiledSource<Self::Compiled>, ParseError>;

    /// Compile a source meant to be embedded into other templates.
    fn compile_fragment(
        &self,
        source: &Path,
        options: &PrepareOptions,
    ) -> Result<CompiledSource<Self::Compiled>, ParseError> {
        self.compile(source, options)
    }

    fn render(
        &self,
        template: &Self::Compiled,
        fragments: &BTreeMap<&str, &Self::Compiled>,
        data: &TemplateData,
        functions: &FunctionRegistry,
    ) -> Result<Self::Output, EvalError>;
}

// ── Custom functions ────────────────────────────────────────────────

/// A function callable from template expressions.
pub trait TemplateFunction: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self, args: &[Value]) -> Result<Value, EvalError>;
}

/// Custom functions handed through to the engine on render.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn TemplateFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any previous one with the same name.
    pub fn register(&mut self, function: impl TemplateFunction + 'static) -> &mut Self {
        self.functions
            .insert(function.name().to_string(), Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TemplateFunction>> {
        self.functions.get(name)
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match self.functions.get(name) {
            Some(function) => function.call(args),
            None => Err(EvalError::new(format!("Did not find function for name {}", name))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}
