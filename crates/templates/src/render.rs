//! Rendering a prepared template together with its fragments.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use stencil_core::TemplateData;

use crate::engine::{FunctionRegistry, TemplateEngine};
use crate::error::{Result, TemplateError};
use crate::lifecycle::{run_all, LifecycleGuard};
use crate::prepared::{PreparedFragment, PreparedTemplate};

/// Fragments available to a render, keyed by the name templates include them by.
pub type Fragments<T> = BTreeMap<String, Arc<PreparedFragment<T>>>;

/// Validate `data`, then render `template` with `engine`.
///
/// The template and every fragment it reaches, directly or through other
/// fragments, stay open for the whole
/// engine call: their guards are taken template first, then fragments in
/// name order. Fails without rendering when data is missing structure, a
/// referenced fragment was not supplied, or any resource is already closed.
pub fn render<E: TemplateEngine>(
    engine: &E,
    template: &PreparedTemplate<E::Compiled>,
    fragments: &Fragments<E::Compiled>,
    data: &TemplateData,
    functions: &FunctionRegistry,
) -> Result<E::Output> {
    template.throw_when_invalid(data)?;

    let used = resolve_fragments(template, fragments)?;

    let mut guards: Vec<&LifecycleGuard> = Vec::with_capacity(used.len() + 1);
    guards.push(template.guard());
    guards.extend(used.values().map(|f| f.guard()));

    let compiled_fragments: BTreeMap<&str, &E::Compiled> = used
        .iter()
        .map(|(name, fragment)| (*name, fragment.compiled()))
        .collect();

    debug!(
        path = %template.path().display(),
        fragments = compiled_fragments.len(),
        "rendering template"
    );

    let output = run_all(&guards, || {
        engine.render(template.compiled(), &compiled_fragments, data, functions)
    })??;
    Ok(output)
}

/// Collect the fragments reachable from `template`, failing on the first
/// name that was not supplied.
fn resolve_fragments<'a, T>(
    template: &'a PreparedTemplate<T>,
    fragments: &'a Fragments<T>,
) -> Result<BTreeMap<&'a str, &'a PreparedFragment<T>>> {
    let mut used: BTreeMap<&str, &PreparedFragment<T>> = BTreeMap::new();
    let mut pending: Vec<&String> = template.schema().fragment_names().iter().collect();

    while let Some(name) = pending.pop() {
        if used.contains_key(name.as_str()) {
            continue;
        }
        let fragment = fragments
            .get(name)
            .ok_or_else(|| TemplateError::MissingFragment(name.clone()))?;
        used.insert(name.as_str(), fragment.as_ref());
        pending.extend(fragment.fragment_names());
    }
    Ok(used)
}
