//! Plain-text engine with `{{ path }}` placeholders.
//!
//! A small [`TemplateEngine`] for UTF-8 text:
//!
//! - `{{ customer.name }}` substitutes a scalar value from the data,
//! - `{{ total | money }}` pipes the value through a registered function,
//! - `{{> footer }}` inlines the fragment named `footer`.
//!
//! Placeholder paths feed the template schema, so missing data is reported
//! before rendering starts. List paths (`items[]`) are accepted by the schema
//! but cannot be substituted as text.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use stencil_core::{EvalError, ParseError, PrepareOptions, TemplateData};

use crate::engine::{CompiledSource, FunctionRegistry, TemplateEngine};

const MAX_FRAGMENT_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Variable { path: String, filter: Option<String> },
    Fragment(String),
}

/// Compiled plain-text template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainTemplate {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextEngine;

impl PlainTextEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compile template text without touching the filesystem.
    pub fn compile_str(
        &self,
        source: &Path,
        text: &str,
        options: &PrepareOptions,
    ) -> Result<CompiledSource<PlainTemplate>, ParseError> {
        let segments = parse(source, text, options.only_includes())?;

        let mut variables = Vec::new();
        let mut fragments = Vec::new();
        for segment in &segments {
            match segment {
                Segment::Variable { path, .. } => variables.push(path.clone()),
                Segment::Fragment(name) => fragments.push(name.clone()),
                Segment::Text(_) => {}
            }
        }

        Ok(CompiledSource::new(PlainTemplate { segments })
            .with_variables(variables)
            .with_fragment_names(fragments))
    }
}

impl TemplateEngine for PlainTextEngine {
    type Compiled = PlainTemplate;
    type Output = String;

    fn compile(
        &self,
        source: &Path,
        options: &PrepareOptions,
    ) -> Result<CompiledSource<PlainTemplate>, ParseError> {
        let text = fs::read_to_string(source).map_err(|e| ParseError::new(source, e.to_string()))?;
        self.compile_str(source, &text, options)
    }

    fn render(
        &self,
        template: &PlainTemplate,
        fragments: &BTreeMap<&str, &PlainTemplate>,
        data: &TemplateData,
        functions: &FunctionRegistry,
    ) -> Result<String, EvalError> {
        let mut out = String::new();
        render_into(&mut out, template, fragments, data, functions, 0)?;
        Ok(out)
    }
}

fn parse(source: &Path, text: &str, only_includes: bool) -> Result<Vec<Segment>, ParseError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        literal.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| ParseError::new(source, "unterminated placeholder, missing '}}'"))?;
        let raw = &rest[start..start + 2 + end + 2];
        let inner = after[..end].trim();
        rest = &after[end + 2..];

        if inner.is_empty() {
            return Err(ParseError::new(source, "empty placeholder"));
        }

        if let Some(name) = inner.strip_prefix('>') {
            let name = name.trim();
            if name.is_empty() {
                return Err(ParseError::new(source, "fragment include without a name"));
            }
            flush(&mut segments, &mut literal);
            segments.push(Segment::Fragment(name.to_string()));
        } else if only_includes {
            literal.push_str(raw);
        } else {
            let (path, filter) = match inner.split_once('|') {
                Some((path, filter)) => (path.trim(), Some(filter.trim().to_string())),
                None => (inner, None),
            };
            if path.is_empty() || path.contains(char::is_whitespace) {
                return Err(ParseError::new(source, format!("invalid variable path '{}'", path)));
            }
            flush(&mut segments, &mut literal);
            segments.push(Segment::Variable {
                path: path.to_string(),
                filter,
            });
        }
    }
    literal.push_str(rest);
    flush(&mut segments, &mut literal);
    Ok(segments)
}

fn flush(segments: &mut Vec<Segment>, literal: &mut String) {
    if !literal.is_empty() {
        segments.push(Segment::Text(std::mem::take(literal)));
    }
}

fn render_into(
    out: &mut String,
    template: &PlainTemplate,
    fragments: &BTreeMap<&str, &PlainTemplate>,
    data: &TemplateData,
    functions: &FunctionRegistry,
    depth: usize,
) -> Result<(), EvalError> {
    if depth > MAX_FRAGMENT_DEPTH {
        return Err(EvalError::new("fragments are nested too deeply"));
    }
    for segment in &template.segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Variable { path, filter } => {
                let value = lookup(data.as_value(), path)?;
                let value = match filter {
                    Some(name) => functions.call(name, std::slice::from_ref(value))?,
                    None => value.clone(),
                };
                out.push_str(&to_text(&value));
            }
            Segment::Fragment(name) => {
                let fragment = fragments
                    .get(name.as_str())
                    .ok_or_else(|| EvalError::new(format!("fragment '{}' is not available", name)))?;
                render_into(out, fragment, fragments, data, functions, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn lookup<'a>(data: &'a Value, path: &str) -> Result<&'a Value, EvalError> {
    if path.contains("[]") {
        return Err(EvalError::new(format!("list path '{}' cannot be substituted as text", path)));
    }
    path.split('.')
        .filter(|key| !key.is_empty())
        .try_fold(data, |value, key| value.get(key))
        .ok_or_else(|| EvalError::missing_value(path))
}

fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TemplateFunction;
    use serde_json::json;

    struct Upper;

    impl TemplateFunction for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
            match args {
                [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
                _ => Err(EvalError::new("upper expects one string")),
            }
        }
    }

    fn compile(text: &str) -> CompiledSource<PlainTemplate> {
        PlainTextEngine::new()
            .compile_str(Path::new("t.txt"), text, &PrepareOptions::new())
            .unwrap()
    }

    fn data(value: Value) -> TemplateData {
        TemplateData::from_value(value).unwrap()
    }

    #[test]
    fn collects_variables_and_fragments() {
        let compiled = compile("Dear {{ customer.name }}, {{ items[].sku }} {{> footer }}");
        assert!(compiled.variables.contains("customer.name"));
        assert!(compiled.variables.contains("items[].sku"));
        assert!(compiled.fragment_names.contains("footer"));
    }

    #[test]
    fn renders_scalars_and_functions() {
        let engine = PlainTextEngine::new();
        let compiled = compile("{{ who | upper }} owes {{ amount }}{{ note }}.");
        let mut functions = FunctionRegistry::new();
        functions.register(Upper);

        let out = engine
            .render(
                &compiled.value,
                &BTreeMap::new(),
                &data(json!({"who": "ada", "amount": 12.5, "note": null})),
                &functions,
            )
            .unwrap();
        assert_eq!(out, "ADA owes 12.5.");
    }

    #[test]
    fn renders_fragments_inline() {
        let engine = PlainTextEngine::new();
        let body = compile("Hi {{ name }}\n{{> footer }}");
        let footer = compile("-- {{ sender }}");
        let fragments = BTreeMap::from([("footer", &footer.value)]);

        let out = engine
            .render(
                &body.value,
                &fragments,
                &data(json!({"name": "Bo", "sender": "Acme"})),
                &FunctionRegistry::new(),
            )
            .unwrap();
        assert_eq!(out, "Hi Bo\n-- Acme");
    }

    #[test]
    fn render_errors() {
        let engine = PlainTextEngine::new();
        let none = FunctionRegistry::new();
        let empty = BTreeMap::new();

        let missing = compile("{{ a.b }}");
        let err = engine.render(&missing.value, &empty, &data(json!({"a": {}})), &none).unwrap_err();
        assert_eq!(err, EvalError::missing_value("a.b"));

        let list = compile("{{ rows[] }}");
        assert!(engine.render(&list.value, &empty, &data(json!({"rows": []})), &none).is_err());

        let unknown_fn = compile("{{ a | nope }}");
        let err = engine.render(&unknown_fn.value, &empty, &data(json!({"a": 1})), &none).unwrap_err();
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn self_including_fragment_is_bounded() {
        let engine = PlainTextEngine::new();
        let looping = compile("{{> again }}");
        let fragments = BTreeMap::from([("again", &looping.value)]);
        let err = engine
            .render(&looping.value, &fragments, &TemplateData::empty(), &FunctionRegistry::new())
            .unwrap_err();
        assert!(err.message.contains("too deeply"));
    }

    #[test]
    fn only_includes_keeps_variables_literal() {
        let compiled = PlainTextEngine::new()
            .compile_str(
                Path::new("t.txt"),
                "{{ name }} and {{> footer }}",
                &PrepareOptions::new().with_only_includes(),
            )
            .unwrap();
        assert!(compiled.variables.is_empty());
        assert_eq!(
            compiled.value.segments,
            vec![
                Segment::Text("{{ name }} and ".to_string()),
                Segment::Fragment("footer".to_string()),
            ]
        );
    }

    #[test]
    fn parse_errors() {
        let engine = PlainTextEngine::new();
        let opts = PrepareOptions::new();
        for bad in ["{{ open", "{{ }}", "{{> }}", "{{ two words }}"] {
            let err = engine.compile_str(Path::new("bad.txt"), bad, &opts).unwrap_err();
            assert_eq!(err.source_path, Path::new("bad.txt"));
        }
    }
}
