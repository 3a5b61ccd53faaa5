//! Prepared templates and fragments: compiled, reusable, closeable handles.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::debug;

use stencil_core::{PrepareOptions, TemplateData, TemplateFormat};

use crate::engine::{CompiledSource, TemplateEngine};
use crate::error::{Result, TemplateError};
use crate::lifecycle::{AlreadyClosed, LifecycleGuard};
use crate::schema::{PathConflict, Schema, SchemaError};

/// Identity of a source file at the moment it was compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    path: PathBuf,
    modified: SystemTime,
}

impl SourceInfo {
    /// Read the current modification time of `path`.
    pub fn stat(path: &Path) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            modified: modified_time(path)?,
        })
    }

    pub fn new(path: impl Into<PathBuf>, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Whether the file on disk was modified after this snapshot.
    /// A file that can no longer be stat-ed counts as changed.
    pub fn is_stale(&self) -> bool {
        match modified_time(&self.path) {
            Ok(current) => current > self.modified,
            Err(_) => true,
        }
    }
}

pub(crate) fn modified_time(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

// ── Templates ───────────────────────────────────────────────────────

/// A compiled template that can be rendered many times until closed.
pub struct PreparedTemplate<T> {
    compiled: T,
    source: SourceInfo,
    format: TemplateFormat,
    created_at: DateTime<Utc>,
    schema: Schema,
    guard: LifecycleGuard,
}

impl<T> PreparedTemplate<T> {
    /// Wrap engine output. On a schema conflict the engine cleanup runs
    /// right away since no handle will own it.
    pub fn new(
        source: SourceInfo,
        format: TemplateFormat,
        compiled: CompiledSource<T>,
    ) -> std::result::Result<Self, PathConflict> {
        let CompiledSource {
            value,
            variables,
            fragment_names,
            cleanup,
        } = compiled;

        let schema = match Schema::compile(&variables, &fragment_names) {
            Ok(schema) => schema,
            Err(conflict) => {
                if let Some(cleanup) = cleanup {
                    cleanup();
                }
                return Err(conflict);
            }
        };

        Ok(Self {
            compiled: value,
            source,
            format,
            created_at: Utc::now(),
            schema,
            guard: cleanup.map_or_else(LifecycleGuard::noop, LifecycleGuard::new),
        })
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn format(&self) -> TemplateFormat {
        self.format
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Every piece of structure `data` lacks for this template.
    pub fn validate(&self, data: &TemplateData) -> std::result::Result<Vec<SchemaError>, AlreadyClosed> {
        self.guard.run(|| self.schema.validate(data.as_value()))
    }

    /// Fail with one aggregate error when `data` lacks required structure.
    pub fn throw_when_invalid(&self, data: &TemplateData) -> Result<()> {
        self.guard.run(|| self.schema.throw_when_invalid(data))??;
        Ok(())
    }

    /// Run `f` against the compiled value while the template is held open.
    pub fn with_compiled<R>(&self, f: impl FnOnce(&T) -> R) -> std::result::Result<R, AlreadyClosed> {
        self.guard.run(|| f(&self.compiled))
    }

    /// Release engine resources. Waits for in-flight uses; later uses fail.
    /// Returns `false` if the template was already closed.
    pub fn close(&self) -> bool {
        let closed = self.guard.close();
        if closed {
            debug!(path = %self.source.path.display(), "closed prepared template");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    pub(crate) fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }

    /// Compiled value without liveness check; callers hold the guard.
    pub(crate) fn compiled(&self) -> &T {
        &self.compiled
    }
}

impl<T> fmt::Debug for PreparedTemplate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedTemplate")
            .field("path", &self.source.path)
            .field("format", &self.format)
            .field("created_at", &self.created_at)
            .field("closed", &self.guard.is_closed())
            .finish()
    }
}

// ── Fragments ───────────────────────────────────────────────────────

/// A compiled document part that templates can embed by name.
pub struct PreparedFragment<T> {
    name: String,
    compiled: T,
    source: SourceInfo,
    created_at: DateTime<Utc>,
    fragment_names: BTreeSet<String>,
    guard: LifecycleGuard,
}

impl<T> PreparedFragment<T> {
    pub fn new(name: impl Into<String>, source: SourceInfo, compiled: CompiledSource<T>) -> Self {
        Self {
            name: name.into(),
            compiled: compiled.value,
            source,
            created_at: Utc::now(),
            fragment_names: compiled.fragment_names,
            guard: compiled
                .cleanup
                .map_or_else(LifecycleGuard::noop, LifecycleGuard::new),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Fragments this fragment includes in turn.
    pub fn fragment_names(&self) -> &BTreeSet<String> {
        &self.fragment_names
    }

    pub fn with_compiled<R>(&self, f: impl FnOnce(&T) -> R) -> std::result::Result<R, AlreadyClosed> {
        self.guard.run(|| f(&self.compiled))
    }

    pub fn close(&self) -> bool {
        let closed = self.guard.close();
        if closed {
            debug!(fragment = %self.name, path = %self.source.path.display(), "closed prepared fragment");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    pub(crate) fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }

    pub(crate) fn compiled(&self) -> &T {
        &self.compiled
    }
}

impl<T> fmt::Debug for PreparedFragment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedFragment")
            .field("name", &self.name)
            .field("path", &self.source.path)
            .field("closed", &self.guard.is_closed())
            .finish()
    }
}

// ── Preparation ─────────────────────────────────────────────────────

/// Compile a template file with `engine`.
///
/// The modification time is read before compiling, so a write that races
/// the compile makes the result look stale rather than fresh.
pub fn prepare_template<E: TemplateEngine>(
    engine: &E,
    path: &Path,
    options: &PrepareOptions,
) -> Result<PreparedTemplate<E::Compiled>> {
    let format = TemplateFormat::from_path(path)
        .ok_or_else(|| TemplateError::UnsupportedFormat(path.to_path_buf()))?;
    let source = SourceInfo::stat(path)?;
    let compiled = engine.compile(path, options)?;
    let template = PreparedTemplate::new(source, format, compiled)?;

    debug!(
        path = %path.display(),
        format = %format,
        variables = template.schema.variables().len(),
        fragments = template.schema.fragment_names().len(),
        "prepared template"
    );
    Ok(template)
}

/// Compile a fragment file with `engine`. The fragment is named after the
/// file stem.
pub fn prepare_fragment<E: TemplateEngine>(
    engine: &E,
    path: &Path,
    options: &PrepareOptions,
) -> Result<PreparedFragment<E::Compiled>> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| TemplateError::InvalidOptions(format!("cannot name fragment from {}", path.display())))?
        .to_string();
    let source = SourceInfo::stat(path)?;
    let compiled = engine.compile_fragment(path, options)?;

    debug!(fragment = %name, path = %path.display(), "prepared fragment");
    Ok(PreparedFragment::new(name, source, compiled))
}
