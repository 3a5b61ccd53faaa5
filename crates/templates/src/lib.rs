//! Prepared templates with schema checks, safe closing, caching and hot-reload.
//!
//! This crate provides:
//! - Path schemas compiled from the variables a template references
//! - Prepared templates and fragments guarded so closing waits for in-flight renders
//! - A path-keyed cache that recompiles templates whose source changed
//! - A debounced, recursive directory watcher for hot-reload
//! - A plain-text engine implementing the engine seam

pub mod cache;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod plain;
pub mod prepared;
pub mod render;
pub mod schema;
pub mod watcher;

pub use cache::TemplateCache;
pub use engine::{CompiledSource, FunctionRegistry, TemplateEngine, TemplateFunction};
pub use error::{Result, TemplateError};
pub use lifecycle::{AlreadyClosed, LifecycleGuard};
pub use plain::{PlainTemplate, PlainTextEngine};
pub use prepared::{prepare_fragment, prepare_template, PreparedFragment, PreparedTemplate, SourceInfo};
pub use render::{render, Fragments};
pub use schema::{InvalidData, PathConflict, Schema, SchemaError};
pub use watcher::{DirectoryWatcher, ScanSummary, WatcherConfig};
