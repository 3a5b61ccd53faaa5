//! Tests for the template cache.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use stencil_core::TemplateFormat;

use super::*;
use crate::engine::CompiledSource;
use crate::error::TemplateError;
use crate::prepared::SourceInfo;

/// Counts compiles and closes across every template it produces.
#[derive(Default)]
struct Counters {
    compiled: AtomicUsize,
    closed: AtomicUsize,
}

impl Counters {
    fn compile(self: &Arc<Self>, path: &Path) -> Result<PreparedTemplate<usize>> {
        let n = self.compiled.fetch_add(1, Ordering::SeqCst) + 1;
        let counters = Arc::clone(self);
        let source = CompiledSource::new(n)
            .with_variables(["name"])
            .on_close(move || {
                counters.closed.fetch_add(1, Ordering::SeqCst);
            });
        Ok(PreparedTemplate::new(SourceInfo::stat(path)?, TemplateFormat::Txt, source)?)
    }

    fn compiled(&self) -> usize {
        self.compiled.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

fn setup() -> (TempDir, std::path::PathBuf, TemplateCache<usize>, Arc<Counters>) {
    let dir = TempDir::new().expect("create tempdir");
    let path = dir.path().join("letter.txt");
    fs::write(&path, "Hello {{ name }}").unwrap();
    (dir, path, TemplateCache::new(), Arc::new(Counters::default()))
}

/// Push the file's modification time forward without relying on clock granularity.
fn touch_forward(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}

#[test]
fn unchanged_source_returns_same_instance() {
    let (_dir, path, cache, counters) = setup();

    let first = cache.get(&path, |p| counters.compile(p)).unwrap();
    let second = cache.get(&path, |p| counters.compile(p)).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counters.compiled(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(&path));
}

#[test]
fn modified_source_closes_old_and_recompiles() {
    let (_dir, path, cache, counters) = setup();

    let first = cache.get(&path, |p| counters.compile(p)).unwrap();
    touch_forward(&path, 10);
    let second = cache.get(&path, |p| counters.compile(p)).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(counters.compiled(), 2);
    assert_eq!(counters.closed(), 1);
    assert_eq!(second.with_compiled(|n| *n), Ok(2));
    assert!(matches!(
        first.throw_when_invalid(&stencil_core::TemplateData::empty()),
        Err(TemplateError::AlreadyClosed(_))
    ));
}

#[test]
fn closed_entry_is_recompiled() {
    let (_dir, path, cache, counters) = setup();

    let first = cache.get(&path, |p| counters.compile(p)).unwrap();
    first.close();
    let second = cache.get(&path, |p| counters.compile(p)).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(counters.compiled(), 2);
    assert_eq!(counters.closed(), 1);
}

#[test]
fn failed_recompile_leaves_entry_empty() {
    let (_dir, path, cache, counters) = setup();

    let first = cache.get(&path, |p| counters.compile(p)).unwrap();
    fs::remove_file(&path).unwrap();

    let result = cache.get(&path, |p| counters.compile(p));
    assert!(matches!(result, Err(TemplateError::Io(_))));
    assert!(first.is_closed());
    assert!(!cache.contains(&path));
    assert!(cache.is_empty());
}

#[test]
fn concurrent_stale_lookups_compile_once() {
    let (_dir, path, cache, counters) = setup();
    let cache = Arc::new(cache);

    let first = cache.get(&path, |p| counters.compile(p)).unwrap();
    touch_forward(&path, 10);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let counters = Arc::clone(&counters);
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get(&path, |p| {
                        thread::sleep(Duration::from_millis(20));
                        counters.compile(p)
                    })
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(first.is_closed());
    assert_eq!(counters.compiled(), 2);
    assert_eq!(counters.closed(), 1);
    for r in &results {
        assert!(Arc::ptr_eq(r, &results[0]));
        assert!(!r.is_closed());
    }
}

#[test]
fn insert_replaces_and_closes_previous() {
    let (_dir, path, cache, counters) = setup();

    let first = Arc::new(counters.compile(&path).unwrap());
    cache.insert(Arc::clone(&first));
    cache.insert(Arc::clone(&first));
    assert!(!first.is_closed(), "re-inserting the same template must not close it");

    let second = Arc::new(counters.compile(&path).unwrap());
    cache.insert(Arc::clone(&second));
    assert!(first.is_closed());

    let hit = cache.get(&path, |p| counters.compile(p)).unwrap();
    assert!(Arc::ptr_eq(&hit, &second));
    assert_eq!(counters.compiled(), 2);
}

#[test]
fn invalidate_and_clear_close_templates() {
    let (dir, path, cache, counters) = setup();
    let other = dir.path().join("invoice.txt");
    fs::write(&other, "Total").unwrap();

    let a = cache.get(&path, |p| counters.compile(p)).unwrap();
    let b = cache.get(&other, |p| counters.compile(p)).unwrap();
    assert_eq!(cache.len(), 2);

    assert!(cache.invalidate(&path));
    assert!(!cache.invalidate(&path));
    assert!(a.is_closed());
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(b.is_closed());
    assert!(cache.is_empty());
    assert_eq!(counters.closed(), 2);
}

#[test]
fn prepare_uses_engine_and_rejects_unknown_formats() {
    let (dir, path, _cache, _counters) = setup();
    let engine = crate::plain::PlainTextEngine::new();
    let options = PrepareOptions::new();

    let cache_text: TemplateCache<crate::plain::PlainTemplate> = TemplateCache::new();
    let first = cache_text.prepare(&engine, &path, &options).unwrap();
    let again = cache_text.prepare(&engine, &path, &options).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert!(first.schema().variables().contains("name"));

    let unknown = dir.path().join("logo.png");
    fs::write(&unknown, "binary").unwrap();
    let err = cache_text.prepare(&engine, &unknown, &options).unwrap_err();
    assert!(matches!(err, TemplateError::UnsupportedFormat(_)));
    assert!(!cache_text.contains(&unknown));
}

fn slot_count<T>(cache: &TemplateCache<T>) -> usize {
    cache.slots.read().unwrap().len()
}

#[test]
fn failed_lookups_leave_no_slots_behind() {
    let (dir, _path, cache, counters) = setup();

    for i in 0..50 {
        let missing = dir.path().join(format!("missing-{}.txt", i));
        assert!(cache.get(&missing, |p| counters.compile(p)).is_err());
    }
    assert_eq!(cache.len(), 0);
    assert_eq!(slot_count(&cache), 0);
    assert_eq!(counters.compiled(), 0);
}

#[test]
fn failed_recompile_removes_slot() {
    let (_dir, path, cache, counters) = setup();

    cache.get(&path, |p| counters.compile(p)).unwrap();
    fs::remove_file(&path).unwrap();
    assert!(cache.get(&path, |p| counters.compile(p)).is_err());
    assert_eq!(slot_count(&cache), 0);

    fs::write(&path, "back again").unwrap();
    let revived = cache.get(&path, |p| counters.compile(p)).unwrap();
    assert!(!revived.is_closed());
    assert_eq!(slot_count(&cache), 1);
}

#[test]
fn invalidate_and_clear_drop_slots() {
    let (dir, path, cache, counters) = setup();
    let other = dir.path().join("invoice.txt");
    fs::write(&other, "Total").unwrap();

    cache.get(&path, |p| counters.compile(p)).unwrap();
    cache.get(&other, |p| counters.compile(p)).unwrap();
    assert_eq!(slot_count(&cache), 2);

    cache.invalidate(&path);
    assert_eq!(slot_count(&cache), 1);

    cache.clear();
    assert_eq!(slot_count(&cache), 0);

    // The cache stays usable after its slots were dropped.
    let again = cache.get(&other, |p| counters.compile(p)).unwrap();
    assert!(cache.contains(&other));
    assert!(!again.is_closed());
}

#[test]
fn concurrent_lookups_during_clear_stay_consistent() {
    let (_dir, path, cache, counters) = setup();
    let cache = Arc::new(cache);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads + 1));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let counters = Arc::clone(&counters);
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    cache.get(&path, |p| counters.compile(p)).unwrap();
                }
            })
        })
        .collect();

    barrier.wait();
    for _ in 0..20 {
        cache.clear();
    }
    for h in handles {
        h.join().unwrap();
    }

    // Whatever survived is the single live template for the path.
    let last = cache.get(&path, |p| counters.compile(p)).unwrap();
    assert!(!last.is_closed());
    assert_eq!(slot_count(&cache), 1);
    assert_eq!(counters.compiled() - counters.closed(), 1);
}

#[test]
fn busy_slot_is_not_retired() {
    let slot: Slot<String> = Mutex::new(SlotState::default());

    let held = slot.lock().unwrap();
    assert!(!retire_if_empty(&slot), "a locked slot is left for its holder");
    drop(held);
    assert!(!slot.lock().unwrap().retired);

    assert!(retire_if_empty(&slot));
    assert!(slot.lock().unwrap().retired);
}
