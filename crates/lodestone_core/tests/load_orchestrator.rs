mod common;

use lodestone_core::{
    BoxError, GroupOutcome, LoadError, LoadOrchestrator, Loader, LocalFileSource, Source, Store,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug)]
struct FakeSource {
    identifier: String,
    token: Arc<std::sync::Mutex<Result<String, String>>>,
}

impl FakeSource {
    fn new(identifier: &str, token: &str) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.to_string(),
            token: Arc::new(std::sync::Mutex::new(Ok(token.to_string()))),
        })
    }

    fn set_token(&self, token: &str) {
        *self.token.lock().unwrap() = Ok(token.to_string());
    }

    fn fail(&self, message: &str) {
        *self.token.lock().unwrap() = Err(message.to_string());
    }
}

impl Source for FakeSource {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn freshness_token(&self) -> Result<String, BoxError> {
        self.token.lock().unwrap().clone().map_err(BoxError::from)
    }
}

fn dependency(source: &Arc<FakeSource>) -> Arc<dyn Source> {
    Arc::clone(source) as Arc<dyn Source>
}

struct CountingLoader {
    name: String,
    sources: Vec<Arc<dyn Source>>,
    runs: Rc<Cell<usize>>,
    fail_times: usize,
    log: Rc<RefCell<Vec<String>>>,
}

impl CountingLoader {
    fn new(name: &str, sources: Vec<Arc<dyn Source>>) -> (Self, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let loader = Self {
            name: name.to_string(),
            sources,
            runs: Rc::clone(&runs),
            fail_times: 0,
            log: Rc::new(RefCell::new(Vec::new())),
        };
        (loader, runs)
    }

    fn failing(mut self, times: usize) -> Self {
        self.fail_times = times;
        self
    }

    fn logging_to(mut self, log: &Rc<RefCell<Vec<String>>>) -> Self {
        self.log = Rc::clone(log);
        self
    }
}

impl Loader for CountingLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependent_sources(&self) -> Vec<Arc<dyn Source>> {
        self.sources.clone()
    }

    fn load(&mut self, store: &mut Store) -> Result<(), BoxError> {
        self.runs.set(self.runs.get() + 1);
        self.log.borrow_mut().push(self.name.clone());
        if self.fail_times > 0 {
            self.fail_times -= 1;
            return Err(format!("{} exploded", self.name).into());
        }
        let mut entity = common::tagged(store, &[self.name.as_str()]);
        store.update(&mut entity)?;
        Ok(())
    }
}

#[test]
fn unchanged_source_loads_only_once() {
    let mut store = common::memory_store();
    let source = FakeSource::new("museum.csv", "v1");
    let (loader, runs) = CountingLoader::new("museum", vec![dependency(&source)]);

    let mut orchestrator = LoadOrchestrator::new();
    orchestrator.register(vec![Box::new(loader)]);

    let first = orchestrator.run_all(&mut store);
    assert_eq!(first.loaded(), 1);
    let second = orchestrator.run_all(&mut store);
    assert_eq!(second.up_to_date(), 1);
    assert_eq!(runs.get(), 1);

    let record = store.freshness("museum.csv").unwrap();
    assert_eq!(record.freshness_token.as_deref(), Some("v1"));
    assert!(record.last_success.is_some());
}

#[test]
fn changed_token_triggers_reload() {
    let mut store = common::memory_store();
    let source = FakeSource::new("museum.csv", "v1");
    let (loader, runs) = CountingLoader::new("museum", vec![dependency(&source)]);

    let mut orchestrator = LoadOrchestrator::new();
    orchestrator.register(vec![Box::new(loader)]);
    orchestrator.run_all(&mut store);

    source.set_token("v2");
    orchestrator.run_all(&mut store);
    assert_eq!(runs.get(), 2);
    assert_eq!(store.freshness("museum.csv").unwrap().freshness_token.as_deref(), Some("v2"));
}

#[test]
fn empty_token_still_loads_on_first_encounter() {
    let mut store = common::memory_store();
    let source = FakeSource::new("static.csv", "");
    let (loader, runs) = CountingLoader::new("static", vec![dependency(&source)]);

    let mut orchestrator = LoadOrchestrator::new();
    orchestrator.register(vec![Box::new(loader)]);

    let first = orchestrator.run_all(&mut store);
    assert_eq!(first.loaded(), 1);
    assert_eq!(runs.get(), 1);
    assert_eq!(store.freshness("static.csv").unwrap().freshness_token.as_deref(), Some(""));

    let second = orchestrator.run_all(&mut store);
    assert_eq!(second.up_to_date(), 1);
    assert_eq!(runs.get(), 1);
}

#[test]
fn group_without_sources_always_loads() {
    let mut store = common::memory_store();
    let (loader, runs) = CountingLoader::new("always", Vec::new());

    let mut orchestrator = LoadOrchestrator::new();
    orchestrator.register(vec![Box::new(loader)]);
    for _ in 0..3 {
        assert!(orchestrator.run_all(&mut store).is_success());
    }
    assert_eq!(runs.get(), 3);
}

#[test]
fn failing_loader_leaves_freshness_and_group_retries() {
    let mut store = common::memory_store();
    let source = FakeSource::new("library.csv", "v1");
    let (first, first_runs) = CountingLoader::new("first", vec![dependency(&source)]);
    let (second, second_runs) = CountingLoader::new("second", vec![dependency(&source)]);
    let second = second.failing(1);

    let mut orchestrator = LoadOrchestrator::new();
    orchestrator.register(vec![Box::new(first), Box::new(second)]);

    let report = orchestrator.run_all(&mut store);
    assert!(!report.is_success());
    match &report.groups[0].outcome {
        GroupOutcome::Failed(LoadError::Loader { loader, .. }) => assert_eq!(loader, "second"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(store.freshness("library.csv").unwrap().freshness_token.is_none());

    let report = orchestrator.run_all(&mut store);
    assert!(report.is_success());
    assert_eq!(first_runs.get(), 2);
    assert_eq!(second_runs.get(), 2);
    assert_eq!(store.freshness("library.csv").unwrap().freshness_token.as_deref(), Some("v1"));

    orchestrator.run_all(&mut store);
    assert_eq!(first_runs.get(), 2);
}

#[test]
fn failed_group_does_not_affect_other_groups() {
    let mut store = common::memory_store();
    let broken_source = FakeSource::new("broken", "v1");
    let healthy_source = FakeSource::new("healthy", "v1");
    let (broken, _) = CountingLoader::new("broken", vec![dependency(&broken_source)]);
    let (healthy, healthy_runs) = CountingLoader::new("healthy", vec![dependency(&healthy_source)]);

    let mut orchestrator = LoadOrchestrator::new();
    orchestrator.register(vec![Box::new(broken.failing(usize::MAX))]);
    orchestrator.register(vec![Box::new(healthy)]);

    let report = orchestrator.run_all(&mut store);
    assert_eq!(report.failures().count(), 1);
    assert_eq!(report.loaded(), 1);
    assert_eq!(healthy_runs.get(), 1);
    assert_eq!(store.freshness("healthy").unwrap().freshness_token.as_deref(), Some("v1"));
    assert!(store.freshness("broken").unwrap().freshness_token.is_none());

    let err = report.into_result().unwrap_err();
    assert_eq!(err.group(), 0);
}

#[test]
fn token_failure_fails_the_group_without_loading() {
    let mut store = common::memory_store();
    let source = FakeSource::new("remote", "v1");
    source.fail("unreachable");
    let (loader, runs) = CountingLoader::new("remote", vec![dependency(&source)]);

    let mut orchestrator = LoadOrchestrator::new();
    orchestrator.register(vec![Box::new(loader)]);
    let report = orchestrator.run_all(&mut store);

    assert!(matches!(
        report.groups[0].outcome,
        GroupOutcome::Failed(LoadError::Freshness { .. })
    ));
    assert_eq!(runs.get(), 0);
}

#[test]
fn groups_run_in_registration_order() {
    let mut store = common::memory_store();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (a, _) = CountingLoader::new("a", Vec::new());
    let (b, _) = CountingLoader::new("b", Vec::new());
    let (c, _) = CountingLoader::new("c", Vec::new());

    let mut orchestrator = LoadOrchestrator::new();
    orchestrator.register(vec![Box::new(b.logging_to(&log))]);
    orchestrator.register(vec![Box::new(a.logging_to(&log)), Box::new(c.logging_to(&log))]);
    orchestrator.run_all(&mut store);

    assert_eq!(*log.borrow(), vec!["b", "a", "c"]);
}

#[test]
fn shared_source_is_checked_once_per_group() {
    let mut store = common::memory_store();
    let source = FakeSource::new("shared", "v1");
    let (first, _) = CountingLoader::new("first", vec![dependency(&source)]);
    let (second, _) = CountingLoader::new("second", vec![dependency(&source)]);

    let mut orchestrator = LoadOrchestrator::new();
    let group = orchestrator.register(vec![Box::new(first), Box::new(second)]);
    assert_eq!(group, 0);
    let report = orchestrator.run_all(&mut store);
    assert_eq!(report.groups[0].loaders, vec!["first", "second"]);
    assert_eq!(report.loaded(), 1);

    let filter = store.filter("Record").unwrap();
    assert_eq!(store.count(&[filter]).unwrap(), 2);
}

#[test]
fn local_file_source_reloads_after_modification() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("objects.csv");
    std::fs::write(&path, "id\n1\n").unwrap();

    let mut store = common::memory_store();
    let source: Arc<dyn Source> = Arc::new(LocalFileSource::new(&path).unwrap());
    let (loader, runs) = CountingLoader::new("objects", vec![source]);

    let mut orchestrator = LoadOrchestrator::new();
    orchestrator.register(vec![Box::new(loader)]);
    orchestrator.run_all(&mut store);
    orchestrator.run_all(&mut store);
    assert_eq!(runs.get(), 1);

    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
    file.set_modified(later).unwrap();
    drop(file);

    orchestrator.run_all(&mut store);
    assert_eq!(runs.get(), 2);
}
