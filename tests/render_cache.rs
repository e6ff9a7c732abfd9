//! Integration tests for output caching: hits, signals, expiry, once
//! semantics and named content through cache replay

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use spindle::runtime::ManualClock;
use spindle::{
    BasicEvaluator, CacheSignal, Engine, Error, InMemoryCacheService, InMemoryViewFolder,
    RenderContext, RenderError, Settings, Value,
};

struct Fixture {
    engine: Engine,
    clock: Arc<ManualClock>,
    service: Arc<InMemoryCacheService>,
    counter: Arc<AtomicI64>,
    evaluator: BasicEvaluator,
}

impl Fixture {
    fn new(template: &str) -> Self {
        let clock = Arc::new(ManualClock::new(Duration::from_secs(1_000)));
        let service = Arc::new(InMemoryCacheService::new(clock.clone()));
        let folder = InMemoryViewFolder::new().with_view("home/index.spark", template);
        let engine = Engine::new(Arc::new(folder), Settings::default()).with_cache_service(service.clone());

        let counter = Arc::new(AtomicI64::new(0));
        let ticks = counter.clone();
        let evaluator = BasicEvaluator::new()
            .with_function("tick", move |_| Ok(Value::Int(ticks.fetch_add(1, Ordering::SeqCst) + 1)));

        Self {
            engine,
            clock,
            service,
            counter,
            evaluator,
        }
    }

    fn render_with(&self, context: RenderContext) -> Result<String, Error> {
        let mut context = context;
        self.engine
            .render("home/index.spark", &self.evaluator, &mut context)?;
        Ok(context.into_output())
    }

    fn render(&self) -> String {
        self.render_with(RenderContext::new()).expect("should render")
    }
}

#[test]
fn test_cache_hit_freezes_counter_until_signal_fires() {
    let fixture = Fixture::new("<cache key='\"k\"' signal='changed'>${tick()}</cache>");
    let signal = CacheSignal::new();
    let render = || {
        fixture
            .render_with(RenderContext::new().with_view_data("changed", signal.clone()))
            .expect("should render")
    };

    assert_eq!(render(), "1");
    assert_eq!(render(), "1");
    assert_eq!(fixture.counter.load(Ordering::SeqCst), 1);

    signal.fire();
    assert_eq!(render(), "2");
    assert_eq!(render(), "2");
    assert_eq!(fixture.counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_inner_hit_is_replayed_into_outer_miss() {
    let fixture = Fixture::new(
        "<cache key='\"outer\"' signal='changed'>O${tick()}<cache key='\"inner\"'>I${tick()}</cache></cache>|<cache key='\"h\"'>H${tick()}</cache>",
    );
    let signal = CacheSignal::new();
    let render = || {
        fixture
            .render_with(RenderContext::new().with_view_data("changed", signal.clone()))
            .expect("should render")
    };

    assert_eq!(render(), "O1I2|H3");
    assert_eq!(render(), "O1I2|H3");

    signal.fire();
    assert_eq!(render(), "O4I2|H3");
    assert_eq!(render(), "O4I2|H3");
    assert_eq!(fixture.counter.load(Ordering::SeqCst), 4);
    assert_eq!(fixture.service.len(), 3);
}

#[test]
fn test_once_survives_cache_replay() {
    let fixture = Fixture::new("<cache key='1'><test once='script'>A</test></cache><test once='script'>B</test>");
    assert_eq!(fixture.render(), "A");
    // the second render replays the memento instead of running the body
    assert_eq!(fixture.render(), "A");
    assert_eq!(fixture.service.len(), 1);
}

#[test]
fn test_named_content_is_replayed_once() {
    let fixture = Fixture::new(
        "<cache key='1'><content name='head'>H${tick()}</content>B${tick()}</cache>|<use content='head'/>",
    );
    assert_eq!(fixture.render(), "B2|H1");
    assert_eq!(fixture.render(), "B2|H1");
}

#[test]
fn test_cache_inside_content_is_not_duplicated() {
    let fixture = Fixture::new(
        "<content name='head'><cache key='1'>H${tick()}</cache></content>X<use content='head'/>",
    );
    assert_eq!(fixture.render(), "XH1");
    assert_eq!(fixture.render(), "XH1");
}

#[test]
fn test_relative_expiry() {
    let fixture = Fixture::new("<cache key='1' expires='60'>${tick()}</cache>");
    assert_eq!(fixture.render(), "1");
    fixture.clock.advance(Duration::from_secs(59));
    assert_eq!(fixture.render(), "1");
    fixture.clock.advance(Duration::from_secs(1));
    assert_eq!(fixture.render(), "2");
}

#[test]
fn test_distinct_key_tuples_are_distinct_entries() {
    let fixture = Fixture::new("<cache key='a, b'>${tick()}</cache>");
    let render = |a: &str, b: &str| {
        fixture
            .render_with(RenderContext::new().with_view_data("a", a).with_view_data("b", b))
            .expect("should render")
    };
    assert_eq!(render("1", "2"), "1");
    assert_eq!(render("1", "2"), "1");
    assert_eq!(render("12", ""), "2");
    assert_eq!(render("1", "2"), "1");
    assert_eq!(fixture.service.len(), 2);
}

#[test]
fn test_key_errors_propagate() {
    let fixture = Fixture::new("<cache key='missing'>x</cache>");
    let err = fixture.render_with(RenderContext::new()).expect_err("should fail");
    assert!(matches!(
        err,
        Error::Render(RenderError::UnknownVariable { ref name }) if name == "missing"
    ));
    assert!(fixture.service.is_empty());
}

#[test]
fn test_body_errors_propagate_and_store_nothing() {
    let fixture = Fixture::new("<cache key='1'>${tick()}${missing}</cache>");
    let err = fixture.render_with(RenderContext::new()).expect_err("should fail");
    assert!(matches!(err, Error::Render(RenderError::UnknownVariable { .. })));
    assert!(fixture.service.is_empty());

    let err = fixture.render_with(RenderContext::new()).expect_err("should fail again");
    assert!(matches!(err, Error::Render(_)));
    assert_eq!(fixture.counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_separate_cache_sites_do_not_collide() {
    let fixture = Fixture::new("<cache key='1'>${tick()}</cache>,<cache key='1'>${tick()}</cache>");
    assert_eq!(fixture.render(), "1,2");
    assert_eq!(fixture.render(), "1,2");
}
