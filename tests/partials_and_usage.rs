//! Integration tests for partials, sections and loop metadata detection

use std::sync::Arc;

use spindle::compiler::{Chunk, ForEachChunk};
use spindle::{
    BasicEvaluator, CompilerError, DetectUsage, Engine, Error, InMemoryViewFolder, RenderContext,
    Settings,
};

fn engine(views: &[(&str, &str)]) -> Engine {
    let folder = views
        .iter()
        .fold(InMemoryViewFolder::new(), |folder, (path, text)| folder.with_view(path, *text));
    Engine::new(Arc::new(folder), Settings::default())
}

fn find_loop(chunks: &[Chunk]) -> Option<&ForEachChunk> {
    chunks.iter().find_map(|chunk| match chunk {
        Chunk::ForEach(c) => Some(c),
        other => other.children().into_iter().find_map(find_loop),
    })
}

#[test]
fn test_loop_variable_used_only_in_partial_is_detected() {
    let engine = engine(&[
        ("home/index.spark", "<ul><for each='var item in items'><row/></for></ul>"),
        ("home/_row.spark", "<li>${itemIndex}:${item}</li>"),
    ]);
    let view = engine.compile("home/index.spark").expect("should compile");
    let each = find_loop(view.chunks()).expect("loop");

    let mut usage = DetectUsage::new(["itemIndex", "itemCount", "unrelated"]);
    usage.scan(&each.body);
    assert_eq!(
        usage.detected().collect::<Vec<_>>(),
        vec![("itemIndex", true), ("itemCount", false), ("unrelated", false)]
    );

    let mut context = RenderContext::new().with_view_data("items", vec!["a", "b"]);
    engine
        .render("home/index.spark", &BasicEvaluator::new(), &mut context)
        .expect("should render");
    assert_eq!(context.rendered(), "<ul><li>0:a</li><li>1:b</li></ul>");
}

#[test]
fn test_loop_metadata_through_a_section() {
    let engine = engine(&[
        (
            "home/index.spark",
            "<for each='var x in xs'><wrap><segment name='tail'><if condition='!xIsLast'>,</if></segment>${x}</wrap></for>",
        ),
        ("home/_wrap.spark", "<render/><render section='tail'/>"),
    ]);
    let mut context = RenderContext::new().with_view_data("xs", vec![1i64, 2, 3]);
    engine
        .render("home/index.spark", &BasicEvaluator::new(), &mut context)
        .expect("should render");
    assert_eq!(context.rendered(), "1,2,3");
}

#[test]
fn test_shared_partials_and_defaults() {
    let engine = engine(&[
        ("home/index.spark", "<layout title='\"Home\"'>main</layout>"),
        (
            "Shared/_layout.spark",
            "<h1>${title}</h1><render/><render section='footer'>(c)</render>",
        ),
    ]);
    let output = engine
        .render_to_string("home/index.spark", &BasicEvaluator::new())
        .expect("should render");
    assert_eq!(output, "<h1>Home</h1>main(c)");
}

#[test]
fn test_cyclic_partials_are_rejected() {
    let engine = engine(&[
        ("home/index.spark", "<a/>"),
        ("home/_a.spark", "<b/>"),
        ("home/_b.spark", "<a/>"),
    ]);
    let err = engine.compile("home/index.spark").expect_err("cycle");
    match err {
        Error::Compiler(CompilerError::CyclicPartial { chain }) => assert_eq!(
            chain,
            "home/index.spark -> home/_a.spark -> home/_b.spark -> home/_a.spark"
        ),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_namespaces_are_collected_once_per_file() {
    let engine = engine(&[
        (
            "home/index.spark",
            "<use namespace='App.Models'/><menu/><menu/><footer/>",
        ),
        ("Shared/_menu.spark", "<use namespace='App.Menu'/>m"),
        ("Shared/_footer.spark", "<use namespace='App.Menu'/><use namespace='App.Footer'/>f"),
    ]);
    let view = engine.compile("home/index.spark").expect("should compile");
    assert_eq!(view.timestamps.len(), 3);
    let mut namespaces = view.namespaces.clone();
    namespaces.sort();
    assert_eq!(namespaces, vec!["App.Footer", "App.Menu", "App.Models"]);
}
