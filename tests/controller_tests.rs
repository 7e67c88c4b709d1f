//! Controller tests against real sources through the in-process dispatcher.

use std::fs;
use std::sync::Arc;
use taskboard::adapter::{self, AdapterKind};
use taskboard::config::Config;
use taskboard::controller::Controller;
use taskboard::dispatch::Dispatcher;
use taskboard::error::ErrorCode;
use taskboard::protocol::{Feature, ProtocolRegistry, TagAction};
use taskboard::types::Priority;
use tempfile::TempDir;

fn connect(kind: AdapterKind, source: &str) -> Controller {
    let config = Config::default();
    let registry = Arc::new(ProtocolRegistry::standard());
    let dispatcher = Dispatcher::new(registry.clone(), adapter::open(kind, &config));
    Controller::connect(
        Box::new(dispatcher),
        registry,
        &config.protocol.versions,
        source,
        kind.is_local(),
    )
    .unwrap_or_else(|e| panic!("connect failed: {:?}", e))
}

fn vtodo_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("one.ics"),
        "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nUID:one\r\nSUMMARY:First\r\nEND:VTODO\r\nEND:VCALENDAR\r\n",
    )
    .unwrap();
    dir
}

#[test]
fn vtodo_ids_are_stable_across_mutations() {
    let dir = vtodo_dir();
    let mut controller = connect(AdapterKind::Vtodo, &dir.path().to_string_lossy());
    assert!(!controller.has_feature(Feature::AutogeneratedNodeIds));

    let updated = controller
        .move_nodes(vec!["one".into()], "__category___all__next")
        .unwrap();
    assert_eq!(updated, Some(1));
    controller.change_prio("one", Priority::High).unwrap();
    controller
        .change_tags("one", vec!["errand".into()], TagAction::Add)
        .unwrap();

    assert_eq!(controller.generation(), 0);
    let node = controller.node("one").unwrap();
    assert_eq!(node.priority, Priority::High);
    assert_eq!(node.tags, vec!["next", "errand"]);
    let next: Vec<_> = controller
        .children("__category___all__next")
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(next, vec!["one"]);
    let roots: Vec<_> = controller.roots().map(|r| r.id.as_str()).collect();
    assert_eq!(
        roots,
        vec!["__category___all", "__category_errand", "__category_next"]
    );
}

#[test]
fn add_and_delete_refresh_the_cache() {
    let dir = vtodo_dir();
    let mut controller = connect(AdapterKind::Vtodo, &dir.path().to_string_lossy());
    controller
        .add_node("Second", "__category___all__todo", Priority::Medium, vec![])
        .unwrap();
    assert_eq!(controller.children("__category___all__todo").count(), 2);

    let second = controller
        .children("__category___all__todo")
        .find(|n| n.label == "Second")
        .unwrap()
        .id
        .clone();
    controller.delete_nodes(vec![second.clone()]).unwrap();
    assert!(controller.node(&second).is_none());
    assert_eq!(controller.children("__category___all__todo").count(), 1);
}

#[test]
fn vtodo_directory_goes_stale_on_new_file() {
    let dir = vtodo_dir();
    let controller = connect(AdapterKind::Vtodo, &dir.path().to_string_lossy());
    assert!(!controller.is_stale());

    let path = dir.path().join("two.ics");
    fs::write(
        &path,
        "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nUID:two\r\nSUMMARY:Second\r\nEND:VTODO\r\nEND:VCALENDAR\r\n",
    )
    .unwrap();
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(120);
    fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(later)
        .unwrap();
    assert!(controller.is_stale());
}

#[test]
fn todotxt_mutations_bump_generation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("todo.txt");
    fs::write(&path, "buy milk @shop\n").unwrap();
    let mut controller = connect(AdapterKind::Todotxt, &path.to_string_lossy());
    assert!(controller.has_feature(Feature::AutogeneratedNodeIds));

    let milk = controller
        .board()
        .nodes()
        .find(|n| n.label == "buy milk")
        .unwrap()
        .id
        .clone();
    controller.change_label(&milk, "buy oat milk").unwrap();
    assert_eq!(controller.generation(), 1);
    assert!(controller.node(&milk).is_none());
    assert_eq!(fs::read_to_string(&path).unwrap(), "buy oat milk @shop\n");

    let err = controller
        .change_description(&milk, Some("x"))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidCommand);
    assert_eq!(controller.generation(), 1);
}

#[test]
fn missing_source_fails_to_connect() {
    let config = Config::default();
    let registry = Arc::new(ProtocolRegistry::standard());
    let dispatcher = Dispatcher::new(registry.clone(), adapter::open(AdapterKind::Markdown, &config));
    let err = Controller::connect(
        Box::new(dispatcher),
        registry,
        &config.protocol.versions,
        "/definitely/not/here.md",
        true,
    )
    .err()
    .unwrap();
    assert_eq!(err.code, ErrorCode::SourceNotFound);
}
