//! End-to-end wire protocol tests through the dispatcher.

use serde_json::{Value, json};
use std::fs;
use std::sync::Arc;
use taskboard::adapter::{self, AdapterKind};
use taskboard::config::Config;
use taskboard::dispatch::Dispatcher;
use taskboard::protocol::ProtocolRegistry;
use tempfile::TempDir;

fn dispatcher(kind: AdapterKind) -> Dispatcher {
    Dispatcher::new(
        Arc::new(ProtocolRegistry::standard()),
        adapter::open(kind, &Config::default()),
    )
}

fn request(command: &str, source: &str, arguments: Value) -> Value {
    json!({
        "command": command,
        "source": source,
        "version": "1",
        "arguments": arguments,
    })
}

fn error_code(response: &Value) -> &str {
    response["data"]["error"]["code"].as_str().unwrap_or_default()
}

/// Find the id of the first node with `label` in a v1 board object.
fn id_of(board: &Value, label: &str) -> String {
    board
        .as_object()
        .unwrap()
        .iter()
        .find(|(_, node)| node["label"] == label)
        .map(|(id, _)| id.clone())
        .unwrap_or_else(|| panic!("no node labelled {}", label))
}

#[test]
fn markdown_session_over_the_wire() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.md");
    fs::write(&path, "# Todo\n\n- laundry\n\n# Done\n").unwrap();
    let source = path.to_string_lossy().into_owned();
    let dispatcher = dispatcher(AdapterKind::Markdown);

    let loaded = dispatcher.handle_value(&request("load_all", &source, json!({})));
    assert_eq!(loaded["status"], "ok");
    let board = &loaded["data"];
    let laundry = id_of(board, "laundry");
    assert_eq!(board[&laundry]["prio"], 2);
    assert_eq!(board[&laundry]["pos"], 0);

    let moved = dispatcher.handle_value(&request(
        "move_nodes",
        &source,
        json!({"item_ids": [laundry], "target_column": id_of(board, "Done")}),
    ));
    assert_eq!(moved["status"], "ok");
    assert_eq!(moved["features"], json!(["autogenerate_node_ids"]));
    assert_eq!(fs::read_to_string(&path).unwrap(), "# Todo\n\n# Done\n\n- laundry\n");
}

#[test]
fn missing_arguments_are_reported_by_field() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.md");
    fs::write(&path, "# Todo\n").unwrap();
    let source = path.to_string_lossy().into_owned();

    let response = dispatcher(AdapterKind::Markdown)
        .handle_value(&request("change_label", &source, json!({"item_id": "x"})));
    assert_eq!(response["status"], "fail");
    assert_eq!(error_code(&response), "MISSING_REQUIRED_FIELD");
    assert_eq!(response["data"]["error"]["field"], "new_label");

    let response = dispatcher(AdapterKind::Markdown).handle_value(&request(
        "change_prio",
        &source,
        json!({"item_id": "x", "prio": 7}),
    ));
    assert_eq!(error_code(&response), "INVALID_FIELD_VALUE");
}

#[test]
fn vtodo_move_reports_updated_count() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("t.ics"),
        "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nUID:t1\r\nSUMMARY:Task\r\nEND:VTODO\r\nEND:VCALENDAR\r\n",
    )
    .unwrap();
    let source = dir.path().to_string_lossy().into_owned();
    let dispatcher = dispatcher(AdapterKind::Vtodo);

    let args = json!({"item_ids": ["t1"], "target_column": "__category___all__done"});
    let first = dispatcher.handle_value(&request("move_nodes", &source, args.clone()));
    assert_eq!(first["data"], json!({"updated": 1}));
    let second = dispatcher.handle_value(&request("move_nodes", &source, args));
    assert_eq!(second["data"], json!({"updated": 0}));
    assert!(second.get("features").is_none());
}

#[test]
fn tag_actions_over_the_wire() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("t.ics"),
        "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nUID:t1\r\nSUMMARY:Task\r\nCATEGORIES:a,b\r\nEND:VTODO\r\nEND:VCALENDAR\r\n",
    )
    .unwrap();
    let source = dir.path().to_string_lossy().into_owned();
    let dispatcher = dispatcher(AdapterKind::Vtodo);
    let tags = |dispatcher: &Dispatcher| -> Value {
        let loaded = dispatcher.handle_value(&request("load_all", &source, json!({})));
        loaded["data"]["t1"]["tags"].clone()
    };

    let add = request("change_tags", &source, json!({"item_id": "t1", "tags": ["b", "c"], "action": "add"}));
    assert_eq!(dispatcher.handle_value(&add)["status"], "ok");
    assert_eq!(tags(&dispatcher), json!(["a", "b", "c"]));

    let remove = request("change_tags", &source, json!({"item_id": "t1", "tags": ["a"], "action": "remove"}));
    dispatcher.handle_value(&remove);
    assert_eq!(tags(&dispatcher), json!(["b", "c"]));

    let clear = request("change_tags", &source, json!({"item_id": "t1", "action": "clear"}));
    dispatcher.handle_value(&clear);
    assert_eq!(tags(&dispatcher), json!([]));

    let bogus = request("change_tags", &source, json!({"item_id": "t1", "tags": [], "action": "toggle"}));
    assert_eq!(error_code(&dispatcher.handle_value(&bogus)), "INVALID_FIELD_VALUE");
}

#[test]
fn github_rejects_mutations_before_the_network() {
    let response = dispatcher(AdapterKind::Github).handle_value(&request(
        "delete_nodes",
        "owner/repo",
        json!({"item_ids": ["x"]}),
    ));
    assert_eq!(error_code(&response), "INVALID_COMMAND");
}
