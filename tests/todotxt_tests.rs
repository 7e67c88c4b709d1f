//! Integration tests for the todo.txt adapter.

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use taskboard::adapter::todotxt::TodoTxtAdapter;
use taskboard::adapter::{Adapter, Outcome};
use taskboard::error::ErrorCode;
use taskboard::protocol::{BoardCommand, TagAction};
use taskboard::types::{Board, Priority};
use tempfile::TempDir;

const TODO: &str = "\
(A) 2024-01-10 pay bills @home
2024-01-11 write report +work @office
x 2024-01-12 2024-01-05 buy milk @home
call plumber +active
fix bike t:2999-01-01
";

fn setup() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("todo.txt");
    fs::write(&path, TODO).expect("Failed to write todo.txt");
    (dir, path)
}

fn source(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

fn load(path: &Path) -> Board {
    match TodoTxtAdapter.execute(&source(path), BoardCommand::LoadAll) {
        Ok(Outcome::Board(board)) => board,
        other => panic!("load failed: {:?}", other),
    }
}

fn run(path: &Path, command: BoardCommand) {
    TodoTxtAdapter
        .execute(&source(path), command)
        .expect("command failed");
}

fn column_id(board: &Board, grouping: &str, column: &str) -> String {
    let grouping = board
        .roots()
        .find(|r| r.label == grouping)
        .unwrap_or_else(|| panic!("no grouping {}", grouping));
    board
        .child_by_label(&grouping.id, column)
        .unwrap_or_else(|| panic!("no column {}", column))
        .id
        .clone()
}

fn labels(board: &Board, grouping: &str, column: &str) -> Vec<String> {
    board
        .children(&column_id(board, grouping, column))
        .map(|n| n.label.clone())
        .collect()
}

fn item(board: &Board, grouping: &str, column: &str, label: &str) -> String {
    board
        .children(&column_id(board, grouping, column))
        .find(|n| n.label == label)
        .unwrap_or_else(|| panic!("no item {}", label))
        .id
        .clone()
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn groupings_are_all_then_no_context_then_contexts() {
    let (_dir, path) = setup();
    let board = load(&path);
    let roots: Vec<_> = board.roots().map(|r| r.label.as_str()).collect();
    assert_eq!(roots, vec![".*", "^$", "home", "office"]);
    for root in board.roots() {
        let columns: Vec<_> = board.children(&root.id).map(|c| c.label.as_str()).collect();
        assert_eq!(columns, vec!["Todo", "High Prio", "Active", "Done"]);
    }
}

#[test]
fn tasks_are_placed_by_markers() {
    let (_dir, path) = setup();
    let board = load(&path);
    assert_eq!(labels(&board, ".*", "Todo"), vec!["write report"]);
    assert_eq!(labels(&board, ".*", "High Prio"), vec!["pay bills"]);
    assert_eq!(labels(&board, ".*", "Active"), vec!["call plumber"]);
    assert_eq!(labels(&board, ".*", "Done"), vec!["buy milk"]);
    assert_eq!(labels(&board, "^$", "Active"), vec!["call plumber"]);
    assert_eq!(labels(&board, "home", "Done"), vec!["buy milk"]);
    assert_eq!(labels(&board, "office", "Todo"), vec!["write report"]);

    let plumber = item(&board, ".*", "Active", "call plumber");
    assert!(board.get(&plumber).unwrap().tags.is_empty());
    let bills = item(&board, ".*", "High Prio", "pay bills");
    assert_eq!(board.get(&bills).unwrap().priority, Priority::High);
}

#[test]
fn future_threshold_hides_but_keeps_the_line() {
    let (_dir, path) = setup();
    let board = load(&path);
    assert!(board.nodes().all(|n| n.label != "fix bike"));

    let plumber = item(&board, ".*", "Active", "call plumber");
    run(&path, BoardCommand::ChangePrio { item_id: plumber, prio: Priority::Low });
    assert!(lines(&path).contains(&"fix bike t:2999-01-01".to_string()));
}

#[test]
fn move_to_done_completes_with_today() {
    let (_dir, path) = setup();
    let board = load(&path);
    let report = item(&board, ".*", "Todo", "write report");
    run(
        &path,
        BoardCommand::MoveNodes {
            item_ids: vec![report],
            target_column: column_id(&board, ".*", "Done"),
        },
    );
    let expected = format!("x {} 2024-01-11 write report +work @office", today());
    assert_eq!(lines(&path)[1], expected);
    assert_eq!(labels(&load(&path), "office", "Done"), vec!["write report"]);
}

#[test]
fn move_to_todo_clears_priority() {
    let (_dir, path) = setup();
    let board = load(&path);
    let bills = item(&board, "home", "High Prio", "pay bills");
    run(
        &path,
        BoardCommand::MoveNodes {
            item_ids: vec![bills],
            target_column: column_id(&board, "home", "Todo"),
        },
    );
    assert_eq!(lines(&path)[0], "2024-01-10 pay bills @home");
}

#[test]
fn move_to_active_reopens() {
    let (_dir, path) = setup();
    let board = load(&path);
    let milk = item(&board, ".*", "Done", "buy milk");
    run(
        &path,
        BoardCommand::MoveNodes {
            item_ids: vec![milk],
            target_column: column_id(&board, ".*", "Active"),
        },
    );
    assert_eq!(lines(&path)[2], "2024-01-05 buy milk +active @home");
}

#[test]
fn add_node_in_context_grouping() {
    let (_dir, path) = setup();
    let board = load(&path);
    run(
        &path,
        BoardCommand::AddNode {
            label: "mow lawn".into(),
            target_column: column_id(&board, "home", "Active"),
            prio: Priority::Medium,
            tags: vec!["garden".into()],
        },
    );
    let expected = format!("{} mow lawn +garden +active @home", today());
    assert_eq!(lines(&path).last().unwrap(), &expected);
    assert_eq!(labels(&load(&path), "home", "Active"), vec!["mow lawn"]);
}

#[test]
fn add_node_with_priority_in_catch_all() {
    let (_dir, path) = setup();
    let board = load(&path);
    run(
        &path,
        BoardCommand::AddNode {
            label: "read book".into(),
            target_column: column_id(&board, ".*", "Todo"),
            prio: Priority::Low,
            tags: vec![],
        },
    );
    let expected = format!("(C) {} read book", today());
    assert_eq!(lines(&path).last().unwrap(), &expected);
}

#[test]
fn tag_edits_keep_active_marker() {
    let (_dir, path) = setup();
    let board = load(&path);
    let plumber = item(&board, ".*", "Active", "call plumber");
    run(
        &path,
        BoardCommand::ChangeTags {
            item_id: plumber,
            tags: vec!["urgent".into()],
            action: TagAction::Add,
        },
    );
    assert_eq!(lines(&path)[3], "call plumber +urgent +active");

    let board = load(&path);
    let plumber = item(&board, ".*", "Active", "call plumber");
    assert_eq!(board.get(&plumber).unwrap().tags, vec!["urgent"]);
    run(
        &path,
        BoardCommand::ChangeTags {
            item_id: plumber,
            tags: vec![],
            action: TagAction::Clear,
        },
    );
    assert_eq!(lines(&path)[3], "call plumber +active");
}

#[test]
fn every_appearance_edits_the_same_line() {
    let (_dir, path) = setup();
    let board = load(&path);
    let via_home = item(&board, "home", "High Prio", "pay bills");
    let via_all = item(&board, ".*", "High Prio", "pay bills");
    assert_ne!(via_home, via_all);

    run(
        &path,
        BoardCommand::ChangeLabel {
            item_id: via_home,
            new_label: "pay all bills".into(),
        },
    );
    assert_eq!(lines(&path)[0], "(A) 2024-01-10 pay all bills @home");
    assert_eq!(lines(&path).len(), 5);
}

#[test]
fn delete_removes_the_line_once() {
    let (_dir, path) = setup();
    let board = load(&path);
    let milk_all = item(&board, ".*", "Done", "buy milk");
    let milk_home = item(&board, "home", "Done", "buy milk");
    run(&path, BoardCommand::DeleteNodes { item_ids: vec![milk_all, milk_home] });
    let remaining = lines(&path);
    assert_eq!(remaining.len(), 4);
    assert!(remaining.iter().all(|l| !l.contains("buy milk")));
}

#[test]
fn change_prio_writes_letters() {
    let (_dir, path) = setup();
    for (priority, letter) in [
        (Priority::High, "(A)"),
        (Priority::Medium, "(B)"),
        (Priority::Low, "(C)"),
        (Priority::Lowest, "(D)"),
    ] {
        let board = load(&path);
        let report = board
            .nodes()
            .find(|n| n.label == "write report")
            .unwrap()
            .id
            .clone();
        run(&path, BoardCommand::ChangePrio { item_id: report, prio: priority });
        assert!(lines(&path)[1].starts_with(letter), "{:?}", lines(&path));
        let board = load(&path);
        let node = board.nodes().find(|n| n.label == "write report").unwrap();
        assert_eq!(node.priority, priority);
    }
}

#[test]
fn descriptions_are_not_supported() {
    let (_dir, path) = setup();
    let board = load(&path);
    let report = item(&board, ".*", "Todo", "write report");
    let err = TodoTxtAdapter
        .execute(
            &source(&path),
            BoardCommand::ChangeDescription {
                item_id: report,
                new_description: Some("x".into()),
            },
        )
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidCommand);
    assert_eq!(fs::read_to_string(&path).unwrap(), TODO);
}
