//! Integration tests for the Markdown adapter against real files.

use std::fs;
use std::path::{Path, PathBuf};
use taskboard::adapter::markdown::MarkdownAdapter;
use taskboard::adapter::{Adapter, Outcome};
use taskboard::error::ErrorCode;
use taskboard::protocol::{BoardCommand, TagAction};
use taskboard::types::{Board, Node, Priority};
use tempfile::TempDir;

const CANONICAL: &str = "\
# Todo

- write report +work
- (water plants)
- **pay rent**

# Doing

- ~~old idea~~

# Done

- call mom
    she was out
- buy milk +errands
";

/// Helper to write a board file into a fresh temp dir.
fn setup(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("board.md");
    fs::write(&path, content).expect("Failed to write board");
    (dir, path)
}

fn source(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn load(path: &Path) -> Board {
    match MarkdownAdapter.execute(&source(path), BoardCommand::LoadAll) {
        Ok(Outcome::Board(board)) => board,
        other => panic!("load failed: {:?}", other),
    }
}

fn run(path: &Path, command: BoardCommand) {
    MarkdownAdapter
        .execute(&source(path), command)
        .expect("command failed");
}

fn column<'a>(board: &'a Board, label: &str) -> &'a Node {
    let root = &board.root_ids()[0];
    board.child_by_label(root, label).expect("column exists")
}

fn labels(board: &Board, column_label: &str) -> Vec<String> {
    board
        .children(&column(board, column_label).id)
        .map(|n| n.label.clone())
        .collect()
}

#[test]
fn columns_hold_their_entries() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    let root = &board.root_ids()[0];
    let counts: Vec<usize> = board.children(root).map(|c| c.children.len()).collect();
    assert_eq!(counts, vec![3, 1, 2]);
}

#[test]
fn unchanged_board_persists_byte_identical() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    assert_eq!(taskboard::adapter::markdown::render(&board), CANONICAL);
}

#[test]
fn move_changes_column_and_id() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    let rent = board
        .children(&column(&board, "Todo").id)
        .find(|n| n.label == "pay rent")
        .unwrap()
        .id
        .clone();
    let done = column(&board, "Done").id.clone();

    run(
        &path,
        BoardCommand::MoveNodes {
            item_ids: vec![rent.clone()],
            target_column: done,
        },
    );

    let board = load(&path);
    assert_eq!(labels(&board, "Done"), vec!["call mom", "buy milk", "pay rent"]);
    assert_eq!(labels(&board, "Todo"), vec!["write report", "water plants"]);
    assert!(!board.contains(&rent));
    let moved = board
        .children(&column(&board, "Done").id)
        .last()
        .unwrap();
    assert_eq!(moved.priority, Priority::High);
}

#[test]
fn delete_twice_is_a_no_op() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    let idea = board.children(&column(&board, "Doing").id).next().unwrap().id.clone();

    run(&path, BoardCommand::DeleteNodes { item_ids: vec![idea.clone()] });
    let after_first = fs::read_to_string(&path).unwrap();
    run(&path, BoardCommand::DeleteNodes { item_ids: vec![idea] });
    let after_second = fs::read_to_string(&path).unwrap();

    assert_eq!(after_first, after_second);
    assert!(labels(&load(&path), "Doing").is_empty());
}

#[test]
fn add_node_appends_to_column() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    let doing = column(&board, "Doing").id.clone();
    run(
        &path,
        BoardCommand::AddNode {
            label: "fix bike".into(),
            target_column: doing,
            prio: Priority::Low,
            tags: vec!["outdoor".into()],
        },
    );
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("- (fix bike) +outdoor\n"));
    assert_eq!(labels(&load(&path), "Doing"), vec!["old idea", "fix bike"]);
}

#[test]
fn add_node_to_entry_is_user_facing() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    let entry = board.children(&column(&board, "Todo").id).next().unwrap().id.clone();
    let err = MarkdownAdapter
        .execute(
            &source(&path),
            BoardCommand::AddNode {
                label: "x".into(),
                target_column: entry,
                prio: Priority::Medium,
                tags: vec![],
            },
        )
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UserFacing);
}

#[test]
fn moving_unknown_item_fails() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    let done = column(&board, "Done").id.clone();
    let err = MarkdownAdapter
        .execute(
            &source(&path),
            BoardCommand::MoveNodes {
                item_ids: vec!["missing".into()],
                target_column: done,
            },
        )
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NodeNotFound);
    assert_eq!(fs::read_to_string(&path).unwrap(), CANONICAL);
}

#[test]
fn tag_edits_keep_the_id() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    let report = board.children(&column(&board, "Todo").id).next().unwrap().id.clone();

    run(
        &path,
        BoardCommand::ChangeTags {
            item_id: report.clone(),
            tags: vec!["urgent".into(), "work".into()],
            action: TagAction::Add,
        },
    );
    let board = load(&path);
    assert_eq!(board.get(&report).unwrap().tags, vec!["work", "urgent"]);

    run(
        &path,
        BoardCommand::ChangeTags {
            item_id: report.clone(),
            tags: vec![],
            action: TagAction::Clear,
        },
    );
    assert!(load(&path).get(&report).unwrap().tags.is_empty());
}

#[test]
fn descriptions_round_trip() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    let milk = board
        .children(&column(&board, "Done").id)
        .find(|n| n.label == "buy milk")
        .unwrap()
        .id
        .clone();

    run(
        &path,
        BoardCommand::ChangeDescription {
            item_id: milk.clone(),
            new_description: Some("oat\nsemi-skimmed".into()),
        },
    );
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.ends_with("- buy milk +errands\n    oat\n    semi-skimmed\n"));
    assert_eq!(
        load(&path).get(&milk).unwrap().description.as_deref(),
        Some("oat\nsemi-skimmed")
    );

    run(
        &path,
        BoardCommand::ChangeDescription {
            item_id: milk.clone(),
            new_description: None,
        },
    );
    assert_eq!(load(&path).get(&milk).unwrap().description, None);
}

#[test]
fn missing_file_is_source_not_found() {
    let dir = TempDir::new().unwrap();
    let err = MarkdownAdapter
        .execute(&source(&dir.path().join("nope.md")), BoardCommand::LoadAll)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SourceNotFound);
}

#[test]
fn sync_is_not_supported() {
    let (_dir, path) = setup(CANONICAL);
    let err = MarkdownAdapter
        .execute(&source(&path), BoardCommand::Sync)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidCommand);
}

#[test]
fn renamed_entries_survive_a_reload() {
    let (_dir, path) = setup("# Todo\n\n- a\n- b\n");
    let board = load(&path);
    let first = board.children(&column(&board, "Todo").id).next().unwrap().id.clone();

    run(
        &path,
        BoardCommand::ChangeLabel {
            item_id: first,
            new_label: "  call (or email) landlord\n".into(),
        },
    );
    let board = load(&path);
    assert_eq!(labels(&board, "Todo"), vec!["call (or email) landlord", "b"]);
    let entry = board.children(&column(&board, "Todo").id).next().unwrap();
    assert_eq!(entry.priority, Priority::Medium);
}

#[test]
fn labels_that_would_not_reload_are_rejected() {
    let (_dir, path) = setup("# Todo\n\n- a\n- b\n");
    let board = load(&path);
    let todo = column(&board, "Todo").id.clone();
    let first = board.children(&todo).next().unwrap().id.clone();

    for bad in ["+urgent", "**boss**", "(x)", "~~x~~", " "] {
        let err = MarkdownAdapter
            .execute(
                &source(&path),
                BoardCommand::ChangeLabel {
                    item_id: first.clone(),
                    new_label: bad.into(),
                },
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedRequest, "{:?}", bad);
        assert_eq!(err.field.as_deref(), Some("new_label"));
    }

    let err = MarkdownAdapter
        .execute(
            &source(&path),
            BoardCommand::AddNode {
                label: "+later".into(),
                target_column: todo,
                prio: Priority::Medium,
                tags: vec![],
            },
        )
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MalformedRequest);
    assert_eq!(err.field.as_deref(), Some("label"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "# Todo\n\n- a\n- b\n");
}

#[test]
fn columns_can_be_renamed() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    run(
        &path,
        BoardCommand::ChangeLabel {
            item_id: column(&board, "Doing").id.clone(),
            new_label: "In progress".into(),
        },
    );
    assert_eq!(labels(&load(&path), "In progress"), vec!["old idea"]);
}

#[test]
fn entry_fields_are_rejected_on_columns_and_root() {
    let (_dir, path) = setup(CANONICAL);
    let board = load(&path);
    let root = board.root_ids()[0].clone();
    let todo = column(&board, "Todo").id.clone();

    let commands = vec![
        BoardCommand::ChangePrio { item_id: todo.clone(), prio: Priority::High },
        BoardCommand::ChangePrio { item_id: root.clone(), prio: Priority::High },
        BoardCommand::ChangeTags {
            item_id: todo.clone(),
            tags: vec!["x".into()],
            action: TagAction::Add,
        },
        BoardCommand::ChangeDescription {
            item_id: todo,
            new_description: Some("notes".into()),
        },
        BoardCommand::ChangeLabel { item_id: root, new_label: "other.md".into() },
    ];
    for command in commands {
        let err = MarkdownAdapter
            .execute(&source(&path), command.clone())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NodeNotFound, "{:?}", command);
    }
    assert_eq!(fs::read_to_string(&path).unwrap(), CANONICAL);
}
