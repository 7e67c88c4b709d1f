//! Board output for the command line.

use crate::types::{Board, Node, Priority};
use clap::ValueEnum;
use serde_json::{Value, json};

/// Output format for `show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

pub fn format_board(board: &Board, format: OutputFormat) -> String {
    match format {
        OutputFormat::Markdown => format_board_markdown(board),
        OutputFormat::Json => {
            serde_json::to_string_pretty(&board_json(board)).unwrap_or_else(|_| "{}".into())
        }
    }
}

/// Roots as `##` sections, columns as `###`, entries as list items.
pub fn format_board_markdown(board: &Board) -> String {
    let mut md = String::new();
    for root in board.roots() {
        md.push_str(&format!("## {}\n", root.label));
        for column in board.children(&root.id) {
            md.push_str(&format!("\n### {} ({})\n", column.label, column.children.len()));
            for entry in board.children(&column.id) {
                md.push_str(&format_entry(entry));
            }
        }
        md.push('\n');
    }
    md
}

fn format_entry(node: &Node) -> String {
    let mut line = format!("- {}", node.label.replace('\n', " "));
    if node.priority != Priority::Medium {
        line.push_str(&format!(" [{}]", node.priority.as_str()));
    }
    for tag in &node.tags {
        line.push_str(&format!(" #{}", tag));
    }
    line.push_str(&format!(" `{}`\n", node.id));
    if let Some(description) = &node.description {
        for text in description.lines() {
            line.push_str(&format!("  > {}\n", text));
        }
    }
    line
}

/// Nested JSON: each node with its children inline.
pub fn board_json(board: &Board) -> Value {
    Value::Array(board.roots().map(|root| node_json(board, root)).collect())
}

fn node_json(board: &Board, node: &Node) -> Value {
    let children: Vec<Value> = board
        .children(&node.id)
        .map(|child| node_json(board, child))
        .collect();
    let mut value = json!({
        "id": node.id,
        "label": node.label,
        "prio": node.priority.as_u8(),
        "tags": node.tags,
    });
    if let Some(description) = &node.description {
        value["description"] = json!(description);
    }
    if let Some(created) = &node.creation_date {
        value["creation_date"] = json!(created);
    }
    if let Some(completed) = &node.completion_date {
        value["completion_date"] = json!(completed);
    }
    if !children.is_empty() {
        value["children"] = Value::Array(children);
    }
    value
}
