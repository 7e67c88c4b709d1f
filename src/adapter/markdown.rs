//! Markdown outline adapter.
//!
//! ```text
//! # Todo
//!
//! - (buy milk) +errands
//!     two litres
//! - **file taxes**
//! ```
//!
//! `# Heading` lines are columns and `- item` lines are entries. Priority
//! is encoded by a decoration around the label, tags are trailing `+tag`
//! tokens, and lines indented by four spaces or a tab directly below an
//! entry are its description. The file is regenerated from the tree on
//! every write; formatting the parser does not recognise is dropped.

use super::{Adapter, AdapterKind, Outcome, unsupported};
use crate::error::{BoardError, BoardResult};
use crate::fsutil;
use crate::identity::derive_id;
use crate::protocol::{BoardCommand, CommandKind, Feature};
use crate::types::{Board, Node, Priority};
use regex_lite::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

const COMMANDS: &[CommandKind] = &[
    CommandKind::LoadAll,
    CommandKind::MoveNodes,
    CommandKind::DeleteNodes,
    CommandKind::ChangeLabel,
    CommandKind::ChangePrio,
    CommandKind::ChangeTags,
    CommandKind::ChangeDescription,
    CommandKind::AddNode,
];

const FEATURES: &[Feature] = &[Feature::AutogeneratedNodeIds];

const DESCRIPTION_INDENT: &str = "    ";

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)\+(\S+)").expect("valid tag regex"));

/// Left and right decoration for each priority, lowest first.
const DECORATIONS: [(&str, &str); 4] = [("~~", "~~"), ("(", ")"), ("", ""), ("**", "**")];

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownAdapter;

impl Adapter for MarkdownAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Markdown
    }

    fn commands(&self) -> &'static [CommandKind] {
        COMMANDS
    }

    fn features(&self) -> &'static [Feature] {
        FEATURES
    }

    fn execute(&self, source: &str, command: BoardCommand) -> BoardResult<Outcome> {
        let path = Path::new(source);
        let mut board = parse(source, &fsutil::read_source(path)?);

        match command {
            BoardCommand::LoadAll => return Ok(Outcome::Board(board)),
            BoardCommand::MoveNodes {
                item_ids,
                target_column,
            } => {
                require_column(&board, &target_column)?;
                for id in &item_ids {
                    if board.depth(id) != Some(2) {
                        return Err(BoardError::node_not_found(id));
                    }
                }
                for id in &item_ids {
                    board.detach(id);
                    board.attach(&target_column, id)?;
                }
            }
            BoardCommand::DeleteNodes { item_ids } => {
                for id in &item_ids {
                    if !board.remove(id) {
                        debug!(id = %id, "delete of unknown node ignored");
                    }
                }
            }
            BoardCommand::ChangeLabel { item_id, new_label } => {
                let label = match board.depth(&item_id) {
                    Some(1) => heading_label(&new_label)?,
                    Some(2) => entry_label(&new_label, "new_label")?,
                    _ => return Err(BoardError::node_not_found(&item_id)),
                };
                node_mut(&mut board, &item_id)?.label = label;
            }
            BoardCommand::ChangePrio { item_id, prio } => {
                entry_mut(&mut board, &item_id)?.priority = prio;
            }
            BoardCommand::ChangeTags {
                item_id,
                tags,
                action,
            } => {
                let node = entry_mut(&mut board, &item_id)?;
                let tags: Vec<String> = tags.iter().filter_map(|t| clean_tag(t)).collect();
                node.tags = action.apply(&node.tags, &tags);
            }
            BoardCommand::ChangeDescription {
                item_id,
                new_description,
            } => {
                entry_mut(&mut board, &item_id)?.description =
                    new_description.filter(|d| !d.is_empty());
            }
            BoardCommand::AddNode {
                label,
                target_column,
                prio,
                tags,
            } => {
                require_column(&board, &target_column)?;
                let label = entry_label(&label, "label")?;
                let tags = tags.iter().filter_map(|t| clean_tag(t)).collect();
                let placeholder = format!("new:{}", board.len());
                let node = Node::new(placeholder, label)
                    .with_priority(prio)
                    .with_tags(tags);
                board.add_child(&target_column, node)?;
            }
            other => return Err(unsupported(self.kind(), &other)),
        }

        board.reindex(derive_id);
        fsutil::atomic_write(path, &render(&board))?;
        info!(source = %source, "markdown board written");
        Ok(Outcome::Done)
    }
}

/// Parse Markdown text into a board rooted at `source`.
pub fn parse(source: &str, text: &str) -> Board {
    let mut board = Board::new();
    let root = board.add_root(Node::new("root", source));
    // Placeholder ids; real ids are derived in one pass at the end.
    let mut next_id = 0usize;
    let mut fresh_id = || {
        next_id += 1;
        format!("tmp:{}", next_id)
    };

    let mut column: Option<String> = None;
    let mut entry: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim_end();

        if let Some(entry_id) = entry.as_deref() {
            let continuation = raw
                .strip_prefix(DESCRIPTION_INDENT)
                .or_else(|| raw.strip_prefix('\t'));
            if let Some(rest) = continuation {
                if let Some(node) = board.get_mut(entry_id) {
                    let rest = rest.trim_end();
                    node.description = Some(match node.description.take() {
                        Some(existing) => format!("{}\n{}", existing, rest),
                        None => rest.to_string(),
                    });
                }
                continue;
            }
        }

        if let Some(heading) = line.strip_prefix("# ") {
            entry = None;
            let heading = heading.trim();
            if heading.is_empty() {
                continue;
            }
            // A repeated heading reopens the existing column.
            let existing = board.child_by_label(&root, heading).map(|n| n.id.clone());
            column = match existing {
                Some(id) => Some(id),
                None => board.add_child(&root, Node::new(fresh_id(), heading)).ok(),
            };
        } else if let Some(item) = line.strip_prefix("- ") {
            entry = None;
            let Some(column_id) = column.as_deref() else {
                continue;
            };
            let (text, tags) = split_tags(item);
            let (label, priority) = undecorate(&text);
            if label.is_empty() {
                continue;
            }
            let node = Node::new(fresh_id(), label)
                .with_priority(priority)
                .with_tags(tags);
            entry = board.add_child(column_id, node).ok();
        } else {
            entry = None;
        }
    }

    board.reindex(derive_id);
    board
}

/// Regenerate the whole file from the tree.
pub fn render(board: &Board) -> String {
    let mut out = String::new();
    let Some(root) = board.root_ids().first() else {
        return out;
    };
    let columns: Vec<&Node> = board.children(root).collect();
    for (index, column) in columns.iter().enumerate() {
        out.push_str(&format!("# {}\n\n", single_line(&column.label)));
        let mut entries = board.children(&column.id).peekable();
        let has_entries = entries.peek().is_some();
        for entry in entries {
            out.push_str("- ");
            out.push_str(&decorate(&single_line(&entry.label), entry.priority));
            for tag in &entry.tags {
                out.push_str(" +");
                out.push_str(tag);
            }
            out.push('\n');
            if let Some(description) = &entry.description {
                for line in description.lines() {
                    out.push_str(DESCRIPTION_INDENT);
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        if has_entries && index + 1 < columns.len() {
            out.push('\n');
        }
    }
    out
}

fn decorate(label: &str, priority: Priority) -> String {
    let (left, right) = DECORATIONS[priority.as_u8() as usize];
    format!("{}{}{}", left, label, right)
}

/// Strip a priority decoration; undecorated text is medium priority.
fn undecorate(text: &str) -> (String, Priority) {
    let text = text.trim();
    for priority in [Priority::Lowest, Priority::High, Priority::Low] {
        let (left, right) = DECORATIONS[priority.as_u8() as usize];
        let inner = text
            .strip_prefix(left)
            .and_then(|rest| rest.strip_suffix(right))
            .map(str::trim);
        if let Some(inner) = inner.filter(|i| !i.is_empty()) {
            return (inner.to_string(), priority);
        }
    }
    (text.to_string(), Priority::Medium)
}

/// Pull `+tag` tokens out of an item line.
fn split_tags(item: &str) -> (String, Vec<String>) {
    let pattern = &*TAG_PATTERN;
    let mut tags: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(item) {
        if let Some(tag) = caps.get(2) {
            let tag = tag.as_str().to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    let text = pattern.replace_all(item, "");
    (text.trim().to_string(), tags)
}

fn clean_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().trim_start_matches('+');
    if tag.is_empty() {
        return None;
    }
    Some(tag.split_whitespace().collect::<Vec<_>>().join("-"))
}

fn single_line(label: &str) -> String {
    label.lines().map(str::trim).collect::<Vec<_>>().join(" ")
}

/// Normalise an entry label, rejecting text the parser would read back differently.
fn entry_label(label: &str, field: &str) -> BoardResult<String> {
    let label = single_line(label).trim().to_string();
    if label.is_empty() {
        return Err(BoardError::malformed("label must not be empty").with_field(field));
    }
    let (text, tags) = split_tags(&label);
    if !tags.is_empty() {
        return Err(
            BoardError::malformed("label must not contain +tag tokens").with_field(field),
        );
    }
    if undecorate(&text) != (label.clone(), Priority::Medium) {
        return Err(BoardError::malformed(
            "label must not be wrapped in a priority decoration",
        )
        .with_field(field));
    }
    Ok(label)
}

fn heading_label(label: &str) -> BoardResult<String> {
    let label = single_line(label).trim().to_string();
    if label.is_empty() {
        return Err(BoardError::malformed("label must not be empty").with_field("new_label"));
    }
    Ok(label)
}

fn require_column(board: &Board, id: &str) -> BoardResult<()> {
    match board.depth(id) {
        Some(1) => Ok(()),
        _ => Err(BoardError::column_not_found(id)),
    }
}

fn node_mut<'a>(board: &'a mut Board, id: &str) -> BoardResult<&'a mut Node> {
    board
        .get_mut(id)
        .ok_or_else(|| BoardError::node_not_found(id))
}

/// Priority, tags and description are only written for list entries.
fn entry_mut<'a>(board: &'a mut Board, id: &str) -> BoardResult<&'a mut Node> {
    if board.depth(id) != Some(2) {
        return Err(BoardError::node_not_found(id));
    }
    node_mut(board, id)
}
