//! todo.txt adapter.
//!
//! Every task is shown once per grouping it belongs to: `.*` holds every
//! task, `^$` the tasks without a context, and each `@context` gets its own
//! grouping. Columns are derived from the task line: completed tasks are
//! Done, `+active` tasks are Active, priority `A` is High Prio and the rest
//! is Todo.

use super::{Adapter, AdapterKind, Outcome, unsupported};
use crate::error::{BoardError, BoardResult};
use crate::fsutil;
use crate::identity::derive_id;
use crate::protocol::{BoardCommand, CommandKind, Feature};
use crate::types::{Board, Node, Priority};
use chrono::{Local, NaiveDate};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

const COMMANDS: &[CommandKind] = &[
    CommandKind::LoadAll,
    CommandKind::MoveNodes,
    CommandKind::DeleteNodes,
    CommandKind::ChangeLabel,
    CommandKind::ChangePrio,
    CommandKind::ChangeTags,
    CommandKind::AddNode,
];

const FEATURES: &[Feature] = &[Feature::AutogeneratedNodeIds];

pub const COLUMN_TODO: &str = "Todo";
pub const COLUMN_URGENT: &str = "High Prio";
pub const COLUMN_ACTIVE: &str = "Active";
pub const COLUMN_DONE: &str = "Done";
const COLUMNS: [&str; 4] = [COLUMN_TODO, COLUMN_URGENT, COLUMN_ACTIVE, COLUMN_DONE];

pub const GROUP_ALL: &str = ".*";
pub const GROUP_NO_CONTEXT: &str = "^$";

const ACTIVE_PROJECT: &str = "active";
const THRESHOLD_KEY: &str = "t";
const LINE_BREAK: &str = "<br>";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// One todo.txt line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Task {
    pub completed: bool,
    pub priority: Option<char>,
    pub completion_date: Option<String>,
    pub creation_date: Option<String>,
    pub text: String,
    pub projects: Vec<String>,
    pub contexts: Vec<String>,
    /// `key:value` extensions in line order.
    pub tags: Vec<(String, String)>,
}

impl Task {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn parse(line: &str) -> Self {
        let mut task = Task::default();
        let mut tokens = line.split_whitespace().peekable();

        if tokens.peek() == Some(&"x") {
            task.completed = true;
            tokens.next();
        }
        if let Some(letter) = tokens.peek().and_then(|t| parse_priority(t)) {
            task.priority = Some(letter);
            tokens.next();
        }
        if task.completed && tokens.peek().is_some_and(|t| is_date(t)) {
            task.completion_date = tokens.next().map(String::from);
        }
        if tokens.peek().is_some_and(|t| is_date(t)) {
            task.creation_date = tokens.next().map(String::from);
        }

        let mut words: Vec<&str> = Vec::new();
        for token in tokens {
            if let Some(project) = token.strip_prefix('+').filter(|p| !p.is_empty()) {
                task.projects.push(project.to_string());
            } else if let Some(context) = token.strip_prefix('@').filter(|c| !c.is_empty()) {
                task.contexts.push(context.to_string());
            } else if let Some((key, value)) = split_key_value(token) {
                task.tags.push((key.to_string(), value.to_string()));
            } else {
                words.push(token);
            }
        }
        task.text = words.join(" ");
        task
    }

    /// Canonical form: markers, text, projects, contexts, key:values.
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.completed {
            parts.push("x".into());
        }
        if let Some(letter) = self.priority {
            parts.push(format!("({})", letter));
        }
        if self.completed {
            if let Some(date) = &self.completion_date {
                parts.push(date.clone());
            }
        }
        if let Some(date) = &self.creation_date {
            parts.push(date.clone());
        }
        if !self.text.is_empty() {
            parts.push(self.text.clone());
        }
        parts.extend(self.projects.iter().map(|p| format!("+{}", p)));
        parts.extend(self.contexts.iter().map(|c| format!("@{}", c)));
        parts.extend(self.tags.iter().map(|(k, v)| format!("{}:{}", k, v)));
        parts.join(" ")
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.projects.iter().any(|p| p == ACTIVE_PROJECT)
    }

    /// Hidden until its `t:` threshold date.
    pub fn is_deferred(&self, today: NaiveDate) -> bool {
        self.tag(THRESHOLD_KEY)
            .and_then(|t| NaiveDate::parse_from_str(t, DATE_FORMAT).ok())
            .is_some_and(|threshold| threshold > today)
    }

    /// Index into the column list.
    fn column(&self) -> usize {
        if self.completed {
            3
        } else if self.is_active() {
            2
        } else if self.priority == Some('A') {
            1
        } else {
            0
        }
    }

    fn label(&self) -> String {
        self.text.replace(LINE_BREAK, "\n")
    }

    fn visible_tags(&self) -> Vec<String> {
        self.projects
            .iter()
            .filter(|p| *p != ACTIVE_PROJECT)
            .cloned()
            .collect()
    }

    fn set_active(&mut self, active: bool) {
        self.projects.retain(|p| p != ACTIVE_PROJECT);
        if active {
            self.projects.push(ACTIVE_PROJECT.to_string());
        }
    }

    fn reopen(&mut self) {
        self.completed = false;
        self.completion_date = None;
    }

    /// Make the task satisfy the placement rule of `column`.
    fn place_in(&mut self, column: &str, today: &str) -> BoardResult<()> {
        match column {
            COLUMN_TODO => {
                self.reopen();
                self.priority = None;
                self.set_active(false);
            }
            COLUMN_ACTIVE => {
                self.reopen();
                self.set_active(true);
            }
            COLUMN_URGENT => {
                self.reopen();
                self.priority = Some('A');
                self.set_active(false);
            }
            COLUMN_DONE => {
                self.completed = true;
                self.completion_date = Some(today.to_string());
            }
            other => {
                return Err(BoardError::user_facing(format!(
                    "Unknown column: {}",
                    other
                )));
            }
        }
        Ok(())
    }
}

fn parse_priority(token: &str) -> Option<char> {
    let inner = token.strip_prefix('(')?.strip_suffix(')')?;
    let mut chars = inner.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Some(c),
        _ => None,
    }
}

fn is_date(token: &str) -> bool {
    NaiveDate::parse_from_str(token, DATE_FORMAT).is_ok()
}

fn split_key_value(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once(':')?;
    let valid = !key.is_empty()
        && !value.is_empty()
        && !value.starts_with("//")
        && !key.contains(['(', ')']);
    valid.then_some((key, value))
}

/// Priority letter to the portable scale.
pub fn priority_from_letter(letter: Option<char>) -> Priority {
    match letter {
        None => Priority::Medium,
        Some('A') => Priority::High,
        Some('B') => Priority::Medium,
        Some('C') => Priority::Low,
        Some(_) => Priority::Lowest,
    }
}

/// Portable priority to a letter.
pub fn letter_from_priority(priority: Priority) -> char {
    match priority {
        Priority::High => 'A',
        Priority::Medium => 'B',
        Priority::Low => 'C',
        Priority::Lowest => 'D',
    }
}

/// A parsed file together with the board built from it.
#[derive(Debug)]
pub struct TodoList {
    pub tasks: Vec<Task>,
    pub board: Board,
    /// Node id to index into `tasks`; several ids may share a task.
    task_by_node: HashMap<String, usize>,
}

impl TodoList {
    pub fn parse(text: &str, today: NaiveDate) -> Self {
        let tasks: Vec<Task> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Task::parse)
            .collect();

        let contexts: BTreeSet<&str> = tasks
            .iter()
            .flat_map(|t| t.contexts.iter().map(String::as_str))
            .collect();

        let mut board = Board::new();
        let mut groupings: HashMap<String, String> = HashMap::new();
        let names = [GROUP_ALL, GROUP_NO_CONTEXT]
            .into_iter()
            .chain(contexts.iter().copied());
        for (position, name) in names.enumerate() {
            let grouping_id = derive_id("", name, position);
            board.add_root(Node::new(grouping_id.clone(), name));
            for (column_pos, label) in COLUMNS.iter().enumerate() {
                let column = Node::new(derive_id(&grouping_id, label, column_pos), *label);
                // Grouping ids are unique, so this cannot collide.
                let _ = board.add_child(&grouping_id, column);
            }
            groupings.insert(name.to_string(), grouping_id);
        }

        let mut task_by_node = HashMap::new();
        for (index, task) in tasks.iter().enumerate() {
            if task.is_deferred(today) {
                debug!(text = %task.text, "task hidden until threshold date");
                continue;
            }
            let mut memberships = vec![GROUP_ALL];
            if task.contexts.is_empty() {
                memberships.push(GROUP_NO_CONTEXT);
            }
            memberships.extend(task.contexts.iter().map(String::as_str));

            for grouping in memberships {
                let Some(grouping_id) = groupings.get(grouping) else {
                    continue;
                };
                let Some(column_id) = board
                    .get(grouping_id)
                    .and_then(|g| g.children.get(task.column()))
                    .cloned()
                else {
                    continue;
                };
                let position = board.children(&column_id).count();
                let label = task.label();
                let mut node = Node::new(derive_id(&column_id, &label, position), label)
                    .with_priority(priority_from_letter(task.priority))
                    .with_tags(task.visible_tags());
                node.creation_date = task.creation_date.clone();
                node.completion_date = task.completion_date.clone();
                if let Ok(id) = board.add_child(&column_id, node) {
                    task_by_node.insert(id, index);
                }
            }
        }

        Self {
            tasks,
            board,
            task_by_node,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for task in &self.tasks {
            out.push_str(&task.render());
            out.push('\n');
        }
        out
    }

    pub fn task_index(&self, node_id: &str) -> Option<usize> {
        self.task_by_node.get(node_id).copied()
    }

    fn task_mut(&mut self, node_id: &str) -> BoardResult<&mut Task> {
        let index = self
            .task_index(node_id)
            .ok_or_else(|| BoardError::node_not_found(node_id))?;
        self.tasks
            .get_mut(index)
            .ok_or_else(|| BoardError::node_not_found(node_id))
    }

    /// Label of a column node and of its grouping.
    fn column_info(&self, column_id: &str) -> BoardResult<(String, String)> {
        let column = self
            .board
            .get(column_id)
            .filter(|_| self.board.depth(column_id) == Some(1))
            .ok_or_else(|| BoardError::column_not_found(column_id))?;
        let grouping = column
            .parent
            .as_deref()
            .and_then(|p| self.board.get(p))
            .ok_or_else(|| BoardError::column_not_found(column_id))?;
        Ok((column.label.clone(), grouping.label.clone()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TodoTxtAdapter;

impl TodoTxtAdapter {
    fn today() -> NaiveDate {
        Local::now().date_naive()
    }
}

impl Adapter for TodoTxtAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Todotxt
    }

    fn commands(&self) -> &'static [CommandKind] {
        COMMANDS
    }

    fn features(&self) -> &'static [Feature] {
        FEATURES
    }

    fn execute(&self, source: &str, command: BoardCommand) -> BoardResult<Outcome> {
        let path = Path::new(source);
        let today = Self::today();
        let today_str = today.format(DATE_FORMAT).to_string();
        let mut list = TodoList::parse(&fsutil::read_source(path)?, today);

        match command {
            BoardCommand::LoadAll => return Ok(Outcome::Board(list.board)),
            BoardCommand::MoveNodes {
                item_ids,
                target_column,
            } => {
                let (column, _) = list.column_info(&target_column)?;
                for id in &item_ids {
                    list.task_mut(id)?.place_in(&column, &today_str)?;
                }
            }
            BoardCommand::DeleteNodes { item_ids } => {
                let doomed: BTreeSet<usize> = item_ids
                    .iter()
                    .filter_map(|id| list.task_index(id))
                    .collect();
                if doomed.is_empty() {
                    debug!("nothing to delete");
                    return Ok(Outcome::Done);
                }
                for index in doomed.into_iter().rev() {
                    list.tasks.remove(index);
                }
            }
            BoardCommand::ChangeLabel { item_id, new_label } => {
                list.task_mut(&item_id)?.text = new_label.replace('\n', LINE_BREAK);
            }
            BoardCommand::ChangePrio { item_id, prio } => {
                list.task_mut(&item_id)?.priority = Some(letter_from_priority(prio));
            }
            BoardCommand::ChangeTags {
                item_id,
                tags,
                action,
            } => {
                let task = list.task_mut(&item_id)?;
                let was_active = task.is_active();
                // The Active column is not a tag; keep it out of tag edits.
                let tags: Vec<String> = tags
                    .iter()
                    .map(|t| t.trim().trim_start_matches('+').to_string())
                    .filter(|t| !t.is_empty() && !t.contains(char::is_whitespace))
                    .filter(|t| t != ACTIVE_PROJECT)
                    .collect();
                task.projects = action.apply(&task.visible_tags(), &tags);
                task.set_active(was_active);
            }
            BoardCommand::AddNode {
                label,
                target_column,
                prio,
                tags,
            } => {
                let (column, grouping) = list.column_info(&target_column)?;
                let mut task = Task::new(&label.replace('\n', LINE_BREAK));
                task.creation_date = Some(today_str.clone());
                task.projects = tags
                    .iter()
                    .map(|t| t.trim().trim_start_matches('+').to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                if prio != Priority::Medium {
                    task.priority = Some(letter_from_priority(prio));
                }
                if column != COLUMN_TODO {
                    task.place_in(&column, &today_str)?;
                }
                if grouping != GROUP_ALL && grouping != GROUP_NO_CONTEXT {
                    task.contexts.push(grouping);
                }
                list.tasks.push(task);
            }
            other => return Err(unsupported(self.kind(), &other)),
        }

        fsutil::atomic_write(path, &list.render())?;
        info!(source = %source, tasks = list.tasks.len(), "todo.txt written");
        Ok(Outcome::Done)
    }
}
