//! iCalendar VTODO directory adapter.
//!
//! The source is a directory holding one task per `.ics` file. Columns are
//! not stored anywhere: a task's column is a function of its STATUS, DUE and
//! CATEGORIES ([`derive_column`]), and "moving" a task edits exactly the
//! fields that make the target column's rule true ([`make_member`]).
//!
//! Besides the catch-all grouping, every category gets a grouping of its
//! own with the same four columns. A task keeps its UID as id in the
//! catch-all grouping and is aliased as `<grouping-id>/<uid>` elsewhere.

use super::{Adapter, AdapterKind, Outcome, unsupported};
use crate::config::{SyncConfig, VtodoConfig};
use crate::error::{BoardError, BoardResult};
use crate::fsutil;
use crate::ical::{Component, utc_stamp};
use crate::protocol::{BoardCommand, CommandKind};
use crate::sync::SyncHook;
use crate::types::{Board, Node, Priority};
use chrono::{Duration, Local, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const COMMANDS: &[CommandKind] = &CommandKind::ALL;

pub const CATEGORY_PREFIX: &str = "__category_";
pub const CATCH_ALL_KEY: &str = "__all";

const STATUS_TODO: &str = "NEEDS-ACTION";
const STATUS_DONE: &str = "COMPLETED";
const PRODID: &str = "-//taskboard//taskboard//EN";

/// A derived column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Todo,
    Next,
    Active,
    Done,
}

impl Column {
    pub const ALL: [Column; 4] = [Column::Todo, Column::Next, Column::Active, Column::Done];

    /// Suffix appended to a grouping id to form the column id.
    pub fn suffix(self) -> &'static str {
        match self {
            Column::Todo => "__todo",
            Column::Next => "__next",
            Column::Active => "__today",
            Column::Done => "__done",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Column::Todo => "Todo",
            Column::Next => "Next",
            Column::Active => "Active",
            Column::Done => "Done",
        }
    }

    pub fn from_id(column_id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|column| column_id.ends_with(column.suffix()))
    }
}

/// Id of the grouping for category `key`.
pub fn grouping_id(key: &str) -> String {
    format!("{}{}", CATEGORY_PREFIX, key)
}

pub fn column_id(grouping_id: &str, column: Column) -> String {
    format!("{}{}", grouping_id, column.suffix())
}

/// Column placement. Done wins over Active, Active over Next.
pub fn derive_column(
    completed: bool,
    due: Option<NaiveDate>,
    tags: &[String],
    next_tag: &str,
    today: NaiveDate,
) -> Column {
    if completed {
        Column::Done
    } else if due.is_some_and(|d| d <= today) {
        Column::Active
    } else if tags.iter().any(|t| t == next_tag) {
        Column::Next
    } else {
        Column::Todo
    }
}

/// Portable priority to the iCalendar 1..9 scale; `None` means no PRIORITY.
pub fn encode_priority(priority: Priority) -> Option<u8> {
    match priority {
        Priority::Lowest => None,
        Priority::Low => Some(9),
        Priority::Medium => Some(5),
        Priority::High => Some(1),
    }
}

pub fn decode_priority(value: Option<u8>) -> Priority {
    match value {
        Some(1..=4) => Priority::High,
        Some(5) => Priority::Medium,
        Some(6..=9) => Priority::Low,
        _ => Priority::Lowest,
    }
}

fn is_completed(todo: &Component) -> bool {
    todo.raw("STATUS")
        .is_some_and(|s| s.trim().eq_ignore_ascii_case(STATUS_DONE))
}

fn due_date(todo: &Component) -> Option<NaiveDate> {
    todo.date("DUE").map(|d| d.local_date())
}

fn stored_priority(todo: &Component) -> Option<u8> {
    todo.raw("PRIORITY").and_then(|p| p.trim().parse().ok())
}

fn column_of(todo: &Component, next_tag: &str, today: NaiveDate) -> Column {
    derive_column(
        is_completed(todo),
        due_date(todo),
        &todo.categories(),
        next_tag,
        today,
    )
}

/// Apply the minimal edits that place `todo` in `target`. Returns whether
/// anything changed.
pub fn make_member(
    todo: &mut Component,
    target: Column,
    next_tag: &str,
    today: NaiveDate,
    now: &str,
) -> bool {
    let mut changed = false;
    let due_today = due_date(todo).is_some_and(|d| d <= today);

    if target == Column::Done {
        if !is_completed(todo) {
            todo.set_raw("STATUS", STATUS_DONE);
            todo.set_raw("COMPLETED", now);
            changed = true;
        }
        return changed;
    }

    if is_completed(todo) {
        todo.set_raw("STATUS", STATUS_TODO);
        todo.remove("COMPLETED");
        changed = true;
    }

    match target {
        Column::Active => {
            if !due_today {
                todo.set_raw("DUE", now);
                changed = true;
            }
        }
        Column::Next | Column::Todo => {
            if due_today {
                todo.remove("DUE");
                changed = true;
            }
            let mut tags = todo.categories();
            let has_next = tags.iter().any(|t| t == next_tag);
            if target == Column::Next && !has_next {
                tags.push(next_tag.to_string());
                todo.set_categories(&tags);
                changed = true;
            } else if target == Column::Todo && has_next {
                tags.retain(|t| t != next_tag);
                todo.set_categories(&tags);
                changed = true;
            }
        }
        Column::Done => {}
    }
    changed
}

/// One `.ics` file.
#[derive(Debug, Clone)]
struct Record {
    path: PathBuf,
    root: Component,
    /// Index of the VTODO among the root's components; `None` when the root
    /// itself is the VTODO.
    todo_index: Option<usize>,
    uid: String,
}

impl Record {
    fn read(path: &Path) -> BoardResult<Option<Record>> {
        let content = fs::read_to_string(path)?;
        let root = Component::parse(&content)
            .map_err(|e| BoardError::parse_failure(&path.display().to_string(), e))?;
        let todo_index = if root.name == "VTODO" {
            None
        } else {
            match root.components.iter().position(|c| c.name == "VTODO") {
                Some(index) => Some(index),
                None => return Ok(None),
            }
        };
        let mut record = Record {
            path: path.to_path_buf(),
            root,
            todo_index,
            uid: String::new(),
        };
        record.uid = match record.todo().text("UID").filter(|u| !u.trim().is_empty()) {
            Some(uid) => uid.trim().to_string(),
            None => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                warn!(path = %path.display(), "VTODO without UID, using file name");
                stem
            }
        };
        Ok(Some(record))
    }

    fn todo(&self) -> &Component {
        match self.todo_index {
            Some(index) => &self.root.components[index],
            None => &self.root,
        }
    }

    fn todo_mut(&mut self) -> &mut Component {
        match self.todo_index {
            Some(index) => &mut self.root.components[index],
            None => &mut self.root,
        }
    }

    /// Stamp LAST-MODIFIED and write the VTODO back into its file, keeping
    /// whatever else the file holds now.
    fn write(&mut self, now: &str) -> BoardResult<()> {
        self.todo_mut().set_raw("LAST-MODIFIED", now);
        let todo = self.todo().clone();

        let current = fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| Component::parse(&content).ok());
        let root = match current {
            Some(root) if root.name == "VTODO" => todo,
            Some(mut root) => {
                match root.components.iter().position(|c| c.name == "VTODO") {
                    Some(index) => root.components[index] = todo,
                    None => root.components.push(todo),
                }
                root
            }
            None => {
                let mut root = self.root.clone();
                match self.todo_index {
                    Some(index) => root.components[index] = todo,
                    None => root = todo,
                }
                root
            }
        };
        fsutil::atomic_write(&self.path, &root.to_ical())?;
        debug!(path = %self.path.display(), "record written");
        Ok(())
    }
}

/// A loaded directory.
#[derive(Debug)]
struct Directory {
    dir: PathBuf,
    records: Vec<Record>,
    by_uid: HashMap<String, usize>,
    /// Alias id in a category grouping to UID.
    aliases: HashMap<String, String>,
    board: Board,
}

impl Directory {
    fn resolve(&self, id: &str) -> Option<usize> {
        let uid = self.aliases.get(id).map(String::as_str).unwrap_or(id);
        self.by_uid.get(uid).copied()
    }

    fn require(&self, id: &str) -> BoardResult<usize> {
        self.resolve(id)
            .ok_or_else(|| BoardError::node_not_found(id))
    }

    /// Target column and grouping of a column id.
    fn column(&self, id: &str) -> BoardResult<(Column, String)> {
        let column = Column::from_id(id)
            .filter(|_| self.board.depth(id) == Some(1))
            .ok_or_else(|| BoardError::column_not_found(id))?;
        let grouping = self
            .board
            .get(id)
            .and_then(|n| n.parent.clone())
            .ok_or_else(|| BoardError::column_not_found(id))?;
        Ok((column, grouping))
    }
}

pub struct VtodoAdapter {
    next_tag: String,
    retention_days: i64,
    sync: SyncHook,
    uid_source: fn() -> String,
}

fn random_uid() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl VtodoAdapter {
    pub fn new(config: &VtodoConfig, sync: &SyncConfig) -> Self {
        Self {
            next_tag: config.next_tag.clone(),
            retention_days: config.retention_days,
            sync: SyncHook::new(sync.command.clone()),
            uid_source: random_uid,
        }
    }

    /// Replace the generator used for the UID (and file name) of new tasks.
    pub fn with_uid_source(mut self, uid_source: fn() -> String) -> Self {
        self.uid_source = uid_source;
        self
    }

    fn load(&self, dir: &Path, today: NaiveDate) -> BoardResult<Directory> {
        if !dir.is_dir() {
            return Err(BoardError::source_not_found(&dir.display().to_string()));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("ics"))
            })
            .collect();
        paths.sort();

        let mut records = Vec::new();
        let mut by_uid = HashMap::new();
        for path in paths {
            let Some(record) = Record::read(&path)? else {
                warn!(path = %path.display(), "no VTODO in file, skipping");
                continue;
            };
            if by_uid.contains_key(&record.uid) {
                warn!(uid = %record.uid, path = %path.display(), "duplicate UID, skipping");
                continue;
            }
            by_uid.insert(record.uid.clone(), records.len());
            records.push(record);
        }

        let (board, aliases) = self.build_board(dir, &records, today);
        Ok(Directory {
            dir: dir.to_path_buf(),
            records,
            by_uid,
            aliases,
            board,
        })
    }

    fn build_board(
        &self,
        dir: &Path,
        records: &[Record],
        today: NaiveDate,
    ) -> (Board, HashMap<String, String>) {
        let cutoff = today - Duration::days(self.retention_days);
        let visible: Vec<&Record> = records
            .iter()
            .filter(|record| {
                let todo = record.todo();
                let expired = is_completed(todo)
                    && todo
                        .date("COMPLETED")
                        .is_some_and(|d| d.local_date() < cutoff);
                !expired
            })
            .collect();

        let categories: BTreeSet<String> = visible
            .iter()
            .flat_map(|record| record.todo().categories())
            .filter(|c| c != CATCH_ALL_KEY)
            .collect();

        let mut board = Board::new();
        let label = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        add_grouping(&mut board, CATCH_ALL_KEY, &label);
        for category in &categories {
            add_grouping(&mut board, category, category);
        }

        let mut aliases = HashMap::new();
        for record in visible {
            let todo = record.todo();
            let column = column_of(todo, &self.next_tag, today);
            let tags = todo.categories();
            let node = task_node(&record.uid, todo, &tags);

            let catch_all = column_id(&grouping_id(CATCH_ALL_KEY), column);
            if board.add_child(&catch_all, node.clone()).is_err() {
                continue;
            }
            for tag in tags.iter().filter(|t| categories.contains(*t)) {
                let grouping = grouping_id(tag);
                let alias = format!("{}/{}", grouping, record.uid);
                let mut aliased = node.clone();
                aliased.id = alias.clone();
                if board.add_child(&column_id(&grouping, column), aliased).is_ok() {
                    aliases.insert(alias, record.uid.clone());
                }
            }
        }
        (board, aliases)
    }

    fn execute_in(
        &self,
        dir: &Path,
        command: BoardCommand,
        today: NaiveDate,
        now: &str,
    ) -> BoardResult<Outcome> {
        let mut loaded = self.load(dir, today)?;

        match command {
            BoardCommand::LoadAll => Ok(Outcome::Board(loaded.board)),
            BoardCommand::MoveNodes {
                item_ids,
                target_column,
            } => {
                let (target, _) = loaded.column(&target_column)?;
                let uids = item_ids
                    .iter()
                    .map(|id| loaded.require(id).map(|i| loaded.records[i].uid.clone()))
                    .collect::<BoardResult<Vec<_>>>()?;

                let pending = uids.iter().any(|uid| {
                    loaded.by_uid.get(uid).is_some_and(|&i| {
                        column_of(loaded.records[i].todo(), &self.next_tag, today) != target
                    })
                });
                if !pending {
                    debug!(target = ?target, "all tasks already in place");
                    return Ok(Outcome::Updated(0));
                }

                // Reload: the directory may have changed since the check.
                let mut fresh = self.load(dir, today)?;
                let mut dirty: Vec<usize> = Vec::new();
                for uid in &uids {
                    let Some(&index) = fresh.by_uid.get(uid) else {
                        warn!(uid = %uid, "task vanished before move");
                        continue;
                    };
                    let todo = fresh.records[index].todo_mut();
                    if make_member(todo, target, &self.next_tag, today, now) && !dirty.contains(&index) {
                        dirty.push(index);
                    }
                }
                for &index in &dirty {
                    fresh.records[index].write(now)?;
                }
                info!(updated = dirty.len(), target = ?target, "tasks moved");
                Ok(Outcome::Updated(dirty.len()))
            }
            BoardCommand::DeleteNodes { item_ids } => {
                let doomed: HashSet<usize> =
                    item_ids.iter().filter_map(|id| loaded.resolve(id)).collect();
                for index in doomed {
                    let path = &loaded.records[index].path;
                    match fs::remove_file(path) {
                        Ok(()) => info!(path = %path.display(), "task deleted"),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(Outcome::Done)
            }
            BoardCommand::ChangeLabel { item_id, new_label } => {
                let index = loaded.require(&item_id)?;
                let record = &mut loaded.records[index];
                if record.todo().text("SUMMARY").as_deref() != Some(new_label.as_str()) {
                    record.todo_mut().set_text("SUMMARY", &new_label);
                    record.write(now)?;
                }
                Ok(Outcome::Done)
            }
            BoardCommand::ChangePrio { item_id, prio } => {
                let index = loaded.require(&item_id)?;
                let record = &mut loaded.records[index];
                let wanted = encode_priority(prio);
                if stored_priority(record.todo()) != wanted {
                    match wanted {
                        Some(value) => record.todo_mut().set_raw("PRIORITY", value.to_string()),
                        None => {
                            record.todo_mut().remove("PRIORITY");
                        }
                    }
                    record.write(now)?;
                }
                Ok(Outcome::Done)
            }
            BoardCommand::ChangeTags {
                item_id,
                tags,
                action,
            } => {
                let index = loaded.require(&item_id)?;
                let record = &mut loaded.records[index];
                let old = record.todo().categories();
                let new = action.apply(&old, &tags);
                if new != old {
                    record.todo_mut().set_categories(&new);
                    record.write(now)?;
                }
                Ok(Outcome::Done)
            }
            BoardCommand::ChangeDescription {
                item_id,
                new_description,
            } => {
                let index = loaded.require(&item_id)?;
                let record = &mut loaded.records[index];
                if record.todo().text("DESCRIPTION") != new_description {
                    match &new_description {
                        Some(text) => record.todo_mut().set_text("DESCRIPTION", text),
                        None => {
                            record.todo_mut().remove("DESCRIPTION");
                        }
                    }
                    record.write(now)?;
                }
                Ok(Outcome::Done)
            }
            BoardCommand::AddNode {
                label,
                target_column,
                prio,
                tags,
            } => {
                let (column, grouping) = loaded.column(&target_column)?;
                let mut tags = tags;
                if grouping != grouping_id(CATCH_ALL_KEY) {
                    if let Some(category) = grouping.strip_prefix(CATEGORY_PREFIX) {
                        if !tags.iter().any(|t| t == category) {
                            tags.push(category.to_string());
                        }
                    }
                }
                let uid = (self.uid_source)();
                let todo = new_todo(&uid, &label, prio, tags, column, &self.next_tag, now);

                let mut calendar = Component::new("VCALENDAR");
                calendar.set_raw("VERSION", "2.0");
                calendar.set_raw("PRODID", PRODID);
                calendar.components.push(todo);

                let path = loaded.dir.join(format!("{}.ics", uid));
                fsutil::create_new(&path, &calendar.to_ical())?;
                info!(uid = %uid, path = %path.display(), "task created");
                Ok(Outcome::Done)
            }
            BoardCommand::Sync => {
                self.sync.run(dir)?;
                Ok(Outcome::Done)
            }
        }
    }
}

impl Adapter for VtodoAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Vtodo
    }

    fn commands(&self) -> &'static [CommandKind] {
        COMMANDS
    }

    fn execute(&self, source: &str, command: BoardCommand) -> BoardResult<Outcome> {
        if !self.supports(command.kind()) {
            return Err(unsupported(self.kind(), &command));
        }
        let today = Local::now().date_naive();
        let now = utc_stamp(Utc::now());
        self.execute_in(Path::new(source), command, today, &now)
    }
}

fn add_grouping(board: &mut Board, key: &str, label: &str) {
    let id = grouping_id(key);
    board.add_root(Node::new(id.clone(), label));
    for column in Column::ALL {
        let _ = board.add_child(&id, Node::new(column_id(&id, column), column.label()));
    }
}

fn task_node(uid: &str, todo: &Component, tags: &[String]) -> Node {
    let mut node = Node::new(uid, todo.text("SUMMARY").unwrap_or_default())
        .with_priority(decode_priority(stored_priority(todo)))
        .with_tags(tags.to_vec())
        .with_description(todo.text("DESCRIPTION"));
    node.creation_date = todo.date("CREATED").map(|d| d.display());
    node.completion_date = todo.date("COMPLETED").map(|d| d.display());
    node
}

fn new_todo(
    uid: &str,
    label: &str,
    prio: Priority,
    mut tags: Vec<String>,
    column: Column,
    next_tag: &str,
    now: &str,
) -> Component {
    let mut todo = Component::new("VTODO");
    todo.set_text("UID", uid);
    todo.set_raw("DTSTAMP", now);
    todo.set_raw("CREATED", now);
    todo.set_raw("LAST-MODIFIED", now);
    todo.set_text("SUMMARY", label);
    if let Some(value) = encode_priority(prio) {
        todo.set_raw("PRIORITY", value.to_string());
    }
    match column {
        Column::Todo => todo.set_raw("STATUS", STATUS_TODO),
        Column::Next => {
            todo.set_raw("STATUS", STATUS_TODO);
            if !tags.iter().any(|t| t == next_tag) {
                tags.push(next_tag.to_string());
            }
        }
        Column::Active => {
            todo.set_raw("STATUS", STATUS_TODO);
            todo.set_raw("DUE", now);
        }
        Column::Done => {
            todo.set_raw("STATUS", STATUS_DONE);
            todo.set_raw("COMPLETED", now);
        }
    }
    todo.set_categories(&tags);
    todo
}
