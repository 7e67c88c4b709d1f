//! The closed command set and its typed arguments.

use crate::error::{BoardError, BoardResult};
use crate::types::Priority;
use serde_json::{Map, Value, json};
use std::fmt;

/// Every command name the wire protocol knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    LoadAll,
    MoveNodes,
    DeleteNodes,
    ChangeLabel,
    ChangePrio,
    ChangeTags,
    ChangeDescription,
    AddNode,
    Sync,
}

impl CommandKind {
    pub const ALL: [CommandKind; 9] = [
        CommandKind::LoadAll,
        CommandKind::MoveNodes,
        CommandKind::DeleteNodes,
        CommandKind::ChangeLabel,
        CommandKind::ChangePrio,
        CommandKind::ChangeTags,
        CommandKind::ChangeDescription,
        CommandKind::AddNode,
        CommandKind::Sync,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::LoadAll => "load_all",
            CommandKind::MoveNodes => "move_nodes",
            CommandKind::DeleteNodes => "delete_nodes",
            CommandKind::ChangeLabel => "change_label",
            CommandKind::ChangePrio => "change_prio",
            CommandKind::ChangeTags => "change_tags",
            CommandKind::ChangeDescription => "change_description",
            CommandKind::AddNode => "add_node",
            CommandKind::Sync => "sync",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether the command writes to the backing store.
    pub fn is_mutation(self) -> bool {
        !matches!(self, CommandKind::LoadAll | CommandKind::Sync)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `change_tags` combines the given tags with the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    Add,
    Remove,
    Clear,
}

impl TagAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TagAction::Add => "add",
            TagAction::Remove => "remove",
            TagAction::Clear => "clear",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "add" => Some(TagAction::Add),
            "remove" => Some(TagAction::Remove),
            "clear" => Some(TagAction::Clear),
            _ => None,
        }
    }

    /// Apply the action with set semantics, keeping the order of `current`.
    pub fn apply(self, current: &[String], tags: &[String]) -> Vec<String> {
        match self {
            TagAction::Add => {
                let mut result = current.to_vec();
                for tag in tags {
                    if !result.contains(tag) {
                        result.push(tag.clone());
                    }
                }
                result
            }
            TagAction::Remove => current
                .iter()
                .filter(|tag| !tags.contains(tag))
                .cloned()
                .collect(),
            TagAction::Clear => Vec::new(),
        }
    }
}

/// A decoded command with typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardCommand {
    LoadAll,
    MoveNodes {
        item_ids: Vec<String>,
        target_column: String,
    },
    DeleteNodes {
        item_ids: Vec<String>,
    },
    ChangeLabel {
        item_id: String,
        new_label: String,
    },
    ChangePrio {
        item_id: String,
        prio: Priority,
    },
    ChangeTags {
        item_id: String,
        tags: Vec<String>,
        action: TagAction,
    },
    ChangeDescription {
        item_id: String,
        new_description: Option<String>,
    },
    AddNode {
        label: String,
        target_column: String,
        prio: Priority,
        tags: Vec<String>,
    },
    Sync,
}

impl BoardCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            BoardCommand::LoadAll => CommandKind::LoadAll,
            BoardCommand::MoveNodes { .. } => CommandKind::MoveNodes,
            BoardCommand::DeleteNodes { .. } => CommandKind::DeleteNodes,
            BoardCommand::ChangeLabel { .. } => CommandKind::ChangeLabel,
            BoardCommand::ChangePrio { .. } => CommandKind::ChangePrio,
            BoardCommand::ChangeTags { .. } => CommandKind::ChangeTags,
            BoardCommand::ChangeDescription { .. } => CommandKind::ChangeDescription,
            BoardCommand::AddNode { .. } => CommandKind::AddNode,
            BoardCommand::Sync => CommandKind::Sync,
        }
    }

    /// Decode the argument bag of a `kind` command.
    pub fn from_arguments(kind: CommandKind, args: &Value) -> BoardResult<Self> {
        let command = match kind {
            CommandKind::LoadAll => BoardCommand::LoadAll,
            CommandKind::Sync => BoardCommand::Sync,
            CommandKind::MoveNodes => BoardCommand::MoveNodes {
                item_ids: require_string_array(args, "item_ids")?,
                target_column: require_string(args, "target_column")?,
            },
            CommandKind::DeleteNodes => BoardCommand::DeleteNodes {
                item_ids: require_string_array(args, "item_ids")?,
            },
            CommandKind::ChangeLabel => BoardCommand::ChangeLabel {
                item_id: require_string(args, "item_id")?,
                new_label: require_string(args, "new_label")?,
            },
            CommandKind::ChangePrio => BoardCommand::ChangePrio {
                item_id: require_string(args, "item_id")?,
                prio: get_priority(args, "prio")?
                    .ok_or_else(|| BoardError::missing_field("prio"))?,
            },
            CommandKind::ChangeTags => {
                let action = require_string(args, "action")?;
                let action = TagAction::parse(&action).ok_or_else(|| {
                    BoardError::invalid_value("action", "action must be add, remove or clear")
                })?;
                let tags = match action {
                    TagAction::Clear => get_string_array(args, "tags")?.unwrap_or_default(),
                    _ => require_string_array(args, "tags")?,
                };
                BoardCommand::ChangeTags {
                    item_id: require_string(args, "item_id")?,
                    tags,
                    action,
                }
            }
            CommandKind::ChangeDescription => {
                let new_description = match args.get("new_description") {
                    None => return Err(BoardError::missing_field("new_description")),
                    Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(_) => {
                        return Err(BoardError::invalid_value(
                            "new_description",
                            "new_description must be a string or null",
                        ));
                    }
                };
                BoardCommand::ChangeDescription {
                    item_id: require_string(args, "item_id")?,
                    new_description,
                }
            }
            CommandKind::AddNode => BoardCommand::AddNode {
                label: require_string(args, "label")?,
                target_column: require_string(args, "target_column")?,
                prio: get_priority(args, "prio")?.unwrap_or_default(),
                tags: get_string_array(args, "tags")?.unwrap_or_default(),
            },
        };
        Ok(command)
    }

    /// Encode the typed arguments back into a wire argument bag.
    pub fn to_arguments(&self) -> Map<String, Value> {
        let value = match self {
            BoardCommand::LoadAll | BoardCommand::Sync => json!({}),
            BoardCommand::MoveNodes {
                item_ids,
                target_column,
            } => json!({ "item_ids": item_ids, "target_column": target_column }),
            BoardCommand::DeleteNodes { item_ids } => json!({ "item_ids": item_ids }),
            BoardCommand::ChangeLabel { item_id, new_label } => {
                json!({ "item_id": item_id, "new_label": new_label })
            }
            BoardCommand::ChangePrio { item_id, prio } => {
                json!({ "item_id": item_id, "prio": prio.as_u8() })
            }
            BoardCommand::ChangeTags {
                item_id,
                tags,
                action,
            } => json!({ "item_id": item_id, "tags": tags, "action": action.as_str() }),
            BoardCommand::ChangeDescription {
                item_id,
                new_description,
            } => json!({ "item_id": item_id, "new_description": new_description }),
            BoardCommand::AddNode {
                label,
                target_column,
                prio,
                tags,
            } => json!({
                "label": label,
                "target_column": target_column,
                "prio": prio.as_u8(),
                "tags": tags,
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Helper to get a string from arguments.
pub fn get_string(args: &Value, key: &str) -> BoardResult<Option<String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(BoardError::invalid_value(
            key,
            &format!("{} must be a string", key),
        )),
    }
}

/// Helper to get a required string from arguments.
pub fn require_string(args: &Value, key: &str) -> BoardResult<String> {
    get_string(args, key)?.ok_or_else(|| BoardError::missing_field(key))
}

/// Helper to get a string array from arguments.
pub fn get_string_array(args: &Value, key: &str) -> BoardResult<Option<Vec<String>>> {
    let Some(value) = args.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let invalid = || BoardError::invalid_value(key, &format!("{} must be a list of strings", key));
    let items = value.as_array().ok_or_else(invalid)?;
    items
        .iter()
        .map(|item| item.as_str().map(String::from).ok_or_else(invalid))
        .collect::<BoardResult<Vec<_>>>()
        .map(Some)
}

/// Helper to get a required string array from arguments.
pub fn require_string_array(args: &Value, key: &str) -> BoardResult<Vec<String>> {
    get_string_array(args, key)?.ok_or_else(|| BoardError::missing_field(key))
}

/// Helper to get a priority (0..=3) from arguments.
pub fn get_priority(args: &Value, key: &str) -> BoardResult<Option<Priority>> {
    let Some(value) = args.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    value
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .and_then(Priority::from_u8)
        .map(Some)
        .ok_or_else(|| BoardError::invalid_value(key, "prio must be an integer from 0 to 3"))
}
