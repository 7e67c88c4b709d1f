//! Core types: the portable node model and the id-keyed board arena.

use crate::error::{BoardError, BoardResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Task priority on the portable 0..=3 scale.
///
/// Formats map their own encodings onto this range; entries that carry no
/// explicit priority get `Medium`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    /// No priority (strikethrough / done in Markdown, no PRIORITY in VTODO).
    Lowest = 0,
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Lowest,
        Priority::Low,
        Priority::Medium,
        Priority::High,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Priority::Lowest),
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Lowest => "none",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::from_u8(value).ok_or_else(|| format!("priority out of range: {}", value))
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.as_u8()
    }
}

/// One board element: a root (grouping), a column, or a task entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    /// Id of the containing node; `None` for roots.
    pub parent: Option<String>,
    /// Ordered child ids. Order defines on-screen position.
    #[serde(default)]
    pub children: Vec<String>,
    /// Index within the parent's children (or among the roots).
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub completion_date: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            parent: None,
            children: Vec::new(),
            position: 0,
            priority: Priority::default(),
            tags: Vec::new(),
            description: None,
            creation_date: None,
            completion_date: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A loaded tree of nodes.
///
/// Nodes reference each other only by id through the single owning map, so
/// renaming an id is a key rewrite plus a scan over `children` lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Board {
    nodes: BTreeMap<String, Node>,
    roots: Vec<String>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from a flat node list, ordering roots by position.
    pub fn from_nodes(nodes: Vec<Node>) -> BoardResult<Self> {
        let mut map = BTreeMap::new();
        for node in nodes {
            let id = node.id.clone();
            if map.insert(id.clone(), node).is_some() {
                return Err(BoardError::malformed(format!("duplicate node id {}", id)));
            }
        }

        let mut roots: Vec<&Node> = map.values().filter(|n| n.is_root()).collect();
        roots.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        let roots = roots.into_iter().map(|n| n.id.clone()).collect();

        let board = Self { nodes: map, roots };
        board.validate()?;
        Ok(board)
    }

    /// Append a root node. Returns its id.
    pub fn add_root(&mut self, mut node: Node) -> String {
        node.parent = None;
        node.position = self.roots.len();
        let id = node.id.clone();
        self.roots.push(id.clone());
        self.nodes.insert(id.clone(), node);
        id
    }

    /// Append `node` as the last child of `parent_id`. Returns its id.
    pub fn add_child(&mut self, parent_id: &str, mut node: Node) -> BoardResult<String> {
        if self.nodes.contains_key(&node.id) {
            return Err(BoardError::internal(format!(
                "node id {} is already present",
                node.id
            )));
        }
        let parent = self
            .nodes
            .get_mut(parent_id)
            .ok_or_else(|| BoardError::node_not_found(parent_id))?;
        node.parent = Some(parent_id.to_string());
        node.position = parent.children.len();
        let id = node.id.clone();
        parent.children.push(id.clone());
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_ids(&self) -> &[String] {
        &self.roots
    }

    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Children of `id` in order; empty for unknown ids.
    pub fn children(&self, id: &str) -> impl Iterator<Item = &Node> {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(child))
    }

    pub fn child_by_label(&self, parent_id: &str, label: &str) -> Option<&Node> {
        self.children(parent_id).find(|n| n.label == label)
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of ancestors of `id` (roots have depth 0).
    pub fn depth(&self, id: &str) -> Option<usize> {
        let mut node = self.nodes.get(id)?;
        let mut depth = 0;
        while let Some(parent) = node.parent.as_deref() {
            node = self.nodes.get(parent)?;
            depth += 1;
            if depth > self.nodes.len() {
                return None;
            }
        }
        Some(depth)
    }

    /// Unlink `id` from its parent (or the root list) without dropping it.
    /// Returns the former parent id.
    pub fn detach(&mut self, id: &str) -> Option<String> {
        let parent = self.nodes.get(id)?.parent.clone();
        match parent.as_deref() {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(parent_id) {
                    parent.children.retain(|c| c != id);
                }
            }
            None => self.roots.retain(|r| r != id),
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = None;
        }
        self.renumber();
        parent
    }

    /// Append an existing, detached node to `parent_id`'s children.
    pub fn attach(&mut self, parent_id: &str, id: &str) -> BoardResult<()> {
        if !self.nodes.contains_key(id) {
            return Err(BoardError::node_not_found(id));
        }
        let parent = self
            .nodes
            .get_mut(parent_id)
            .ok_or_else(|| BoardError::node_not_found(parent_id))?;
        parent.children.push(id.to_string());
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(parent_id.to_string());
        }
        self.renumber();
        Ok(())
    }

    /// Remove `id` and its whole subtree. Unknown ids are a no-op.
    pub fn remove(&mut self, id: &str) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        self.detach(id);
        let mut pending = vec![id.to_string()];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                pending.extend(node.children);
            }
        }
        true
    }

    /// Recompute every `position` from list order.
    pub fn renumber(&mut self) {
        let mut updates: Vec<(String, usize)> = Vec::new();
        for (pos, id) in self.roots.iter().enumerate() {
            updates.push((id.clone(), pos));
        }
        for node in self.nodes.values() {
            for (pos, child) in node.children.iter().enumerate() {
                updates.push((child.clone(), pos));
            }
        }
        for (id, pos) in updates {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.position = pos;
            }
        }
    }

    /// Recompute positions and ids top-down with `derive(parent_id, label, position)`.
    ///
    /// Roots use an empty parent id. All references are rewritten in one pass,
    /// so swapped or shifted siblings never collide mid-update. Nodes not
    /// reachable from a root are dropped.
    pub fn reindex<F>(&mut self, derive: F)
    where
        F: Fn(&str, &str, usize) -> String,
    {
        let mut renamed: HashMap<String, (String, usize)> = HashMap::new();
        let mut stack: Vec<(String, String, usize)> = self
            .roots
            .iter()
            .enumerate()
            .rev()
            .map(|(pos, id)| (id.clone(), String::new(), pos))
            .collect();

        while let Some((old_id, parent_new, pos)) = stack.pop() {
            let Some(node) = self.nodes.get(&old_id) else {
                continue;
            };
            let new_id = derive(&parent_new, &node.label, pos);
            for (child_pos, child) in node.children.iter().enumerate().rev() {
                stack.push((child.clone(), new_id.clone(), child_pos));
            }
            renamed.insert(old_id, (new_id, pos));
        }

        let lookup = |id: &String| renamed.get(id).map(|(new_id, _)| new_id.clone());
        let old_nodes = std::mem::take(&mut self.nodes);
        for (old_id, mut node) in old_nodes {
            let Some((new_id, pos)) = renamed.get(&old_id) else {
                continue;
            };
            node.id = new_id.clone();
            node.position = *pos;
            node.parent = node.parent.as_ref().and_then(lookup);
            node.children = node.children.iter().filter_map(lookup).collect();
            self.nodes.insert(new_id.clone(), node);
        }
        self.roots = self.roots.iter().filter_map(lookup).collect();
    }

    /// Check the forest invariants: no dangling or duplicate children, every
    /// non-root listed by exactly its parent, and no cycles.
    pub fn validate(&self) -> BoardResult<()> {
        let mut listed: HashSet<&str> = HashSet::new();
        for node in self.nodes.values() {
            for child in &node.children {
                let Some(child_node) = self.nodes.get(child) else {
                    return Err(BoardError::malformed(format!(
                        "node {} lists missing child {}",
                        node.id, child
                    )));
                };
                if child_node.parent.as_deref() != Some(node.id.as_str()) {
                    return Err(BoardError::malformed(format!(
                        "node {} lists {} whose parent differs",
                        node.id, child
                    )));
                }
                if !listed.insert(child.as_str()) {
                    return Err(BoardError::malformed(format!(
                        "node {} is listed more than once",
                        child
                    )));
                }
            }
        }

        for node in self.nodes.values() {
            match node.parent {
                Some(_) if !listed.contains(node.id.as_str()) => {
                    return Err(BoardError::malformed(format!(
                        "node {} is not listed by its parent",
                        node.id
                    )));
                }
                None if !self.roots.contains(&node.id) => {
                    return Err(BoardError::malformed(format!(
                        "root {} is missing from the root list",
                        node.id
                    )));
                }
                _ => {}
            }
        }

        // Every node must be reachable from a root exactly once.
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = self.roots.iter().map(String::as_str).collect();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                return Err(BoardError::malformed(format!("cycle through {}", id)));
            }
            if let Some(node) = self.nodes.get(id) {
                pending.extend(node.children.iter().map(String::as_str));
            }
        }
        if seen.len() != self.nodes.len() {
            return Err(BoardError::malformed("board contains a cycle"));
        }
        Ok(())
    }
}
