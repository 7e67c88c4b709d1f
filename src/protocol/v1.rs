//! Protocol version 1.

use super::{CommandEnvelope, CommandKind, Feature, Response, Status, WireProtocol};
use crate::error::{BoardError, BoardResult};
use crate::types::{Board, Node, Priority};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const VERSION: &str = "1";

const COMMANDS: [CommandKind; 9] = CommandKind::ALL;

/// Version 1 node shape.
#[derive(Debug, Serialize, Deserialize)]
struct WireNode {
    id: String,
    label: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    pos: usize,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    prio: Priority,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    creation_date: Option<String>,
    #[serde(default)]
    completion_date: Option<String>,
}

impl From<&Node> for WireNode {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            label: node.label.clone(),
            parent: node.parent.clone(),
            pos: node.position,
            children: node.children.clone(),
            prio: node.priority,
            tags: node.tags.clone(),
            description: node.description.clone(),
            creation_date: node.creation_date.clone(),
            completion_date: node.completion_date.clone(),
        }
    }
}

impl From<WireNode> for Node {
    fn from(wire: WireNode) -> Self {
        Node {
            id: wire.id,
            label: wire.label,
            // Older peers send "" for roots.
            parent: wire.parent.filter(|p| !p.is_empty()),
            children: wire.children,
            position: wire.pos,
            priority: wire.prio,
            tags: wire.tags,
            description: wire.description,
            creation_date: wire.creation_date,
            completion_date: wire.completion_date,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolV1;

impl WireProtocol for ProtocolV1 {
    fn version(&self) -> &str {
        VERSION
    }

    fn commands(&self) -> &[CommandKind] {
        &COMMANDS
    }

    fn encode_node(&self, node: &Node) -> Value {
        serde_json::to_value(WireNode::from(node)).unwrap_or(Value::Null)
    }

    fn decode_node(&self, value: &Value) -> BoardResult<Node> {
        serde_json::from_value::<WireNode>(value.clone())
            .map(Node::from)
            .map_err(|e| BoardError::malformed(format!("invalid node: {}", e)))
    }

    fn encode_board(&self, board: &Board) -> Value {
        let nodes: Map<String, Value> = board
            .nodes()
            .map(|node| (node.id.clone(), self.encode_node(node)))
            .collect();
        Value::Object(nodes)
    }

    fn decode_board(&self, value: &Value) -> BoardResult<Board> {
        let object = value
            .as_object()
            .ok_or_else(|| BoardError::malformed("board must be an object keyed by node id"))?;
        let nodes = object
            .iter()
            .map(|(key, raw)| {
                let node = self.decode_node(raw)?;
                if &node.id != key {
                    return Err(BoardError::malformed(format!(
                        "node keyed {} carries id {}",
                        key, node.id
                    )));
                }
                Ok(node)
            })
            .collect::<BoardResult<Vec<_>>>()?;
        Board::from_nodes(nodes)
    }

    fn encode_response(&self, response: &Response) -> Value {
        let mut object = Map::new();
        object.insert(
            "status".into(),
            serde_json::to_value(response.status).unwrap_or(Value::Null),
        );
        object.insert("version".into(), Value::String(response.version.clone()));
        if !response.features.is_empty() {
            let features = response
                .features
                .iter()
                .map(|f| Value::String(f.as_str().to_string()))
                .collect();
            object.insert("features".into(), Value::Array(features));
        }
        if let Some(data) = &response.data {
            object.insert("data".into(), data.clone());
        }
        Value::Object(object)
    }

    fn decode_response(&self, value: &Value) -> BoardResult<Response> {
        self.validate_response(value)?;
        let status = match value.get("status").and_then(Value::as_str) {
            Some("ok") => Status::Ok,
            _ => Status::Fail,
        };
        let version = value
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or(VERSION)
            .to_string();
        let features = value
            .get("features")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(Feature::parse)
                    .collect()
            })
            .unwrap_or_default();
        let data = value.get("data").filter(|d| !d.is_null()).cloned();
        Ok(Response {
            version,
            status,
            features,
            data,
        })
    }

    fn validate_request(&self, value: &Value) -> BoardResult<CommandEnvelope> {
        let object = value
            .as_object()
            .ok_or_else(|| BoardError::malformed("request must be a JSON object"))?;
        let field = |key: &str| -> BoardResult<String> {
            match object.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(_) => Err(BoardError::malformed(format!("{} must be a string", key))
                    .with_field(key)),
                None => Err(BoardError::malformed(format!("request has no {}", key))
                    .with_field(key)),
            }
        };
        let arguments = match object.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(
                    BoardError::malformed("arguments must be an object").with_field("arguments")
                );
            }
        };
        Ok(CommandEnvelope {
            command: field("command")?,
            source: field("source")?,
            version: field("version")?,
            arguments,
        })
    }

    fn validate_response(&self, value: &Value) -> BoardResult<()> {
        let object = value
            .as_object()
            .ok_or_else(|| BoardError::malformed("response must be a JSON object"))?;
        match object.get("status").and_then(Value::as_str) {
            Some("ok") | Some("fail") => {}
            _ => return Err(BoardError::malformed("response status must be ok or fail")),
        }
        if !object.get("version").is_some_and(Value::is_string) {
            return Err(BoardError::malformed("response has no version"));
        }
        let features_ok = object.get("features").is_none_or(|features| {
            features
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string))
        });
        if !features_ok {
            return Err(BoardError::malformed("features must be a list of strings"));
        }
        Ok(())
    }
}
