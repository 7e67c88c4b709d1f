//! Versioned wire protocol: envelopes, responses and the version registry.
//!
//! Each protocol version is a [`WireProtocol`] implementation. A
//! [`ProtocolRegistry`] is built once at startup and handed to whoever needs
//! to encode or decode, so there is no ambient version state.

pub mod command;
pub mod v1;

use crate::error::{BoardError, BoardResult};
use crate::types::{Board, Node};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::cmp::Ordering;

pub use command::{BoardCommand, CommandKind, TagAction};

/// Pseudo-version that resolves to the highest registered version.
pub const MAX_VERSION: &str = "max";

/// A command as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    pub source: String,
    pub version: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl CommandEnvelope {
    pub fn new(command: BoardCommand, source: &str, version: &str) -> Self {
        Self {
            command: command.kind().as_str().to_string(),
            source: source.to_string(),
            version: version.to_string(),
            arguments: command.to_arguments(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "command": self.command,
            "source": self.source,
            "version": self.version,
            "arguments": self.arguments,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Fail,
}

/// Capabilities an adapter advertises on its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Node ids are derived from content and change after structural edits.
    AutogeneratedNodeIds,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::AutogeneratedNodeIds => "autogenerate_node_ids",
        }
    }

    /// Unknown feature names map to `None` so newer peers stay readable.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "autogenerate_node_ids" => Some(Feature::AutogeneratedNodeIds),
            _ => None,
        }
    }
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub version: String,
    pub status: Status,
    pub features: Vec<Feature>,
    pub data: Option<Value>,
}

impl Response {
    pub fn ok(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            status: Status::Ok,
            features: Vec::new(),
            data: None,
        }
    }

    /// A failure response carrying `{"error": <BoardError>}` as data.
    pub fn fail(version: impl Into<String>, error: &BoardError) -> Self {
        let data = serde_json::to_value(error)
            .map(|err| json!({ "error": err }))
            .unwrap_or_else(|_| json!({ "error": { "code": "INTERNAL_ERROR", "message": error.message } }));
        Self {
            version: version.into(),
            status: Status::Fail,
            features: Vec::new(),
            data: Some(data),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_features(mut self, features: &[Feature]) -> Self {
        self.features = features.to_vec();
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// The structured error of a failed response.
    ///
    /// A failure without a decodable error still yields an internal error so
    /// callers never mistake it for success.
    pub fn error(&self) -> Option<BoardError> {
        if self.is_ok() {
            return None;
        }
        let decoded = self
            .data
            .as_ref()
            .and_then(|data| data.get("error"))
            .and_then(|err| serde_json::from_value::<BoardError>(err.clone()).ok());
        Some(decoded.unwrap_or_else(|| {
            BoardError::internal(format!("request failed without error details: {:?}", self.data))
        }))
    }
}

/// The per-version encode/decode/validate table.
pub trait WireProtocol: Send + Sync {
    /// Version tag, e.g. `"1"`.
    fn version(&self) -> &str;

    /// Commands valid under this version.
    fn commands(&self) -> &[CommandKind];

    fn supports(&self, kind: CommandKind) -> bool {
        self.commands().contains(&kind)
    }

    fn encode_node(&self, node: &Node) -> Value;
    fn decode_node(&self, value: &Value) -> BoardResult<Node>;

    fn encode_board(&self, board: &Board) -> Value;
    fn decode_board(&self, value: &Value) -> BoardResult<Board>;

    fn encode_response(&self, response: &Response) -> Value;
    fn decode_response(&self, value: &Value) -> BoardResult<Response>;

    /// Check a raw request and return its envelope.
    fn validate_request(&self, value: &Value) -> BoardResult<CommandEnvelope>;
    fn validate_response(&self, value: &Value) -> BoardResult<()>;
}

/// Compare version tags, numerically when both are integers.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Highest version present in both lists.
pub fn highest_common_version(ours: &[String], theirs: &[String]) -> Option<String> {
    ours.iter()
        .filter(|v| theirs.contains(v))
        .max_by(|a, b| compare_versions(a, b))
        .cloned()
}

/// Immutable table from version tag to protocol implementation.
pub struct ProtocolRegistry {
    protocols: Vec<Box<dyn WireProtocol>>,
}

impl ProtocolRegistry {
    /// Build a registry; later entries with a duplicate tag are ignored.
    pub fn new(protocols: Vec<Box<dyn WireProtocol>>) -> Self {
        let mut unique: Vec<Box<dyn WireProtocol>> = Vec::new();
        for protocol in protocols {
            if !unique.iter().any(|p| p.version() == protocol.version()) {
                unique.push(protocol);
            }
        }
        unique.sort_by(|a, b| compare_versions(a.version(), b.version()));
        Self { protocols: unique }
    }

    /// Every version this crate ships.
    pub fn standard() -> Self {
        Self::new(vec![Box::new(v1::ProtocolV1)])
    }

    /// Look up a version tag; `"max"` resolves to the highest version.
    pub fn get(&self, version: &str) -> BoardResult<&dyn WireProtocol> {
        let found = if version == MAX_VERSION {
            self.protocols.last()
        } else {
            self.protocols.iter().find(|p| p.version() == version)
        };
        found
            .map(|p| p.as_ref())
            .ok_or_else(|| BoardError::version_unsupported(version, self.versions()))
    }

    pub fn contains(&self, version: &str) -> bool {
        self.get(version).is_ok()
    }

    /// Registered versions, lowest first.
    pub fn versions(&self) -> Vec<String> {
        self.protocols
            .iter()
            .map(|p| p.version().to_string())
            .collect()
    }

    pub fn highest(&self) -> Option<&str> {
        self.protocols.last().map(|p| p.version())
    }
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("versions", &self.versions())
            .finish()
    }
}
