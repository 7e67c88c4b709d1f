//! UI-facing mediator between a caller and an adapter backend.
//!
//! The controller speaks the wire protocol only. It owns the negotiated
//! version and a cached copy of the board which is replaced wholesale after
//! every successful mutation.

use crate::error::{BoardError, BoardResult, ErrorCode};
use crate::fsutil;
use crate::protocol::{
    BoardCommand, CommandEnvelope, Feature, ProtocolRegistry, Response, TagAction,
    highest_common_version,
};
use crate::types::{Board, Node, Priority};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Anything that answers protocol requests.
pub trait Backend {
    fn query(&self, request: &Value) -> Value;
}

pub struct Controller {
    backend: Box<dyn Backend>,
    registry: Arc<ProtocolRegistry>,
    /// Versions this side is willing to speak.
    versions: Vec<String>,
    version: String,
    source: String,
    is_local: bool,
    board: Board,
    features: Vec<Feature>,
    generation: u64,
    mtime: Option<SystemTime>,
}

impl Controller {
    /// Connect to `source` and load it. `versions` limits which registered
    /// versions may be negotiated; the highest one is tried first.
    pub fn connect(
        backend: Box<dyn Backend>,
        registry: Arc<ProtocolRegistry>,
        versions: &[String],
        source: &str,
        is_local: bool,
    ) -> BoardResult<Self> {
        let versions: Vec<String> = registry
            .versions()
            .into_iter()
            .filter(|v| versions.contains(v))
            .collect();
        let version = versions
            .last()
            .cloned()
            .ok_or_else(|| BoardError::negotiation_failed("no usable protocol version configured"))?;

        let mut controller = Self {
            backend,
            registry,
            versions,
            version,
            source: source.to_string(),
            is_local,
            board: Board::new(),
            features: Vec::new(),
            generation: 0,
            mtime: None,
        };
        controller.reload()?;
        Ok(controller)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Bumped whenever previously handed-out node ids may have changed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the cache with a fresh `load_all`.
    pub fn reload(&mut self) -> BoardResult<()> {
        let response = self.send(&BoardCommand::LoadAll)?;
        let protocol = self.registry.get(&self.version)?;
        let data = response
            .data
            .as_ref()
            .ok_or_else(|| BoardError::malformed("load_all response has no board"))?;
        self.board = protocol.decode_board(data)?;
        self.features = response.features;
        self.mtime = self.current_mtime();
        debug!(source = %self.source, nodes = self.board.len(), "board reloaded");
        Ok(())
    }

    /// Send a command; successful commands other than `load_all` are
    /// followed by a reload.
    pub fn command(&mut self, command: BoardCommand) -> BoardResult<Response> {
        let kind = command.kind();
        let response = self.send(&command)?;
        if matches!(command, BoardCommand::LoadAll) {
            let protocol = self.registry.get(&self.version)?;
            if let Some(data) = &response.data {
                self.board = protocol.decode_board(data)?;
            }
            self.features = response.features.clone();
            self.mtime = self.current_mtime();
            return Ok(response);
        }

        if kind.is_mutation() && response.has_feature(Feature::AutogeneratedNodeIds) {
            self.generation += 1;
        }
        self.reload()?;
        Ok(response)
    }

    /// Whether the source changed on disk since the last load. Remote
    /// sources are never stale.
    pub fn is_stale(&self) -> bool {
        self.is_local && self.current_mtime() != self.mtime
    }

    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.board.roots()
    }

    pub fn children(&self, id: &str) -> impl Iterator<Item = &Node> {
        self.board.children(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.board.get(id)
    }

    /// Move items into a column; returns the number of records written
    /// when the adapter reports it.
    pub fn move_nodes(&mut self, item_ids: Vec<String>, target_column: &str) -> BoardResult<Option<u64>> {
        let response = self.command(BoardCommand::MoveNodes {
            item_ids,
            target_column: target_column.to_string(),
        })?;
        Ok(response
            .data
            .as_ref()
            .and_then(|data| data.get("updated"))
            .and_then(Value::as_u64))
    }

    pub fn delete_nodes(&mut self, item_ids: Vec<String>) -> BoardResult<()> {
        self.command(BoardCommand::DeleteNodes { item_ids }).map(drop)
    }

    pub fn change_label(&mut self, item_id: &str, new_label: &str) -> BoardResult<()> {
        self.command(BoardCommand::ChangeLabel {
            item_id: item_id.to_string(),
            new_label: new_label.to_string(),
        })
        .map(drop)
    }

    pub fn change_prio(&mut self, item_id: &str, prio: Priority) -> BoardResult<()> {
        self.command(BoardCommand::ChangePrio {
            item_id: item_id.to_string(),
            prio,
        })
        .map(drop)
    }

    pub fn change_tags(&mut self, item_id: &str, tags: Vec<String>, action: TagAction) -> BoardResult<()> {
        self.command(BoardCommand::ChangeTags {
            item_id: item_id.to_string(),
            tags,
            action,
        })
        .map(drop)
    }

    pub fn change_description(&mut self, item_id: &str, new_description: Option<&str>) -> BoardResult<()> {
        self.command(BoardCommand::ChangeDescription {
            item_id: item_id.to_string(),
            new_description: new_description.map(str::to_string),
        })
        .map(drop)
    }

    pub fn add_node(
        &mut self,
        label: &str,
        target_column: &str,
        prio: Priority,
        tags: Vec<String>,
    ) -> BoardResult<()> {
        self.command(BoardCommand::AddNode {
            label: label.to_string(),
            target_column: target_column.to_string(),
            prio,
            tags,
        })
        .map(drop)
    }

    pub fn sync(&mut self) -> BoardResult<()> {
        self.command(BoardCommand::Sync).map(drop)
    }

    /// Exchange once; on a version mismatch renegotiate and retry once.
    fn send(&mut self, command: &BoardCommand) -> BoardResult<Response> {
        match self.exchange(command) {
            Err(err) if err.code == ErrorCode::VersionUnsupported => {
                self.renegotiate(&err)?;
                self.exchange(command).map_err(|err| {
                    if err.code == ErrorCode::VersionUnsupported {
                        BoardError::negotiation_failed(format!(
                            "backend rejected renegotiated version {}",
                            self.version
                        ))
                    } else {
                        err
                    }
                })
            }
            other => other,
        }
    }

    fn exchange(&self, command: &BoardCommand) -> BoardResult<Response> {
        let protocol = self.registry.get(&self.version)?;
        let request = CommandEnvelope::new(command.clone(), &self.source, protocol.version());
        let raw = self.backend.query(&request.to_value());
        protocol.validate_response(&raw)?;
        let response = protocol.decode_response(&raw)?;
        match response.error() {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }

    fn renegotiate(&mut self, err: &BoardError) -> BoardResult<()> {
        let theirs = err.supported_versions.clone().unwrap_or_default();
        let chosen = highest_common_version(&self.versions, &theirs)
            .filter(|v| *v != self.version)
            .ok_or_else(|| {
                BoardError::negotiation_failed(format!(
                    "no common protocol version (ours: {:?}, theirs: {:?})",
                    self.versions, theirs
                ))
            })?;
        info!(from = %self.version, to = %chosen, "protocol version renegotiated");
        self.version = chosen;
        Ok(())
    }

    fn current_mtime(&self) -> Option<SystemTime> {
        if self.is_local {
            fsutil::modified_time(Path::new(&self.source))
        } else {
            None
        }
    }
}
