//! Wire request to adapter call to wire response.

use crate::adapter::{Adapter, Outcome};
use crate::controller::Backend;
use crate::error::{BoardError, BoardResult};
use crate::protocol::{
    BoardCommand, CommandKind, MAX_VERSION, ProtocolRegistry, Response, WireProtocol,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// Serves protocol requests for one adapter.
pub struct Dispatcher {
    registry: Arc<ProtocolRegistry>,
    adapter: Box<dyn Adapter>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ProtocolRegistry>, adapter: Box<dyn Adapter>) -> Self {
        Self { registry, adapter }
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    /// Handle one request given as JSON text.
    pub fn handle(&self, request: &str) -> Value {
        match serde_json::from_str::<Value>(request) {
            Ok(value) => self.handle_value(&value),
            Err(e) => self.failure(&BoardError::malformed(format!("request is not JSON: {}", e))),
        }
    }

    /// Handle one decoded request. Never fails: errors become `fail` responses.
    pub fn handle_value(&self, request: &Value) -> Value {
        let protocol = match request.get("version") {
            Some(Value::String(version)) => match self.registry.get(version) {
                Ok(protocol) => protocol,
                Err(err) => return self.failure(&err),
            },
            Some(_) => {
                return self.failure(
                    &BoardError::malformed("version must be a string").with_field("version"),
                );
            }
            None => {
                return self.failure(
                    &BoardError::malformed("request has no version").with_field("version"),
                );
            }
        };

        let response = match self.execute(protocol, request) {
            Ok(response) => response,
            Err(err) => {
                warn!(code = ?err.code, message = %err.message, "request failed");
                Response::fail(protocol.version(), &err)
            }
        };
        protocol.encode_response(&response)
    }

    fn execute(&self, protocol: &dyn WireProtocol, request: &Value) -> BoardResult<Response> {
        let envelope = protocol.validate_request(request)?;
        let kind = CommandKind::parse(&envelope.command)
            .filter(|kind| protocol.supports(*kind))
            .ok_or_else(|| BoardError::invalid_command(&envelope.command))?;
        if !self.adapter.supports(kind) {
            return Err(BoardError::unsupported_command(
                kind.as_str(),
                self.adapter.kind().as_str(),
            ));
        }
        let command = BoardCommand::from_arguments(kind, &Value::Object(envelope.arguments))?;

        debug!(
            command = %kind,
            adapter = %self.adapter.kind(),
            source = %envelope.source,
            version = protocol.version(),
            "dispatching"
        );
        let outcome = self.adapter.execute(&envelope.source, command)?;

        let response = Response::ok(protocol.version()).with_features(self.adapter.features());
        Ok(match outcome {
            Outcome::Board(board) => response.with_data(protocol.encode_board(&board)),
            Outcome::Done => response,
            Outcome::Updated(count) => response.with_data(json!({ "updated": count })),
        })
    }

    /// Encode a failure that happened before a version was resolved.
    fn failure(&self, err: &BoardError) -> Value {
        warn!(code = ?err.code, message = %err.message, "request rejected");
        match self.registry.get(MAX_VERSION) {
            Ok(protocol) => protocol.encode_response(&Response::fail(protocol.version(), err)),
            Err(_) => json!({ "version": "", "status": "fail", "data": { "error": err } }),
        }
    }
}

impl Backend for Dispatcher {
    fn query(&self, request: &Value) -> Value {
        self.handle_value(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::markdown::MarkdownAdapter;
    use crate::error::ErrorCode;
    use crate::protocol::v1::ProtocolV1;
    use tempfile::TempDir;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(ProtocolRegistry::standard()), Box::new(MarkdownAdapter))
    }

    fn error_code(response: &Value) -> ErrorCode {
        let decoded = ProtocolV1.decode_response(response).unwrap();
        decoded.error().unwrap().code
    }

    #[test]
    fn missing_version_is_malformed() {
        let response = dispatcher().handle_value(&json!({"command": "load_all", "source": "x"}));
        assert_eq!(response["status"], "fail");
        assert_eq!(error_code(&response), ErrorCode::MalformedRequest);
    }

    #[test]
    fn unknown_version_lists_supported_versions() {
        let response = dispatcher()
            .handle_value(&json!({"command": "load_all", "source": "x", "version": "9"}));
        assert_eq!(error_code(&response), ErrorCode::VersionUnsupported);
        assert_eq!(response["data"]["error"]["supported_versions"], json!(["1"]));
    }

    #[test]
    fn unknown_command_is_invalid() {
        let response = dispatcher()
            .handle_value(&json!({"command": "explode", "source": "x", "version": "1"}));
        assert_eq!(error_code(&response), ErrorCode::InvalidCommand);
    }

    #[test]
    fn unsupported_command_is_invalid() {
        let response = dispatcher()
            .handle_value(&json!({"command": "sync", "source": "x", "version": "1"}));
        assert_eq!(error_code(&response), ErrorCode::InvalidCommand);
    }

    #[test]
    fn garbage_text_is_malformed() {
        let response = dispatcher().handle("{not json");
        assert_eq!(error_code(&response), ErrorCode::MalformedRequest);
    }

    #[test]
    fn load_all_returns_board_and_features() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.md");
        std::fs::write(&path, "# Todo\n\n- a\n").unwrap();
        let request = json!({
            "command": "load_all",
            "source": path.to_string_lossy(),
            "version": "max",
        });
        let response = dispatcher().handle_value(&request);
        assert_eq!(response["status"], "ok");
        assert_eq!(response["version"], "1");
        assert_eq!(response["features"], json!(["autogenerate_node_ids"]));
        assert_eq!(response["data"].as_object().unwrap().len(), 3);
    }

    #[test]
    fn missing_source_is_reported() {
        let response = dispatcher().handle_value(
            &json!({"command": "load_all", "source": "/no/such/board.md", "version": "1"}),
        );
        assert_eq!(error_code(&response), ErrorCode::SourceNotFound);
    }
}
