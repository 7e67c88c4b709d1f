//! Read-only GitHub issues adapter.

use super::{Adapter, AdapterKind, Outcome, unsupported};
use crate::config::GithubConfig;
use crate::error::{BoardError, BoardResult};
use crate::protocol::{BoardCommand, CommandKind};
use crate::types::{Board, Node};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const COMMANDS: &[CommandKind] = &[CommandKind::LoadAll];

const PER_PAGE: usize = 100;
const USER_AGENT: &str = concat!("taskboard/", env!("CARGO_PKG_VERSION"));

pub const ROOT_ID: &str = "__root";
pub const TODO_ID: &str = "__todo";
pub const ACTIVE_ID: &str = "__active";
pub const DONE_ID: &str = "__done";

pub struct GithubAdapter {
    api_base: String,
    timeout: Duration,
    token_env: String,
}

impl GithubAdapter {
    pub fn new(config: &GithubConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            token_env: config.token_env.clone(),
        }
    }

    /// Fetch every issue of `repo` (`owner/name`), following pagination.
    fn fetch_issues(&self, repo: &str) -> BoardResult<Vec<Value>> {
        if repo.split('/').filter(|p| !p.is_empty()).count() != 2 {
            return Err(BoardError::source_not_found(repo)
                .with_details("expected a repository in owner/name form"));
        }

        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let token = std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        let url = format!("{}/repos/{}/issues", self.api_base, repo);

        let mut issues = Vec::new();
        for page in 1.. {
            let mut request = agent
                .get(&url)
                .set("Accept", "application/vnd.github+json")
                .set("User-Agent", USER_AGENT)
                .query("state", "all")
                .query("per_page", &PER_PAGE.to_string())
                .query("page", &page.to_string());
            if let Some(token) = &token {
                request = request.set("Authorization", &format!("Bearer {}", token));
            }

            let response = request.call().map_err(|e| match e {
                ureq::Error::Status(404, _) => BoardError::source_not_found(repo),
                other => BoardError::remote(other),
            })?;
            let batch: Vec<Value> = response.into_json().map_err(BoardError::remote)?;
            debug!(repo = %repo, page, count = batch.len(), "fetched issues page");

            let done = batch.len() < PER_PAGE;
            issues.extend(batch);
            if done {
                break;
            }
        }
        info!(repo = %repo, count = issues.len(), "issues loaded");
        Ok(issues)
    }
}

impl Adapter for GithubAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Github
    }

    fn commands(&self) -> &'static [CommandKind] {
        COMMANDS
    }

    fn execute(&self, source: &str, command: BoardCommand) -> BoardResult<Outcome> {
        match command {
            BoardCommand::LoadAll => {
                let issues = self.fetch_issues(source)?;
                Ok(Outcome::Board(board_from_issues(source, &issues)))
            }
            other => Err(unsupported(self.kind(), &other)),
        }
    }
}

/// Map issue JSON objects onto a three-column board.
pub fn board_from_issues(repo: &str, issues: &[Value]) -> Board {
    let mut board = Board::new();
    board.add_root(Node::new(ROOT_ID, repo));
    for (id, label) in [(TODO_ID, "Todo"), (ACTIVE_ID, "Active"), (DONE_ID, "Done")] {
        let _ = board.add_child(ROOT_ID, Node::new(id, label));
    }

    for issue in issues {
        if issue.get("pull_request").is_some() {
            continue;
        }
        let Some(id) = issue.get("node_id").and_then(Value::as_str) else {
            continue;
        };
        let closed = issue.get("state").and_then(Value::as_str) == Some("closed");
        let comments = issue.get("comments").and_then(Value::as_u64).unwrap_or(0);
        let column = if closed {
            DONE_ID
        } else if comments > 0 {
            ACTIVE_ID
        } else {
            TODO_ID
        };

        let title = issue.get("title").and_then(Value::as_str).unwrap_or_default();
        let tags = issue
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let body = issue
            .get("body")
            .and_then(Value::as_str)
            .filter(|b| !b.trim().is_empty())
            .map(str::to_string);

        let mut node = Node::new(id, title).with_tags(tags).with_description(body);
        node.creation_date = date_field(issue, "created_at");
        node.completion_date = date_field(issue, "closed_at");
        let _ = board.add_child(column, node);
    }
    board
}

fn date_field(issue: &Value, key: &str) -> Option<String> {
    let raw = issue.get(key)?.as_str()?;
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
    Some(
        parsed
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    )
}
