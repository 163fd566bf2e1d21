/// Request metadata attached to every remote cache call of one spawn
///
/// The metadata is passed explicitly to the remote client and also carried by
/// a tracing span. Entering the span returns a guard, so the context is
/// detached on every exit path, including early returns and errors.
use serde::Serialize;
use tracing::{info_span, Span};

use crate::digest::ActionKey;

pub const TOOL_NAME: &str = "spawn-cache";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    pub tool_name: String,
    pub tool_version: String,
    pub build_request_id: String,
    pub command_id: String,
    pub action_id: String,
}

impl RequestMetadata {
    pub fn new(build_request_id: &str, command_id: &str, action_key: &ActionKey) -> Self {
        Self {
            tool_name: TOOL_NAME.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            build_request_id: build_request_id.to_string(),
            command_id: command_id.to_string(),
            action_id: action_key.hash().to_string(),
        }
    }

    /// Span tagging everything logged while talking to the remote cache
    pub fn span(&self) -> Span {
        info_span!(
            "remote_cache",
            build_request_id = %self.build_request_id,
            command_id = %self.command_id,
            action_id = %self.action_id,
        )
    }
}
