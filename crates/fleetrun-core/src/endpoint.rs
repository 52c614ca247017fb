//! Endpoint and per-command outcome types.

use crate::error::ErrorKind;
use crate::ids::EndpointId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One remote target plus the ordered commands to run against it.
///
/// Immutable once constructed. `connect_params` is opaque to the core;
/// the session capability interprets it (credentials, port, device
/// type, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Unique target identity within a batch.
    pub id: EndpointId,

    /// Opaque connection parameters for the session capability.
    pub connect_params: HashMap<String, String>,

    /// Commands executed strictly in order, each waiting for the
    /// previous to complete.
    pub commands: Vec<String>,
}

impl Endpoint {
    /// Create a new Endpoint.
    pub fn new(id: impl Into<EndpointId>, commands: Vec<String>) -> Self {
        Self {
            id: id.into(),
            connect_params: HashMap::new(),
            commands,
        }
    }

    /// Builder method to add a connection parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_params.insert(key.into(), value.into());
        self
    }

    /// Look up a connection parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.connect_params.get(key).map(String::as_str)
    }
}

/// Outcome of one executed command within an attempt.
///
/// A single command failure marks the whole attempt as failed and the
/// remaining commands in that attempt are not run, so at most the last
/// entry of an attempt's sequence carries an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// The command string as given.
    pub command: String,

    /// Captured output (empty when the command failed).
    pub output: String,

    /// Error, if this command ended the attempt.
    pub error: Option<ErrorKind>,
}

impl CommandOutcome {
    /// A successfully executed command with its output.
    pub fn ok(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            error: None,
        }
    }

    /// A command that ended its attempt with an error.
    pub fn failed(command: impl Into<String>, error: ErrorKind) -> Self {
        Self {
            command: command.into(),
            output: String::new(),
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_builder() {
        let endpoint = Endpoint::new("sw-access-17", vec!["show version".to_string()])
            .with_param("username", "admin")
            .with_param("port", "22");

        assert_eq!(endpoint.id.as_str(), "sw-access-17");
        assert_eq!(endpoint.param("username"), Some("admin"));
        assert_eq!(endpoint.param("missing"), None);
        assert_eq!(endpoint.commands.len(), 1);
    }
}
