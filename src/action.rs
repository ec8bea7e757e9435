//! Action labels.
//!
//! An [`Action`] is the string a node's post phase returns to pick the next
//! edge. The reserved label [`DEFAULT_ACTION`] is what an absent or empty
//! action resolves to during successor lookup.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The implicit edge label used when a node does not name one.
pub const DEFAULT_ACTION: &str = "default";

/// A named transition between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action(String);

impl Action {
    /// Create an action from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Action(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether this is the reserved default label.
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_ACTION
    }
}

impl Default for Action {
    fn default() -> Self {
        Action(DEFAULT_ACTION.to_string())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Action(s.to_string())
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Action(s)
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.0
    }
}

impl PartialEq<&str> for Action {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
