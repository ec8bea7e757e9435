//! # Nodeflow
//!
//! A minimalist node-and-flow orchestration engine.
//!
//! Nodeflow models a pipeline as a **graph plus a shared store**:
//!
//! - a **node** is a computation unit with a three-phase lifecycle
//!   (prep, exec, post) and a retry budget around exec;
//! - **actions** are the labelled edges between nodes, picked by each node's
//!   post phase;
//! - the **shared store** is a schemaless container every visit can read and
//!   write, including async queue endpoints for coordinating concurrent
//!   traversals;
//! - a **flow** interprets the graph from an entry node, and is itself a node,
//!   so flows nest.
//!
//! Flows come in sequential, batch, cooperative and parallel-batch variants;
//! cooperative flows can mix blocking and suspending nodes in one graph.
//!
//! ## Example
//!
//! ```
//! use nodeflow::{Action, Flow, FunctionNode, Node, SharedStore};
//! use serde_json::json;
//!
//! let greet = Node::new(FunctionNode::new(
//!     "greet",
//!     |_store, _ctx| Ok(json!("hello")),
//!     |prep, _ctx| Ok(json!(format!("{}, world", prep.as_str().unwrap_or("")))),
//!     |store, _prep, exec, _ctx| {
//!         store.insert("greeting", exec.as_str().unwrap_or("").to_string());
//!         Ok(Some(Action::from("default")))
//!     },
//! ));
//! let shout = Node::new(FunctionNode::new(
//!     "shout",
//!     |store, _ctx| Ok(json!(store.get::<String>("greeting").unwrap_or_default())),
//!     |prep, _ctx| Ok(json!(prep.as_str().unwrap_or("").to_uppercase())),
//!     |store, _prep, exec, _ctx| {
//!         store.insert("shout", exec.as_str().unwrap_or("").to_string());
//!         Ok(None)
//!     },
//! ));
//!
//! greet.next(&shout);
//!
//! let store = SharedStore::new();
//! Flow::new(&greet).run(&store)?;
//! assert_eq!(store.get::<String>("shout").as_deref(), Some("HELLO, WORLD"));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod action;
pub mod context;
pub mod flow;
pub mod node;
pub mod params;
pub mod store;

pub use action::{Action, DEFAULT_ACTION};
pub use context::ExecutionContext;
pub use flow::Flow;
pub use node::{AsyncNodeBackend, FunctionNode, Node, NodeBackend, NodeBuilder, Transition};
pub use params::{Params, ParamsBuilder};
pub use store::{InMemoryBackend, SharedStore, StoreBackend, StoredValue};

/// Result type used by all phase operations and interpreters.
pub use anyhow::Result;

/// Failure modes raised by the engine itself. User phase errors flow through
/// [`anyhow::Error`] untouched.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The blocking run path reached a node with cooperative phases.
    #[error("node '{0}' has cooperative phases; drive it with run_async")]
    CooperativeNode(String),

    /// The blocking run path was used on a parallel batch flow.
    #[error("parallel batch flows are cooperative; drive them with run_async")]
    CooperativeFlow,

    /// A batch node's prep phase returned something other than an array.
    #[error("batch prep must return an array of items, got {0}")]
    BatchItems(&'static str),

    /// A batch flow's prep phase returned something other than an array of
    /// parameter objects.
    #[error("batch flow prep must return an array of parameter objects, got {0}")]
    BatchParams(&'static str),
}
