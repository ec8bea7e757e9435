//! Closure-backed nodes for quick prototyping.

use anyhow::Result;
use serde_json::Value;

use crate::action::Action;
use crate::context::ExecutionContext;
use crate::node::NodeBackend;
use crate::store::SharedStore;

type PrepFn = Box<dyn Fn(&SharedStore, &ExecutionContext) -> Result<Value> + Send + Sync>;
type ExecFn = Box<dyn Fn(Value, &ExecutionContext) -> Result<Value> + Send + Sync>;
type PostFn =
    Box<dyn Fn(&SharedStore, Value, Value, &ExecutionContext) -> Result<Option<Action>> + Send + Sync>;

/// A [`NodeBackend`] assembled from three closures, one per phase.
///
/// Retry and batch configuration stay on the node builder, so a function node
/// composes with them like any other backend:
///
/// ```
/// use nodeflow::{Action, FunctionNode, Node, SharedStore};
/// use serde_json::json;
///
/// let double = Node::new(FunctionNode::new(
///     "double",
///     |store, _ctx| Ok(json!(store.get::<i64>("input").unwrap_or(0))),
///     |prep, _ctx| Ok(json!(prep.as_i64().unwrap_or(0) * 2)),
///     |store, _prep, exec, _ctx| {
///         store.insert("output", exec.as_i64().unwrap_or(0));
///         Ok(Some(Action::from("default")))
///     },
/// ));
///
/// let store = SharedStore::new();
/// store.insert("input", 21i64);
/// double.run(&store)?;
/// assert_eq!(store.get::<i64>("output"), Some(42));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct FunctionNode {
    name: String,
    prep_fn: PrepFn,
    exec_fn: ExecFn,
    post_fn: PostFn,
}

impl FunctionNode {
    pub fn new<P, E, Po>(name: impl Into<String>, prep: P, exec: E, post: Po) -> Self
    where
        P: Fn(&SharedStore, &ExecutionContext) -> Result<Value> + Send + Sync + 'static,
        E: Fn(Value, &ExecutionContext) -> Result<Value> + Send + Sync + 'static,
        Po: Fn(&SharedStore, Value, Value, &ExecutionContext) -> Result<Option<Action>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            prep_fn: Box::new(prep),
            exec_fn: Box::new(exec),
            post_fn: Box::new(post),
        }
    }
}

impl NodeBackend for FunctionNode {
    fn prep(&self, store: &SharedStore, ctx: &ExecutionContext) -> Result<Value> {
        (self.prep_fn)(store, ctx)
    }

    fn exec(&self, prep_res: Value, ctx: &ExecutionContext) -> Result<Value> {
        (self.exec_fn)(prep_res, ctx)
    }

    fn post(
        &self,
        store: &SharedStore,
        prep_res: Value,
        exec_res: Value,
        ctx: &ExecutionContext,
    ) -> Result<Option<Action>> {
        (self.post_fn)(store, prep_res, exec_res, ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
