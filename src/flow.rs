//! Flow orchestration.
//!
//! A [`Flow`] interprets a wired graph: starting from its entry node it runs
//! one visit at a time, resolves the returned action against the visited
//! node's successor map, and stops when the action has no mapping. The last
//! action becomes the flow's own result, and because a flow is itself a node
//! it can be wired into a larger graph and nested arbitrarily.
//!
//! Four interpreters share this loop:
//!
//! - the sequential interpreter ([`Flow::new`], driven by [`Flow::run`]);
//! - the batch interpreter ([`Flow::batch`]), which runs the whole traversal
//!   once per parameter set produced by the flow's prep phase;
//! - the cooperative interpreters ([`Flow::run_async`]), where every phase may
//!   suspend and blocking nodes are driven inline;
//! - the parallel batch interpreter ([`Flow::parallel_batch`]), which fans the
//!   batch traversals out concurrently and joins them all before reporting a
//!   failure.
//!
//! Traversal parameters are resolved once when a run starts; the flow's own
//! parameter map is never mutated by a run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use serde_json::Value;

use crate::EngineError;
use crate::action::Action;
use crate::context::ExecutionContext;
use crate::node::{AsyncNodeBackend, Node, NodeBackend, Transition, value_kind};
use crate::params::Params;
use crate::store::SharedStore;

/// How a flow consumes its prep result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlowStrategy {
    /// One traversal per run.
    Single,
    /// Prep yields parameter sets; one sequential traversal per set.
    Batch,
    /// Batch with concurrent traversals.
    ParallelBatch,
}

/// The flow's own prep/post phases. The passthrough default returns the
/// traversal's last action unchanged, which is what lets flows compose.
enum FlowPhases {
    Passthrough,
    Blocking(Arc<dyn NodeBackend>),
    Cooperative(Arc<dyn AsyncNodeBackend>),
}

impl FlowPhases {
    fn prep_blocking(&self, store: &SharedStore, ctx: &ExecutionContext) -> Result<Value> {
        match self {
            FlowPhases::Passthrough => Ok(Value::Null),
            FlowPhases::Blocking(backend) => backend.prep(store, ctx),
            FlowPhases::Cooperative(backend) => {
                Err(EngineError::CooperativeNode(backend.name().to_string()).into())
            }
        }
    }

    fn post_blocking(
        &self,
        store: &SharedStore,
        prep_res: Value,
        exec_res: Value,
        ctx: &ExecutionContext,
        fallthrough: Option<Action>,
    ) -> Result<Option<Action>> {
        match self {
            FlowPhases::Passthrough => Ok(fallthrough),
            FlowPhases::Blocking(backend) => backend.post(store, prep_res, exec_res, ctx),
            FlowPhases::Cooperative(backend) => {
                Err(EngineError::CooperativeNode(backend.name().to_string()).into())
            }
        }
    }

    async fn prep_cooperative(&self, store: &SharedStore, ctx: &ExecutionContext) -> Result<Value> {
        match self {
            FlowPhases::Passthrough => Ok(Value::Null),
            FlowPhases::Blocking(backend) => backend.prep(store, ctx),
            FlowPhases::Cooperative(backend) => backend.prep(store, ctx).await,
        }
    }

    async fn post_cooperative(
        &self,
        store: &SharedStore,
        prep_res: Value,
        exec_res: Value,
        ctx: &ExecutionContext,
        fallthrough: Option<Action>,
    ) -> Result<Option<Action>> {
        match self {
            FlowPhases::Passthrough => Ok(fallthrough),
            FlowPhases::Blocking(backend) => backend.post(store, prep_res, exec_res, ctx),
            FlowPhases::Cooperative(backend) => backend.post(store, prep_res, exec_res, ctx).await,
        }
    }
}

/// Interpreter state behind a flow node.
pub(crate) struct FlowBackend {
    start: Node,
    strategy: FlowStrategy,
    phases: FlowPhases,
}

impl FlowBackend {
    pub(crate) fn run_blocking(
        &self,
        store: &SharedStore,
        params: &Params,
    ) -> Result<Option<Action>> {
        let ctx = ExecutionContext::new(params.clone(), 1, Duration::ZERO);
        match self.strategy {
            FlowStrategy::Single => {
                let prep_res = self.phases.prep_blocking(store, &ctx)?;
                let last_action = self.orchestrate(store, params)?;
                let exec_res = action_value(&last_action);
                self.phases
                    .post_blocking(store, prep_res, exec_res, &ctx, last_action)
            }
            FlowStrategy::Batch => {
                let prep_res = self.phases.prep_blocking(store, &ctx)?;
                for batch in param_sets(&prep_res)? {
                    let merged = params.merge(&batch);
                    self.orchestrate(store, &merged)?;
                }
                self.phases
                    .post_blocking(store, prep_res, Value::Null, &ctx, None)
            }
            FlowStrategy::ParallelBatch => Err(EngineError::CooperativeFlow.into()),
        }
    }

    pub(crate) async fn run_cooperative(
        &self,
        store: &SharedStore,
        params: &Params,
    ) -> Result<Option<Action>> {
        let ctx = ExecutionContext::new(params.clone(), 1, Duration::ZERO);
        match self.strategy {
            FlowStrategy::Single => {
                let prep_res = self.phases.prep_cooperative(store, &ctx).await?;
                let last_action = self.orchestrate_async(store, params).await?;
                let exec_res = action_value(&last_action);
                self.phases
                    .post_cooperative(store, prep_res, exec_res, &ctx, last_action)
                    .await
            }
            FlowStrategy::Batch => {
                let prep_res = self.phases.prep_cooperative(store, &ctx).await?;
                for batch in param_sets(&prep_res)? {
                    let merged = params.merge(&batch);
                    self.orchestrate_async(store, &merged).await?;
                }
                self.phases
                    .post_cooperative(store, prep_res, Value::Null, &ctx, None)
                    .await
            }
            FlowStrategy::ParallelBatch => {
                let prep_res = self.phases.prep_cooperative(store, &ctx).await?;
                let traversals: Vec<_> = param_sets(&prep_res)?
                    .into_iter()
                    .map(|batch| {
                        let merged = params.merge(&batch);
                        async move { self.orchestrate_async(store, &merged).await }
                    })
                    .collect();
                // Join every traversal before surfacing the first failure, so
                // no sibling is left running past the flow's return.
                let mut first_error = None;
                for outcome in join_all(traversals).await {
                    if let Err(error) = outcome {
                        first_error.get_or_insert(error);
                    }
                }
                if let Some(error) = first_error {
                    return Err(error);
                }
                self.phases
                    .post_cooperative(store, prep_res, Value::Null, &ctx, None)
                    .await
            }
        }
    }

    /// The graph walk: visit, resolve successor, repeat until the action is
    /// unmapped. Every visit gets the same resolved parameter map.
    fn orchestrate(&self, store: &SharedStore, params: &Params) -> Result<Option<Action>> {
        let mut current = Some(self.start.clone());
        let mut last_action = None;
        while let Some(node) = current {
            last_action = node.run_visit(store, params)?;
            current = node.successor(last_action.as_ref());
        }
        Ok(last_action)
    }

    /// Cooperative graph walk. Dispatch per node lets blocking and
    /// cooperative nodes share one graph.
    async fn orchestrate_async(
        &self,
        store: &SharedStore,
        params: &Params,
    ) -> Result<Option<Action>> {
        let mut current = Some(self.start.clone());
        let mut last_action = None;
        while let Some(node) = current {
            last_action = node.run_visit_async(store, params).await?;
            current = node.successor(last_action.as_ref());
        }
        Ok(last_action)
    }
}

/// A graph interpreter that is also a node.
#[derive(Clone)]
pub struct Flow {
    node: Node,
}

impl Flow {
    /// Sequential flow starting at `start`, with passthrough prep/post.
    pub fn new(start: &Node) -> Self {
        Self::build(start, FlowStrategy::Single, FlowPhases::Passthrough)
    }

    /// Sequential flow whose own prep/post phases come from `backend`.
    pub fn with_backend(start: &Node, backend: impl NodeBackend + 'static) -> Self {
        Self::build(
            start,
            FlowStrategy::Single,
            FlowPhases::Blocking(Arc::new(backend)),
        )
    }

    /// Sequential flow with cooperative prep/post phases.
    pub fn with_async_backend(start: &Node, backend: impl AsyncNodeBackend + 'static) -> Self {
        Self::build(
            start,
            FlowStrategy::Single,
            FlowPhases::Cooperative(Arc::new(backend)),
        )
    }

    /// Batch flow: `backend.prep` returns an array of parameter objects and
    /// the traversal runs once per object, sequentially, with the object
    /// merged over the flow's parameters.
    pub fn batch(start: &Node, backend: impl NodeBackend + 'static) -> Self {
        Self::build(
            start,
            FlowStrategy::Batch,
            FlowPhases::Blocking(Arc::new(backend)),
        )
    }

    /// Cooperative batch flow.
    pub fn batch_async(start: &Node, backend: impl AsyncNodeBackend + 'static) -> Self {
        Self::build(
            start,
            FlowStrategy::Batch,
            FlowPhases::Cooperative(Arc::new(backend)),
        )
    }

    /// Cooperative batch flow whose traversals run concurrently. Only
    /// [`Flow::run_async`] can drive it.
    pub fn parallel_batch(start: &Node, backend: impl AsyncNodeBackend + 'static) -> Self {
        Self::build(
            start,
            FlowStrategy::ParallelBatch,
            FlowPhases::Cooperative(Arc::new(backend)),
        )
    }

    fn build(start: &Node, strategy: FlowStrategy, phases: FlowPhases) -> Self {
        Flow {
            node: Node::from_flow(FlowBackend {
                start: start.clone(),
                strategy,
                phases,
            }),
        }
    }

    /// Run the flow to completion on the calling thread. Fails with a "use
    /// run_async" error if the graph reaches a cooperative node.
    pub fn run(&self, store: &SharedStore) -> Result<Option<Action>> {
        self.node.run(store)
    }

    /// Run the flow cooperatively. Works for any mix of blocking and
    /// cooperative nodes.
    pub async fn run_async(&self, store: &SharedStore) -> Result<Option<Action>> {
        self.node.run_async(store).await
    }

    pub fn set_params(&self, params: Params) {
        self.node.set_params(params);
    }

    pub fn params(&self) -> Params {
        self.node.params()
    }

    /// The flow as a node, for nesting it inside another flow.
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    /// Wire the default-labelled edge from this flow to `to`.
    pub fn next(&self, to: &Node) -> Node {
        self.node.next(to)
    }

    /// Start a labelled edge from this flow.
    pub fn on(&self, action: impl Into<Action>) -> Transition {
        self.node.on(action)
    }
}

fn action_value(action: &Option<Action>) -> Value {
    match action {
        Some(action) => Value::String(action.as_str().to_string()),
        None => Value::Null,
    }
}

/// Parse a batch-flow prep result into parameter sets. Null means no batches;
/// every element must be a JSON object.
fn param_sets(prep_res: &Value) -> Result<Vec<Params>> {
    match prep_res {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            let mut sets = Vec::with_capacity(items.len());
            for item in items {
                match Params::from_object(item) {
                    Some(params) => sets.push(params),
                    None => return Err(EngineError::BatchParams(value_kind(item)).into()),
                }
            }
            Ok(sets)
        }
        other => Err(EngineError::BatchParams(value_kind(other)).into()),
    }
}
