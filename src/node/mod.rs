//! The node system.
//!
//! Nodes are the computation units of a flow. Every node runs through the same
//! three-phase lifecycle on each visit:
//!
//! 1. **prep** reads from the shared store and produces an input value;
//! 2. **exec** does the main work, without touching the store, so that retries
//!    stay semantically safe;
//! 3. **post** writes results back and returns the [`Action`] that selects the
//!    next edge.
//!
//! User behavior is supplied through [`NodeBackend`] (blocking phases) or
//! [`AsyncNodeBackend`] (cooperative phases, each of which may suspend). The
//! [`Node`] handle wraps a backend together with its retry budget, execution
//! strategy and successor map. Handles are cheap to clone and share one
//! immutable interior; per-visit mutable state lives in the
//! [`ExecutionContext`] the interpreter creates for each visit.
//!
//! Wiring uses [`Node::next`] for the default edge and the two-step
//! [`Node::on`]/[`Transition::to`] builder for labelled edges. Both return the
//! target node so chains read in graph order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_recursion::async_recursion;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::EngineError;
use crate::action::{Action, DEFAULT_ACTION};
use crate::context::ExecutionContext;
use crate::flow::FlowBackend;
use crate::params::Params;
use crate::store::SharedStore;

mod function;

pub use function::FunctionNode;


/// Blocking node behavior. All phases have defaults, so an implementation
/// overrides only what it needs.
pub trait NodeBackend: Send + Sync {
    /// Read and validate input from the shared store.
    fn prep(&self, _store: &SharedStore, _ctx: &ExecutionContext) -> Result<Value> {
        Ok(Value::Null)
    }

    /// Perform the main computation. Must not touch the shared store; this is
    /// the only phase the retry engine re-runs.
    fn exec(&self, _prep_res: Value, _ctx: &ExecutionContext) -> Result<Value> {
        Ok(Value::Null)
    }

    /// Write results back and pick the next edge. `None` selects the
    /// `"default"` successor.
    fn post(
        &self,
        _store: &SharedStore,
        _prep_res: Value,
        _exec_res: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Option<Action>> {
        Ok(None)
    }

    /// Invoked once when every attempt of `exec` has failed. The returned
    /// value becomes the exec result; re-raising the error aborts the
    /// traversal.
    fn exec_fallback(
        &self,
        _prep_res: Value,
        error: anyhow::Error,
        _ctx: &ExecutionContext,
    ) -> Result<Value> {
        Err(error)
    }

    /// Identifier used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Cooperative node behavior: the same lifecycle as [`NodeBackend`], but every
/// phase may suspend.
#[async_trait]
pub trait AsyncNodeBackend: Send + Sync {
    async fn prep(&self, _store: &SharedStore, _ctx: &ExecutionContext) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn exec(&self, _prep_res: Value, _ctx: &ExecutionContext) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn post(
        &self,
        _store: &SharedStore,
        _prep_res: Value,
        _exec_res: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Option<Action>> {
        Ok(None)
    }

    async fn exec_fallback(
        &self,
        _prep_res: Value,
        error: anyhow::Error,
        _ctx: &ExecutionContext,
    ) -> Result<Value> {
        Err(error)
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

pub(crate) enum Backend {
    Blocking(Arc<dyn NodeBackend>),
    Cooperative(Arc<dyn AsyncNodeBackend>),
    Flow(FlowBackend),
}

/// How the exec phase consumes the prep result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExecStrategy {
    /// One exec call per visit.
    Scalar,
    /// Prep yields an array; exec runs once per element, in order.
    Batch,
    /// Batch with concurrent element execution (cooperative backends only).
    ParallelBatch,
}

struct NodeInner {
    backend: Backend,
    strategy: ExecStrategy,
    max_attempts: usize,
    retry_delay: Duration,
    params: RwLock<Params>,
    successors: RwLock<HashMap<String, Node>>,
}

/// Handle to a wired node. Cloning is cheap and shares the same interior, so
/// the same node can appear at several places in a graph, including as its own
/// successor.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Configures a [`Node`] before it is wired.
pub struct NodeBuilder {
    backend: Backend,
    strategy: ExecStrategy,
    max_attempts: usize,
    retry_delay: Duration,
}

impl NodeBuilder {
    fn new(backend: Backend) -> Self {
        Self {
            backend,
            strategy: ExecStrategy::Scalar,
            max_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }

    /// Total number of exec attempts per visit (per item for batch nodes).
    /// Values below 1 are clamped to 1.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Fixed delay between consecutive attempts.
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Lift exec over a sequence: prep must return an array and exec runs once
    /// per element.
    pub fn batch(mut self) -> Self {
        self.strategy = ExecStrategy::Batch;
        self
    }

    /// Like [`NodeBuilder::batch`], but elements of a cooperative backend run
    /// concurrently. Blocking backends fall back to sequential execution.
    pub fn parallel_batch(mut self) -> Self {
        self.strategy = ExecStrategy::ParallelBatch;
        self
    }

    pub fn build(self) -> Node {
        Node {
            inner: Arc::new(NodeInner {
                backend: self.backend,
                strategy: self.strategy,
                max_attempts: self.max_attempts,
                retry_delay: self.retry_delay,
                params: RwLock::new(Params::new()),
                successors: RwLock::new(HashMap::new()),
            }),
        }
    }
}

/// A pending labelled edge, produced by [`Node::on`] and completed by
/// [`Transition::to`].
pub struct Transition {
    from: Node,
    action: Action,
}

impl Transition {
    /// Complete the edge. Returns the target node for chaining.
    pub fn to(self, target: &Node) -> Node {
        self.from.connect(self.action, target)
    }
}

impl Node {
    /// Wrap a blocking backend with default configuration: a single attempt,
    /// no delay, scalar execution.
    pub fn new(backend: impl NodeBackend + 'static) -> Node {
        Self::builder(backend).build()
    }

    /// Wrap a cooperative backend with default configuration.
    pub fn new_async(backend: impl AsyncNodeBackend + 'static) -> Node {
        Self::builder_async(backend).build()
    }

    pub fn builder(backend: impl NodeBackend + 'static) -> NodeBuilder {
        NodeBuilder::new(Backend::Blocking(Arc::new(backend)))
    }

    pub fn builder_async(backend: impl AsyncNodeBackend + 'static) -> NodeBuilder {
        NodeBuilder::new(Backend::Cooperative(Arc::new(backend)))
    }

    pub(crate) fn from_flow(flow: FlowBackend) -> Node {
        Node {
            inner: Arc::new(NodeInner {
                backend: Backend::Flow(flow),
                strategy: ExecStrategy::Scalar,
                max_attempts: 1,
                retry_delay: Duration::ZERO,
                params: RwLock::new(Params::new()),
                successors: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Add the default-labelled edge to `to`. Returns `to` for chaining, so
    /// `a.next(&b).next(&c)` wires a linear pipeline.
    pub fn next(&self, to: &Node) -> Node {
        self.connect(Action::from(DEFAULT_ACTION), to)
    }

    /// Start a labelled edge: `a.on("left").to(&b)`.
    pub fn on(&self, action: impl Into<Action>) -> Transition {
        Transition {
            from: self.clone(),
            action: action.into(),
        }
    }

    fn connect(&self, action: Action, to: &Node) -> Node {
        // Empty labels collapse onto the default edge.
        let label = if action.as_str().is_empty() {
            DEFAULT_ACTION.to_string()
        } else {
            action.into_string()
        };
        let mut successors = self.inner.successors.write();
        if successors.contains_key(&label) {
            warn!(action = %label, "overwriting successor for action");
        }
        successors.insert(label, to.clone());
        to.clone()
    }

    /// Parameters used when the node runs standalone; flows override them per
    /// visit.
    pub fn set_params(&self, params: Params) {
        *self.inner.params.write() = params;
    }

    pub fn params(&self) -> Params {
        self.inner.params.read().clone()
    }

    pub fn has_successors(&self) -> bool {
        !self.inner.successors.read().is_empty()
    }

    /// Resolve the successor for an action. Absent and empty actions resolve
    /// through the default label. Warns when the action is unmapped but the
    /// node does define successors; terminal nodes stay silent.
    pub(crate) fn successor(&self, action: Option<&Action>) -> Option<Node> {
        let successors = self.inner.successors.read();
        let label = action
            .map(|a| a.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ACTION);
        let next = successors.get(label).cloned();
        if next.is_none() && !successors.is_empty() {
            let known: Vec<&str> = successors.keys().map(String::as_str).collect();
            warn!(action = %label, ?known, "flow ends: action has no successor");
        }
        next
    }

    fn backend_name(&self) -> &str {
        match &self.inner.backend {
            Backend::Blocking(backend) => backend.name(),
            Backend::Cooperative(backend) => backend.name(),
            Backend::Flow(_) => "flow",
        }
    }

    /// Run one visit of this node outside any flow. Successors are not
    /// followed; wiring a node and then running it standalone warns.
    pub fn run(&self, store: &SharedStore) -> Result<Option<Action>> {
        if self.has_successors() {
            warn!(
                node = self.backend_name(),
                "node has successors that a standalone run will not follow; use a flow"
            );
        }
        let params = self.inner.params.read().clone();
        self.run_visit(store, &params)
    }

    /// Cooperative counterpart of [`Node::run`]. Drives blocking backends
    /// inline, so it works on any node.
    pub async fn run_async(&self, store: &SharedStore) -> Result<Option<Action>> {
        if self.has_successors() {
            warn!(
                node = self.backend_name(),
                "node has successors that a standalone run will not follow; use a flow"
            );
        }
        let params = self.inner.params.read().clone();
        self.run_visit_async(store, &params).await
    }

    /// One visit through the blocking lifecycle: prep, exec under the retry
    /// budget, post. Cooperative backends refuse the blocking path.
    pub(crate) fn run_visit(&self, store: &SharedStore, params: &Params) -> Result<Option<Action>> {
        match &self.inner.backend {
            Backend::Blocking(backend) => {
                let mut ctx = ExecutionContext::new(
                    params.clone(),
                    self.inner.max_attempts,
                    self.inner.retry_delay,
                );
                let prep_res = backend.prep(store, &ctx)?;
                let exec_res = self.exec_blocking(backend.as_ref(), prep_res.clone(), &mut ctx)?;
                backend.post(store, prep_res, exec_res, &ctx)
            }
            Backend::Cooperative(backend) => {
                Err(EngineError::CooperativeNode(backend.name().to_string()).into())
            }
            Backend::Flow(flow) => flow.run_blocking(store, params),
        }
    }

    /// One visit through the cooperative lifecycle. Blocking backends are
    /// driven inline, which is what lets one flow mix both kinds.
    #[async_recursion]
    pub(crate) async fn run_visit_async(
        &self,
        store: &SharedStore,
        params: &Params,
    ) -> Result<Option<Action>> {
        match &self.inner.backend {
            Backend::Blocking(_) => self.run_visit(store, params),
            Backend::Cooperative(backend) => {
                let mut ctx = ExecutionContext::new(
                    params.clone(),
                    self.inner.max_attempts,
                    self.inner.retry_delay,
                );
                let prep_res = backend.prep(store, &ctx).await?;
                let exec_res = self
                    .exec_cooperative(backend.as_ref(), prep_res.clone(), &mut ctx)
                    .await?;
                backend.post(store, prep_res, exec_res, &ctx).await
            }
            Backend::Flow(flow) => flow.run_cooperative(store, params).await,
        }
    }

    fn exec_blocking(
        &self,
        backend: &dyn NodeBackend,
        prep_res: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value> {
        match self.inner.strategy {
            ExecStrategy::Scalar => exec_with_retry(backend, prep_res, ctx),
            // Without a scheduler to fan out to, a parallel batch runs
            // sequentially.
            ExecStrategy::Batch | ExecStrategy::ParallelBatch => {
                let items = batch_items(prep_res)?;
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    ctx.reset_attempts();
                    results.push(exec_with_retry(backend, item, ctx)?);
                }
                Ok(Value::Array(results))
            }
        }
    }

    async fn exec_cooperative(
        &self,
        backend: &dyn AsyncNodeBackend,
        prep_res: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value> {
        match self.inner.strategy {
            ExecStrategy::Scalar => exec_with_retry_async(backend, prep_res, ctx).await,
            ExecStrategy::Batch => {
                let items = batch_items(prep_res)?;
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    ctx.reset_attempts();
                    results.push(exec_with_retry_async(backend, item, ctx).await?);
                }
                Ok(Value::Array(results))
            }
            ExecStrategy::ParallelBatch => {
                let items = batch_items(prep_res)?;
                let tasks: Vec<_> = items
                    .into_iter()
                    .map(|item| {
                        let mut item_ctx = ctx.fork();
                        async move { exec_with_retry_async(backend, item, &mut item_ctx).await }
                    })
                    .collect();
                let outcomes = join_all(tasks).await;
                let mut results = Vec::with_capacity(outcomes.len());
                for outcome in outcomes {
                    results.push(outcome?);
                }
                Ok(Value::Array(results))
            }
        }
    }
}

/// The retry state machine around a blocking exec: up to `max_attempts`
/// attempts with a fixed delay in between, then the fallback exactly once.
fn exec_with_retry(
    backend: &dyn NodeBackend,
    prep_res: Value,
    ctx: &mut ExecutionContext,
) -> Result<Value> {
    loop {
        match backend.exec(prep_res.clone(), ctx) {
            Ok(exec_res) => return Ok(exec_res),
            Err(error) => {
                if ctx.is_last_attempt() {
                    return backend.exec_fallback(prep_res, error, ctx);
                }
                if !ctx.retry_delay().is_zero() {
                    std::thread::sleep(ctx.retry_delay());
                }
                ctx.advance_attempt();
            }
        }
    }
}

/// Cooperative twin of [`exec_with_retry`]; the inter-attempt delay yields to
/// the scheduler and the fallback may suspend.
async fn exec_with_retry_async(
    backend: &dyn AsyncNodeBackend,
    prep_res: Value,
    ctx: &mut ExecutionContext,
) -> Result<Value> {
    loop {
        match backend.exec(prep_res.clone(), ctx).await {
            Ok(exec_res) => return Ok(exec_res),
            Err(error) => {
                if ctx.is_last_attempt() {
                    return backend.exec_fallback(prep_res, error, ctx).await;
                }
                if !ctx.retry_delay().is_zero() {
                    tokio::time::sleep(ctx.retry_delay()).await;
                }
                ctx.advance_attempt();
            }
        }
    }
}

/// Split a batch prep result into its items. Null means an empty batch;
/// anything other than an array is a wiring mistake worth failing on.
pub(crate) fn batch_items(prep_res: Value) -> Result<Vec<Value>> {
    match prep_res {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        other => Err(EngineError::BatchItems(value_kind(&other)).into()),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
