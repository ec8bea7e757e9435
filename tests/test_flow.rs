use anyhow::Result;
use nodeflow::{Action, ExecutionContext, Flow, Node, NodeBackend, Params, SharedStore};
use serde_json::Value;

fn push_log(store: &SharedStore, entry: &str) {
    let mut log: Vec<String> = store.get("log").unwrap_or_default();
    log.push(entry.to_string());
    store.insert("log", log);
}

// ------------------------------------
// 1. Linear flow: A -> B -> C
// ------------------------------------

struct Step {
    name: &'static str,
    action: Option<&'static str>,
}

impl NodeBackend for Step {
    fn post(
        &self,
        store: &SharedStore,
        _prep_res: Value,
        _exec_res: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Option<Action>> {
        push_log(store, self.name);
        Ok(self.action.map(Action::from))
    }
}

#[test]
fn linear_flow_visits_nodes_in_order() {
    let a = Node::new(Step {
        name: "A",
        action: Some("default"),
    });
    let b = Node::new(Step {
        name: "B",
        action: Some("default"),
    });
    let c = Node::new(Step {
        name: "C",
        action: Some("default"),
    });
    a.next(&b).next(&c);

    let store = SharedStore::new();
    let flow = Flow::new(&a);
    let action = flow.run(&store).unwrap();

    assert_eq!(action, Some(Action::from("default")));
    assert_eq!(
        store.get::<Vec<String>>("log").unwrap(),
        vec!["A", "B", "C"]
    );
}

#[test]
fn reruns_are_deterministic() {
    let a = Node::new(Step {
        name: "A",
        action: Some("default"),
    });
    let b = Node::new(Step {
        name: "B",
        action: None,
    });
    a.next(&b);

    let store = SharedStore::new();
    let flow = Flow::new(&a);
    flow.run(&store).unwrap();
    flow.run(&store).unwrap();

    assert_eq!(
        store.get::<Vec<String>>("log").unwrap(),
        vec!["A", "B", "A", "B"]
    );
}

// ------------------------------------
// 2. Branching on the returned action
// ------------------------------------

struct Branch;

impl NodeBackend for Branch {
    fn post(
        &self,
        store: &SharedStore,
        _prep_res: Value,
        _exec_res: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Option<Action>> {
        push_log(store, "A");
        let x = store.get::<i64>("x").unwrap_or(0);
        Ok(Some(Action::from(if x == 1 { "left" } else { "right" })))
    }
}

#[test]
fn branch_follows_the_returned_action() {
    let a = Node::new(Branch);
    let b = Node::new(Step {
        name: "B",
        action: None,
    });
    let c = Node::new(Step {
        name: "C",
        action: None,
    });
    a.on("left").to(&b);
    a.on("right").to(&c);

    let flow = Flow::new(&a);

    let store = SharedStore::new();
    store.insert("x", 1i64);
    flow.run(&store).unwrap();
    assert_eq!(store.get::<Vec<String>>("log").unwrap(), vec!["A", "B"]);

    let store = SharedStore::new();
    store.insert("x", 2i64);
    flow.run(&store).unwrap();
    assert_eq!(store.get::<Vec<String>>("log").unwrap(), vec!["A", "C"]);
}

#[test]
fn missing_action_maps_to_the_default_successor() {
    // Step "A" returns no action at all; the default edge still fires.
    let a = Node::new(Step {
        name: "A",
        action: None,
    });
    let b = Node::new(Step {
        name: "B",
        action: None,
    });
    a.next(&b);

    let store = SharedStore::new();
    Flow::new(&a).run(&store).unwrap();
    assert_eq!(store.get::<Vec<String>>("log").unwrap(), vec!["A", "B"]);
}

#[test]
fn unmapped_action_ends_the_flow_with_that_action() {
    let a = Node::new(Step {
        name: "A",
        action: Some("nowhere"),
    });
    let b = Node::new(Step {
        name: "B",
        action: None,
    });
    a.next(&b);

    let store = SharedStore::new();
    let action = Flow::new(&a).run(&store).unwrap();

    assert_eq!(action, Some(Action::from("nowhere")));
    assert_eq!(store.get::<Vec<String>>("log").unwrap(), vec!["A"]);
}

// ------------------------------------
// 3. Parameters
// ------------------------------------

struct ReadParam;

impl NodeBackend for ReadParam {
    fn post(
        &self,
        store: &SharedStore,
        _prep_res: Value,
        _exec_res: Value,
        ctx: &ExecutionContext,
    ) -> Result<Option<Action>> {
        store.insert("seen", ctx.params().get::<i64>("i").unwrap_or(-1));
        Ok(None)
    }
}

#[test]
fn flow_params_reach_visits_without_touching_the_node() {
    let node = Node::new(ReadParam);
    let flow = Flow::new(&node);
    flow.set_params(Params::builder().insert_unwrap("i", 7).build());

    let store = SharedStore::new();
    flow.run(&store).unwrap();

    assert_eq!(store.get::<i64>("seen"), Some(7));
    // The node's own parameter map is untouched by the run.
    assert!(node.params().is_empty());
}

// ------------------------------------
// 4. Flows compose as nodes
// ------------------------------------

#[test]
fn nested_flow_runs_before_its_successor() {
    let a = Node::new(Step {
        name: "A",
        action: Some("default"),
    });
    let b = Node::new(Step {
        name: "B",
        action: Some("default"),
    });
    let c = Node::new(Step {
        name: "C",
        action: None,
    });
    a.next(&b);

    let inner = Flow::new(&a);
    inner.next(&c);
    let outer = Flow::new(inner.node());

    let store = SharedStore::new();
    let action = outer.run(&store).unwrap();

    assert_eq!(action, None);
    assert_eq!(
        store.get::<Vec<String>>("log").unwrap(),
        vec!["A", "B", "C"]
    );
}

struct Summarize;

impl NodeBackend for Summarize {
    fn post(
        &self,
        store: &SharedStore,
        _prep_res: Value,
        exec_res: Value,
        _ctx: &ExecutionContext,
    ) -> Result<Option<Action>> {
        // The traversal's last action arrives as the exec result.
        store.insert("last_action", exec_res.as_str().unwrap_or("").to_string());
        Ok(Some(Action::from("wrapped")))
    }
}

#[test]
fn flow_post_can_rewrite_the_final_action() {
    let a = Node::new(Step {
        name: "A",
        action: Some("finished"),
    });
    let flow = Flow::with_backend(&a, Summarize);

    let store = SharedStore::new();
    let action = flow.run(&store).unwrap();

    assert_eq!(action, Some(Action::from("wrapped")));
    assert_eq!(
        store.get::<String>("last_action").as_deref(),
        Some("finished")
    );
}
