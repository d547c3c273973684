use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use jobflow::{Flow, JobFlowError, Node, Outcome, Prepared, RetryPolicy, SharedContext};

/// 记录执行顺序并返回固定标签的节点
struct Recorder {
    name: String,
    outcome: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn new(name: &str, outcome: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            outcome: outcome.to_string(),
            log,
        })
    }
}

#[async_trait]
impl Node for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exec(&self, _prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        self.log.lock().push(self.name.clone());
        Ok(Value::Null)
    }

    async fn post(
        &self,
        _ctx: &SharedContext,
        _prep: Prepared,
        _result: Value,
    ) -> jobflow::Result<Outcome> {
        Ok(Outcome::new(self.outcome.clone()))
    }
}

#[tokio::test]
async fn labeled_transition_routes_to_wired_successor() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = Flow::builder("routing");
    builder
        .node("a", Recorder::new("a", "x", Arc::clone(&log)))
        .node("b", Recorder::new("b", "done", Arc::clone(&log)))
        .node("c", Recorder::new("c", "done", Arc::clone(&log)))
        .start("a")
        .on("a", "x", "b")
        .on("a", "y", "c");
    let flow = builder.build()?;

    flow.execute(SharedContext::new()).await?;
    assert_eq!(*log.lock(), vec!["a".to_string(), "b".to_string()]);
    Ok(())
}

#[tokio::test]
async fn unmatched_label_without_default_terminates_flow() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = Flow::builder("terminates");
    builder
        .node("a", Recorder::new("a", "unexpected", Arc::clone(&log)))
        .node("b", Recorder::new("b", "done", Arc::clone(&log)))
        .start("a")
        .on("a", "x", "b");
    let flow = builder.build()?;

    flow.execute(SharedContext::new()).await?;
    assert_eq!(*log.lock(), vec!["a".to_string()]);
    Ok(())
}

#[tokio::test]
async fn default_transition_catches_unlisted_labels() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = Flow::builder("default_route");
    builder
        .node("a", Recorder::new("a", "whatever", Arc::clone(&log)))
        .node("b", Recorder::new("b", "done", Arc::clone(&log)))
        .start("a")
        .connect("a", "b");
    let flow = builder.build()?;

    flow.execute(SharedContext::new()).await?;
    assert_eq!(*log.lock(), vec!["a".to_string(), "b".to_string()]);
    Ok(())
}

#[tokio::test]
async fn rewiring_a_label_overwrites_the_previous_successor() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = Flow::builder("overwrite");
    builder
        .node("a", Recorder::new("a", "x", Arc::clone(&log)))
        .node("b", Recorder::new("b", "done", Arc::clone(&log)))
        .node("c", Recorder::new("c", "done", Arc::clone(&log)))
        .start("a")
        .on("a", "x", "b")
        .on("a", "x", "c");
    let flow = builder.build()?;

    flow.execute(SharedContext::new()).await?;
    // 后写覆盖先写
    assert_eq!(*log.lock(), vec!["a".to_string(), "c".to_string()]);
    Ok(())
}

#[tokio::test]
async fn dangling_transition_target_is_a_build_error() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = Flow::builder("dangling");
    builder
        .node("a", Recorder::new("a", "x", Arc::clone(&log)))
        .start("a")
        .on("a", "x", "ghost");
    let err = builder.build().unwrap_err();
    assert!(matches!(err, JobFlowError::InvalidWiring { .. }));
}

#[tokio::test]
async fn unknown_start_is_a_build_error() {
    let mut builder = Flow::builder("no_such_start");
    builder.start("ghost");
    let err = builder.build().unwrap_err();
    assert!(matches!(err, JobFlowError::InvalidWiring { .. }));
}

#[tokio::test]
async fn flow_without_start_is_a_noop() -> anyhow::Result<()> {
    let flow = Flow::builder("empty").build()?;
    let ctx = SharedContext::new();
    ctx.insert("untouched", json!(true));

    let ctx = flow.execute(ctx).await?;
    assert_eq!(ctx.len(), 1);
    assert_eq!(ctx.get("untouched"), Some(json!(true)));
    Ok(())
}

// ---- 线性场景 A: fetch -> transform -> save ----

struct FetchNode;

#[async_trait]
impl Node for FetchNode {
    fn name(&self) -> &str {
        "fetch"
    }

    async fn exec(&self, _prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        Ok(json!("X"))
    }

    async fn post(
        &self,
        ctx: &SharedContext,
        _prep: Prepared,
        result: Value,
    ) -> jobflow::Result<Outcome> {
        ctx.insert("raw", result);
        Ok(Outcome::default())
    }
}

struct TransformNode;

#[async_trait]
impl Node for TransformNode {
    fn name(&self) -> &str {
        "transform"
    }

    async fn prep(&self, ctx: &SharedContext) -> jobflow::Result<Prepared> {
        Ok(Prepared::Value(ctx.require(self.name(), "raw")?))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        let raw = prep.value().and_then(Value::as_str).unwrap_or_default();
        Ok(json!(raw.to_lowercase()))
    }

    async fn post(
        &self,
        ctx: &SharedContext,
        _prep: Prepared,
        result: Value,
    ) -> jobflow::Result<Outcome> {
        ctx.insert("clean", result);
        Ok(Outcome::default())
    }
}

struct SaveNode;

#[async_trait]
impl Node for SaveNode {
    fn name(&self) -> &str {
        "save"
    }

    async fn prep(&self, ctx: &SharedContext) -> jobflow::Result<Prepared> {
        Ok(Prepared::Value(ctx.require(self.name(), "clean")?))
    }

    async fn exec(&self, _prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        Ok(Value::Null)
    }
}

fn linear_flow() -> jobflow::Result<Flow> {
    let mut builder = Flow::builder("linear");
    builder
        .node("fetch", Arc::new(FetchNode))
        .node("transform", Arc::new(TransformNode))
        .node("save", Arc::new(SaveNode))
        .start("fetch")
        .connect("fetch", "transform")
        .connect("transform", "save");
    builder.build()
}

#[tokio::test]
async fn linear_flow_threads_data_through_context() -> anyhow::Result<()> {
    let ctx = linear_flow()?.execute(SharedContext::new()).await?;
    assert_eq!(ctx.get("raw"), Some(json!("X")));
    assert_eq!(ctx.get("clean"), Some(json!("x")));
    Ok(())
}

#[tokio::test]
async fn identical_runs_produce_identical_contexts() -> anyhow::Result<()> {
    let flow = linear_flow()?;
    let first = flow.execute(SharedContext::new()).await?;
    let second = flow.execute(SharedContext::new()).await?;
    assert_eq!(
        Value::Object(first.snapshot()),
        Value::Object(second.snapshot())
    );
    Ok(())
}

// ---- 场景 B: 前两次失败，第三次成功 ----

struct FlakyFetch {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Node for FlakyFetch {
    fn name(&self) -> &str {
        "flaky_fetch"
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(3)
    }

    async fn exec(&self, _prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < 3 {
            Err(JobFlowError::Fetch(format!("attempt {call} failed")))
        } else {
            Ok(json!("X"))
        }
    }

    async fn post(
        &self,
        ctx: &SharedContext,
        _prep: Prepared,
        result: Value,
    ) -> jobflow::Result<Outcome> {
        ctx.insert("raw", result);
        Ok(Outcome::default())
    }
}

#[tokio::test]
async fn flow_survives_transient_failures_within_retry_budget() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicU32::new(0));
    let mut builder = Flow::builder("flaky");
    builder
        .node(
            "fetch",
            Arc::new(FlakyFetch {
                calls: Arc::clone(&calls),
            }),
        )
        .node("transform", Arc::new(TransformNode))
        .start("fetch")
        .connect("fetch", "transform");
    let flow = builder.build()?;

    let ctx = flow.execute(SharedContext::new()).await?;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(ctx.get("clean"), Some(json!("x")));
    Ok(())
}

// ---- 循环: 决策节点 + 两个动作节点 ----

/// 计数满 limit 轮后发出终止标签
struct CycleDecision {
    limit: u32,
}

#[async_trait]
impl Node for CycleDecision {
    fn name(&self) -> &str {
        "decision"
    }

    async fn prep(&self, ctx: &SharedContext) -> jobflow::Result<Prepared> {
        Ok(Prepared::Value(
            ctx.get("cycles").unwrap_or(json!(0)),
        ))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        let cycles = prep.value().and_then(Value::as_u64).unwrap_or(0);
        if cycles >= self.limit as u64 {
            Ok(json!("finish"))
        } else {
            Ok(json!("work"))
        }
    }

    async fn post(
        &self,
        _ctx: &SharedContext,
        _prep: Prepared,
        result: Value,
    ) -> jobflow::Result<Outcome> {
        Ok(result.as_str().map(Outcome::from).unwrap_or_default())
    }
}

struct CycleWorker {
    name: String,
    bump: bool,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Node for CycleWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exec(&self, _prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        self.log.lock().push(self.name.clone());
        Ok(Value::Null)
    }

    async fn post(
        &self,
        ctx: &SharedContext,
        _prep: Prepared,
        _result: Value,
    ) -> jobflow::Result<Outcome> {
        if self.bump {
            let cycles = ctx.get("cycles").and_then(|v| v.as_u64()).unwrap_or(0);
            ctx.insert("cycles", json!(cycles + 1));
        }
        Ok(Outcome::default())
    }
}

#[tokio::test]
async fn cyclic_wiring_loops_exactly_until_terminal_label() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = Flow::builder("cycle");
    builder
        .node("decision", Arc::new(CycleDecision { limit: 3 }))
        .node(
            "act_a",
            Arc::new(CycleWorker {
                name: "act_a".to_string(),
                bump: false,
                log: Arc::clone(&log),
            }),
        )
        .node(
            "act_b",
            Arc::new(CycleWorker {
                name: "act_b".to_string(),
                bump: true,
                log: Arc::clone(&log),
            }),
        )
        .start("decision")
        .on("decision", "work", "act_a")
        .connect("act_a", "act_b")
        .connect("act_b", "decision");
    // decision 的 finish 标签无后继，即终止
    let flow = builder.build()?;

    let ctx = flow.execute(SharedContext::new()).await?;
    assert_eq!(ctx.get("cycles"), Some(json!(3)));
    let history = log.lock();
    // 恰好三轮，且每轮两个动作节点都执行
    assert_eq!(history.len(), 6);
    assert_eq!(history.iter().filter(|n| n.as_str() == "act_a").count(), 3);
    assert_eq!(history.iter().filter(|n| n.as_str() == "act_b").count(), 3);
    Ok(())
}

// ---- 取消 ----

struct CancelAfterRun {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Node for CancelAfterRun {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exec(&self, _prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        self.log.lock().push(self.name.clone());
        Ok(Value::Null)
    }

    async fn post(
        &self,
        ctx: &SharedContext,
        _prep: Prepared,
        _result: Value,
    ) -> jobflow::Result<Outcome> {
        ctx.cancel();
        Ok(Outcome::default())
    }
}

#[tokio::test]
async fn cancellation_is_checked_between_nodes() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = Flow::builder("cancelled");
    builder
        .node(
            "first",
            Arc::new(CancelAfterRun {
                name: "first".to_string(),
                log: Arc::clone(&log),
            }),
        )
        .node("second", Recorder::new("second", "done", Arc::clone(&log)))
        .start("first")
        .connect("first", "second");
    let flow = builder.build()?;

    let err = flow.execute(SharedContext::new()).await.unwrap_err();
    assert!(matches!(err, JobFlowError::Cancelled));
    assert_eq!(*log.lock(), vec!["first".to_string()]);
    Ok(())
}
