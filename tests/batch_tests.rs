use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::sleep;

use jobflow::{
    Batch, BatchFlow, BatchNode, BatchSource, Flow, JobFlowError, Node, Outcome, Prepared,
    RetryPolicy, SharedContext,
};

/// 把每个条目翻倍的批量桩，支持按值注入延迟与失败
struct Doubling {
    delays_ms: HashMap<i64, u64>,
    fail_times: HashMap<i64, u32>,
    absorb: bool,
    retry: RetryPolicy,
    calls: Arc<Mutex<HashMap<i64, u32>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Doubling {
    fn new() -> Self {
        Self {
            delays_ms: HashMap::new(),
            fail_times: HashMap::new(),
            absorb: false,
            retry: RetryPolicy::default(),
            calls: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn delay(mut self, item: i64, ms: u64) -> Self {
        self.delays_ms.insert(item, ms);
        self
    }

    fn failing(mut self, item: i64, times: u32) -> Self {
        self.fail_times.insert(item, times);
        self
    }

    fn absorbing(mut self) -> Self {
        self.absorb = true;
        self
    }

    fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl BatchNode for Doubling {
    fn name(&self) -> &str {
        "doubling"
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    async fn prep_batch(&self, ctx: &SharedContext) -> jobflow::Result<Vec<Value>> {
        Ok(ctx
            .get("items")
            .and_then(|value| value.as_array().cloned())
            .unwrap_or_default())
    }

    async fn exec_item(&self, item: &Value, _attempt: u32) -> jobflow::Result<Value> {
        let n = item.as_i64().unwrap_or_default();

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(ms) = self.delays_ms.get(&n) {
            sleep(Duration::from_millis(*ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let seen = {
            let mut calls = self.calls.lock();
            let entry = calls.entry(n).or_insert(0);
            *entry += 1;
            *entry
        };
        if self
            .fail_times
            .get(&n)
            .is_some_and(|times| seen <= *times)
        {
            return Err(JobFlowError::Llm(format!("item {n} failed on call {seen}")));
        }
        Ok(json!(n * 2))
    }

    async fn item_fallback(&self, _item: &Value, error: JobFlowError) -> jobflow::Result<Value> {
        if self.absorb {
            Ok(Value::Null)
        } else {
            Err(error)
        }
    }

    async fn post_batch(
        &self,
        ctx: &SharedContext,
        _items: Vec<Value>,
        results: Vec<Value>,
    ) -> jobflow::Result<Outcome> {
        ctx.insert("results", Value::Array(results));
        Ok(Outcome::default())
    }
}

fn context_with_items(items: Value) -> SharedContext {
    let ctx = SharedContext::new();
    ctx.insert("items", items);
    ctx
}

#[tokio::test]
async fn sequential_batch_preserves_input_order() -> anyhow::Result<()> {
    let inner = Doubling::new();
    let max_in_flight = Arc::clone(&inner.max_in_flight);
    let node = Batch::sequential(inner);

    let ctx = context_with_items(json!([1, 2, 3]));
    node.run(&ctx).await?;

    assert_eq!(ctx.get("results"), Some(json!([2, 4, 6])));
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_batch_assembles_results_in_input_order() -> anyhow::Result<()> {
    // 中间条目最慢，完成顺序与输入顺序不同
    let node = Batch::concurrent(Doubling::new().delay(3, 80).delay(1, 5).delay(2, 5), 3);

    let ctx = context_with_items(json!([1, 2, 3]));
    node.run(&ctx).await?;

    assert_eq!(ctx.get("results"), Some(json!([2, 4, 6])));
    Ok(())
}

#[tokio::test]
async fn order_is_stable_when_early_items_are_slowest() -> anyhow::Result<()> {
    let mut inner = Doubling::new();
    for (index, item) in (1..=6).enumerate() {
        // 越靠前越慢
        inner = inner.delay(item, (6 - index as i64) as u64 * 15);
    }
    let node = Batch::concurrent(inner, 3);

    let ctx = context_with_items(json!([1, 2, 3, 4, 5, 6]));
    node.run(&ctx).await?;

    assert_eq!(ctx.get("results"), Some(json!([2, 4, 6, 8, 10, 12])));
    Ok(())
}

#[tokio::test]
async fn concurrency_stays_within_configured_bound() -> anyhow::Result<()> {
    let mut inner = Doubling::new();
    for item in 1..=6 {
        inner = inner.delay(item, 30);
    }
    let max_in_flight = Arc::clone(&inner.max_in_flight);
    let node = Batch::concurrent(inner, 2);

    let ctx = context_with_items(json!([1, 2, 3, 4, 5, 6]));
    node.run(&ctx).await?;

    let peak = max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak in-flight {peak} exceeded bound");
    assert_eq!(peak, 2, "expected the bound to be reached");
    Ok(())
}

#[tokio::test]
async fn exhausted_item_aborts_the_batch_by_default() -> anyhow::Result<()> {
    let node = Batch::sequential(Doubling::new().failing(2, u32::MAX));

    let ctx = context_with_items(json!([1, 2, 3]));
    let err = node.run(&ctx).await.unwrap_err();
    let JobFlowError::Exhausted { node, source, .. } = err else {
        panic!("unexpected error {err}");
    };
    assert_eq!(node, "doubling");
    // 内层错误指明条目与尝试次数
    match *source {
        JobFlowError::Exhausted { node, attempts, .. } => {
            assert_eq!(node, "doubling[1]");
            assert_eq!(attempts, 1);
        }
        other => panic!("unexpected inner error {other}"),
    }
    assert!(ctx.get("results").is_none());
    Ok(())
}

#[tokio::test]
async fn sequential_abort_skips_remaining_items() -> anyhow::Result<()> {
    let inner = Doubling::new().failing(1, u32::MAX);
    let calls = Arc::clone(&inner.calls);
    let node = Batch::sequential(inner);

    let ctx = context_with_items(json!([1, 2, 3]));
    node.run(&ctx).await.unwrap_err();

    let calls = calls.lock();
    assert_eq!(calls.get(&1), Some(&1));
    assert!(!calls.contains_key(&2));
    assert!(!calls.contains_key(&3));
    Ok(())
}

#[tokio::test]
async fn item_fallback_keeps_placeholder_in_position() -> anyhow::Result<()> {
    let node = Batch::concurrent(Doubling::new().failing(2, u32::MAX).absorbing(), 2);

    let ctx = context_with_items(json!([1, 2, 3]));
    node.run(&ctx).await?;

    assert_eq!(ctx.get("results"), Some(json!([2, null, 6])));
    Ok(())
}

#[tokio::test]
async fn items_retry_independently_per_policy() -> anyhow::Result<()> {
    let inner = Doubling::new().failing(2, 1).with_retry(RetryPolicy::new(3));
    let calls = Arc::clone(&inner.calls);
    let node = Batch::sequential(inner);

    let ctx = context_with_items(json!([1, 2, 3]));
    node.run(&ctx).await?;

    assert_eq!(ctx.get("results"), Some(json!([2, 4, 6])));
    let calls = calls.lock();
    assert_eq!(calls.get(&1), Some(&1));
    assert_eq!(calls.get(&2), Some(&2));
    assert_eq!(calls.get(&3), Some(&1));
    Ok(())
}

#[tokio::test]
async fn empty_batch_produces_empty_results() -> anyhow::Result<()> {
    let node = Batch::concurrent(Doubling::new(), 4);
    let ctx = context_with_items(json!([]));
    let outcome = node.run(&ctx).await?;
    assert!(outcome.is_default());
    assert_eq!(ctx.get("results"), Some(json!([])));
    Ok(())
}

// ---- 批量流程 ----

struct DoubleItem;

#[async_trait]
impl Node for DoubleItem {
    fn name(&self) -> &str {
        "double_item"
    }

    async fn prep(&self, ctx: &SharedContext) -> jobflow::Result<Prepared> {
        Ok(Prepared::Value(ctx.require(self.name(), "item")?))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        let n = prep.value().and_then(Value::as_i64).unwrap_or_default();
        Ok(json!(n * 2))
    }

    async fn post(
        &self,
        ctx: &SharedContext,
        _prep: Prepared,
        result: Value,
    ) -> jobflow::Result<Outcome> {
        ctx.insert("doubled", result);
        Ok(Outcome::default())
    }
}

struct ItemSource;

#[async_trait]
impl BatchSource for ItemSource {
    fn name(&self) -> &str {
        "item_source"
    }

    async fn prep_batch(&self, _ctx: &SharedContext) -> jobflow::Result<Vec<Value>> {
        Ok(vec![
            json!({ "item": 1 }),
            json!({ "item": 2 }),
            json!({ "item": 3 }),
        ])
    }

    async fn post_batch(
        &self,
        ctx: &SharedContext,
        _params: Vec<Value>,
        results: Vec<Value>,
    ) -> jobflow::Result<Outcome> {
        let doubled: Vec<Value> = results
            .iter()
            .map(|snapshot| snapshot["doubled"].clone())
            .collect();
        ctx.insert("doubled_all", Value::Array(doubled));
        Ok(Outcome::default())
    }
}

fn doubling_flow() -> jobflow::Result<Flow> {
    let mut builder = Flow::builder("double_one");
    builder.node("double_item", Arc::new(DoubleItem)).start("double_item");
    builder.build()
}

#[tokio::test]
async fn batch_flow_runs_inner_flow_per_param_set() -> anyhow::Result<()> {
    let node = BatchFlow::sequential(Arc::new(doubling_flow()?), Arc::new(ItemSource));

    let ctx = SharedContext::new();
    node.run(&ctx).await?;

    assert_eq!(ctx.get("doubled_all"), Some(json!([2, 4, 6])));
    // 子运行的中间键不泄漏进父上下文
    assert!(ctx.get("doubled").is_none());
    assert!(ctx.get("item").is_none());
    Ok(())
}

#[tokio::test]
async fn concurrent_batch_flow_keeps_param_order() -> anyhow::Result<()> {
    let node = BatchFlow::concurrent(Arc::new(doubling_flow()?), Arc::new(ItemSource), 3);

    let ctx = SharedContext::new();
    node.run(&ctx).await?;

    assert_eq!(ctx.get("doubled_all"), Some(json!([2, 4, 6])));
    Ok(())
}

// ---- 并发批量的取消联动 ----

struct SlowItems {
    started: Arc<AtomicU32>,
}

#[async_trait]
impl BatchNode for SlowItems {
    fn name(&self) -> &str {
        "slow_items"
    }

    async fn prep_batch(&self, _ctx: &SharedContext) -> jobflow::Result<Vec<Value>> {
        Ok(vec![json!(1), json!(2), json!(3), json!(4)])
    }

    async fn exec_item(&self, item: &Value, _attempt: u32) -> jobflow::Result<Value> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if item.as_i64() == Some(1) {
            // 首个条目立刻失败，其余条目慢
            return Err(JobFlowError::Fetch("boom".to_string()));
        }
        sleep(Duration::from_millis(200)).await;
        Ok(item.clone())
    }
}

#[tokio::test]
async fn first_failure_drops_in_flight_items() -> anyhow::Result<()> {
    let started = Arc::new(AtomicU32::new(0));
    let node = Batch::concurrent(
        SlowItems {
            started: Arc::clone(&started),
        },
        2,
    );

    let ctx = SharedContext::new();
    let begun = std::time::Instant::now();
    node.run(&ctx).await.unwrap_err();

    // 失败立即收场，不等慢条目跑完
    assert!(
        begun.elapsed() < Duration::from_millis(150),
        "batch lingered for {:?}",
        begun.elapsed()
    );
    assert!(started.load(Ordering::SeqCst) <= 2);
    Ok(())
}
