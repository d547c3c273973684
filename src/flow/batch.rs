use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{JobFlowError, Result};
use crate::flow::graph::Flow;
use crate::flow::node::{Node, Prepared};
use crate::flow::outcome::Outcome;
use crate::flow::retry::RetryPolicy;
use crate::state::SharedContext;

/// 批量节点的单项契约
///
/// prep_batch 产出 N 个条目输入，exec_item 对每个条目执行一次，
/// item_fallback 在单条目重试耗尽后决定中止整批（默认）还是以占位
/// 结果继续，post_batch 按输入顺序收到全部结果。
#[async_trait]
pub trait BatchNode: Send + Sync {
    fn name(&self) -> &str;

    /// 单条目的重试策略
    fn retry(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    async fn prep_batch(&self, ctx: &SharedContext) -> Result<Vec<Value>>;

    async fn exec_item(&self, item: &Value, attempt: u32) -> Result<Value>;

    async fn item_fallback(&self, _item: &Value, error: JobFlowError) -> Result<Value> {
        Err(error)
    }

    async fn post_batch(
        &self,
        _ctx: &SharedContext,
        _items: Vec<Value>,
        _results: Vec<Value>,
    ) -> Result<Outcome> {
        Ok(Outcome::default())
    }
}

/// 将 [`BatchNode`] 适配为 [`Node`]
///
/// 顺序与并发两种形态；并发受最大在途数约束，结果仍按输入顺序汇集，
/// 与完成顺序无关。
pub struct Batch<B> {
    inner: B,
    parallelism: usize,
}

impl<B> Batch<B> {
    pub fn sequential(inner: B) -> Self {
        Self {
            inner,
            parallelism: 1,
        }
    }

    pub fn concurrent(inner: B, max_in_flight: usize) -> Self {
        Self {
            inner,
            parallelism: max_in_flight.max(1),
        }
    }
}

async fn run_item<B: BatchNode>(
    inner: &B,
    cancel: &CancellationToken,
    index: usize,
    item: &Value,
) -> Result<Value> {
    let policy = inner.retry();
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(JobFlowError::Cancelled);
        }
        match inner.exec_item(item, attempt).await {
            Ok(value) => return Ok(value),
            Err(JobFlowError::Cancelled) => return Err(JobFlowError::Cancelled),
            Err(error) if error.is_configuration() => return Err(error),
            Err(error) => {
                let used = attempt + 1;
                if used < policy.max_attempts {
                    debug!(
                        node = %inner.name(),
                        index,
                        attempt = used,
                        error = %error,
                        "batch item failed, retrying"
                    );
                    policy.wait(cancel).await?;
                    attempt = used;
                } else {
                    match inner.item_fallback(item, error).await {
                        Ok(value) => return Ok(value),
                        Err(error) => {
                            return Err(JobFlowError::Exhausted {
                                node: format!("{}[{index}]", inner.name()),
                                attempts: used,
                                source: Box::new(error),
                            });
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<B: BatchNode> Node for Batch<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Batch {
            items: self.inner.prep_batch(ctx).await?,
            ctx: ctx.clone(),
        })
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let Prepared::Batch { items, ctx } = prep else {
            return Err(JobFlowError::InvalidWiring {
                flow: self.inner.name().to_string(),
                reason: "batch execution requires batch input".to_string(),
            });
        };
        let cancel = ctx.cancellation();

        let results: Vec<Value> = if self.parallelism <= 1 {
            let mut results = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                results.push(run_item(&self.inner, cancel, index, item).await?);
            }
            results
        } else {
            // buffered 限制在途数并按输入顺序产出；首个失败丢弃在途任务
            stream::iter(items.iter().cloned().enumerate())
                .map(|(index, item)| {
                    let inner = &self.inner;
                    async move { run_item(inner, cancel, index, &item).await }
                })
                .buffered(self.parallelism)
                .try_collect()
                .await?
        };

        Ok(Value::Array(results))
    }

    async fn post(&self, ctx: &SharedContext, prep: Prepared, result: Value) -> Result<Outcome> {
        let items = match prep {
            Prepared::Batch { items, .. } => items,
            _ => Vec::new(),
        };
        let results = match result {
            Value::Array(results) => results,
            _ => Vec::new(),
        };
        self.inner.post_batch(ctx, items, results).await
    }
}

/// 批量流程的参数来源
#[async_trait]
pub trait BatchSource: Send + Sync {
    fn name(&self) -> &str;

    /// 每个参数集驱动一次完整的内部流程运行
    async fn prep_batch(&self, ctx: &SharedContext) -> Result<Vec<Value>>;

    /// params 与 results（每项为子上下文终态）均按输入顺序到达
    async fn post_batch(
        &self,
        _ctx: &SharedContext,
        _params: Vec<Value>,
        _results: Vec<Value>,
    ) -> Result<Outcome> {
        Ok(Outcome::default())
    }
}

/// 批量流程 - 对每个参数集在派生子上下文上运行内部流程一次
///
/// 子运行互不可见，也不写外层上下文；聚合由 post_batch 负责。
pub struct BatchFlow {
    flow: Arc<Flow>,
    source: Arc<dyn BatchSource>,
    parallelism: usize,
}

impl BatchFlow {
    pub fn sequential(flow: Arc<Flow>, source: Arc<dyn BatchSource>) -> Self {
        Self {
            flow,
            source,
            parallelism: 1,
        }
    }

    pub fn concurrent(flow: Arc<Flow>, source: Arc<dyn BatchSource>, max_in_flight: usize) -> Self {
        Self {
            flow,
            source,
            parallelism: max_in_flight.max(1),
        }
    }

    async fn run_once(&self, parent: &SharedContext, param: &Value) -> Result<Value> {
        let child = parent.fork();
        match param {
            Value::Object(entries) => child.merge(entries.clone()),
            other => child.insert("item", other.clone()),
        }
        Node::run(self.flow.as_ref(), &child).await?;
        Ok(Value::Object(child.snapshot()))
    }
}

#[async_trait]
impl Node for BatchFlow {
    fn name(&self) -> &str {
        self.source.name()
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Batch {
            items: self.source.prep_batch(ctx).await?,
            ctx: ctx.clone(),
        })
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let Prepared::Batch { items, ctx } = prep else {
            return Err(JobFlowError::InvalidWiring {
                flow: self.source.name().to_string(),
                reason: "batch flow execution requires batch input".to_string(),
            });
        };

        let results: Vec<Value> = if self.parallelism <= 1 {
            let mut results = Vec::with_capacity(items.len());
            for param in items {
                if ctx.is_cancelled() {
                    return Err(JobFlowError::Cancelled);
                }
                results.push(self.run_once(ctx, param).await?);
            }
            results
        } else {
            stream::iter(items.iter().cloned())
                .map(|param| async move { self.run_once(ctx, &param).await })
                .buffered(self.parallelism)
                .try_collect()
                .await?
        };

        Ok(Value::Array(results))
    }

    async fn post(&self, ctx: &SharedContext, prep: Prepared, result: Value) -> Result<Outcome> {
        let params = match prep {
            Prepared::Batch { items, .. } => items,
            _ => Vec::new(),
        };
        let results = match result {
            Value::Array(results) => results,
            _ => Vec::new(),
        };
        self.source.post_batch(ctx, params, results).await
    }
}
