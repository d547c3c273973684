use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{JobFlowError, Result};
use crate::flow::builder::FlowBuilder;
use crate::flow::node::{Node, Prepared};
use crate::flow::outcome::Outcome;
use crate::flow::retry::RetryPolicy;
use crate::state::SharedContext;

/// Flow - 从起始节点可达的有向图，本身满足节点契约，可嵌套
pub struct Flow {
    pub(crate) name: String,
    pub(crate) start: Option<String>,
    pub(crate) nodes: HashMap<String, Arc<dyn Node>>,
    pub(crate) transitions: HashMap<String, HashMap<Outcome, String>>,
    pub(crate) retry: RetryPolicy,
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("start", &self.start)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("transitions", &self.transitions)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Flow {
    pub fn builder(name: impl Into<String>) -> FlowBuilder {
        FlowBuilder::new(name)
    }

    pub fn flow_name(&self) -> &str {
        &self.name
    }

    pub fn start_node(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(name)
    }

    /// 查后继：先精确匹配标签，再落到默认标签，都没有则终止
    pub fn successor(&self, from: &str, outcome: &Outcome) -> Option<&str> {
        let table = self.transitions.get(from)?;
        table
            .get(outcome)
            .or_else(|| table.get(&Outcome::default()))
            .map(String::as_str)
    }

    /// 顶层入口：在给定上下文上运行至终止，返回同一上下文
    pub async fn execute(&self, ctx: SharedContext) -> Result<SharedContext> {
        Node::run(self, &ctx).await?;
        Ok(ctx)
    }

    /// 按转换表驱动图：节点严格串行，循环不设上限，终止条件由接线决定
    pub(crate) async fn orchestrate(&self, ctx: &SharedContext) -> Result<Outcome> {
        let Some(start) = self.start.as_deref() else {
            // 无起始节点的流程是空操作，上下文原样保留
            return Ok(Outcome::default());
        };

        let mut current = start.to_string();
        let mut last = Outcome::default();
        loop {
            if ctx.is_cancelled() {
                return Err(JobFlowError::Cancelled);
            }
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| JobFlowError::UnknownNode(current.clone()))?;
            last = node.run(ctx).await?;
            debug!(flow = %self.name, node = %current, outcome = %last, "node finished");
            match self.successor(&current, &last) {
                Some(next) => current = next.to_string(),
                None => break,
            }
        }
        Ok(last)
    }
}

#[async_trait]
impl Node for Flow {
    fn name(&self) -> &str {
        &self.name
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// 嵌套时 prep 转发外层共享上下文
    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Forward(ctx.clone()))
    }

    /// exec 即运行完整内部图；流程自己的重试策略包住整次编排
    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let ctx = prep
            .forwarded()
            .ok_or_else(|| JobFlowError::InvalidWiring {
                flow: self.name.clone(),
                reason: "flow execution requires a forwarded context".to_string(),
            })?;
        let outcome = self.orchestrate(ctx).await?;
        Ok(Value::String(outcome.into_string()))
    }

    /// 对外结果标签取内部终点节点的标签
    async fn post(&self, _ctx: &SharedContext, _prep: Prepared, result: Value) -> Result<Outcome> {
        Ok(result
            .as_str()
            .map(Outcome::from)
            .unwrap_or_default())
    }
}
