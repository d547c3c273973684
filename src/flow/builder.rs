use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::{JobFlowError, Result};
use crate::flow::graph::Flow;
use crate::flow::node::Node;
use crate::flow::outcome::Outcome;
use crate::flow::retry::RetryPolicy;

/// Flow 构建器 - 注册节点并按标签接线
pub struct FlowBuilder {
    name: String,
    start: Option<String>,
    nodes: HashMap<String, Arc<dyn Node>>,
    transitions: HashMap<String, HashMap<Outcome, String>>,
    retry: RetryPolicy,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            nodes: HashMap::new(),
            transitions: HashMap::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn node(&mut self, name: &str, node: Arc<dyn Node>) -> &mut Self {
        self.nodes.insert(name.to_string(), node);
        self
    }

    pub fn start(&mut self, name: &str) -> &mut Self {
        self.start = Some(name.to_string());
        self
    }

    /// 流程自身的重试策略（嵌套为节点时生效）
    pub fn with_retry(&mut self, retry: RetryPolicy) -> &mut Self {
        self.retry = retry;
        self
    }

    /// 按标签接线；同一 (节点, 标签) 重复接线时后写覆盖并告警
    pub fn on(&mut self, from: &str, label: impl Into<Outcome>, to: &str) -> &mut Self {
        let label = label.into();
        let previous = self
            .transitions
            .entry(from.to_string())
            .or_default()
            .insert(label.clone(), to.to_string());
        if let Some(previous) = previous {
            if previous != to {
                warn!(
                    flow = %self.name,
                    node = %from,
                    label = %label,
                    previous = %previous,
                    replaced_by = %to,
                    "transition overwritten"
                );
            }
        }
        self
    }

    /// 默认标签接线，线性管道的常用形态
    pub fn connect(&mut self, from: &str, to: &str) -> &mut Self {
        self.on(from, Outcome::default(), to)
    }

    /// 校验接线后产出 Flow；悬空引用属配置错误
    pub fn build(self) -> Result<Flow> {
        if let Some(start) = &self.start {
            if !self.nodes.contains_key(start) {
                return Err(JobFlowError::InvalidWiring {
                    flow: self.name,
                    reason: format!("start node `{start}` is not registered"),
                });
            }
        }
        for (from, table) in &self.transitions {
            if !self.nodes.contains_key(from) {
                return Err(JobFlowError::InvalidWiring {
                    flow: self.name,
                    reason: format!("transition source `{from}` is not registered"),
                });
            }
            for (label, to) in table {
                if !self.nodes.contains_key(to) {
                    return Err(JobFlowError::InvalidWiring {
                        flow: self.name,
                        reason: format!(
                            "transition `{from}` --{label}--> `{to}` targets an unknown node"
                        ),
                    });
                }
            }
        }
        Ok(Flow {
            name: self.name,
            start: self.start,
            nodes: self.nodes,
            transitions: self.transitions,
            retry: self.retry,
        })
    }
}
