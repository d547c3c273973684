use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{JobFlowError, Result};
use crate::flow::{Node, Outcome, Prepared, RetryPolicy};
use crate::llm::{DynLlmClient, LlmRequest};
use crate::nodes::{keys, outcomes};
use crate::research::DynFetcher;
use crate::state::SharedContext;

const DEFAULT_PAGE_BUDGET: u64 = 3;
const PAGE_BODY_LIMIT: usize = 4000;

/// 公司调研的决策节点
///
/// 每轮根据上下文状态产出一个动作标签：还有待抓页面且预算未用完则
/// `fetch`，有原始页面但还没有笔记则 `summarize`，否则 `done`。
/// 动作节点执行完都会接回本节点，构成显式终止的循环。
#[derive(Default)]
pub struct PlanResearch;

impl PlanResearch {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node for PlanResearch {
    fn name(&self) -> &str {
        "plan_research"
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        let queue_len = ctx
            .get(keys::RESEARCH_QUEUE)
            .and_then(|value| value.as_array().map(Vec::len))
            .unwrap_or(0);
        let raw_len = ctx
            .get(keys::RESEARCH_RAW)
            .and_then(|value| value.as_array().map(Vec::len))
            .unwrap_or(0);
        let budget = ctx
            .get(keys::RESEARCH_BUDGET)
            .and_then(|value| value.as_u64())
            .unwrap_or(DEFAULT_PAGE_BUDGET);
        let has_notes = ctx.contains_key(keys::RESEARCH_NOTES);
        Ok(Prepared::Value(json!({
            "queue_len": queue_len,
            "raw_len": raw_len,
            "budget": budget,
            "has_notes": has_notes,
        })))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let state = prep.value().cloned().unwrap_or_default();
        let queue_len = state["queue_len"].as_u64().unwrap_or(0);
        let raw_len = state["raw_len"].as_u64().unwrap_or(0);
        let budget = state["budget"].as_u64().unwrap_or(DEFAULT_PAGE_BUDGET);
        let has_notes = state["has_notes"].as_bool().unwrap_or(false);

        let action = if queue_len > 0 && raw_len < budget {
            outcomes::FETCH
        } else if raw_len > 0 && !has_notes {
            outcomes::SUMMARIZE
        } else {
            outcomes::DONE
        };
        debug!(queue_len, raw_len, budget, has_notes, action, "research step decided");
        Ok(Value::String(action.to_string()))
    }

    async fn post(&self, _ctx: &SharedContext, _prep: Prepared, result: Value) -> Result<Outcome> {
        Ok(result
            .as_str()
            .map(Outcome::from)
            .unwrap_or_default())
    }
}

/// 抓取队列头部的公司页面
pub struct FetchCompanyPage {
    fetcher: DynFetcher,
    retry: RetryPolicy,
}

impl FetchCompanyPage {
    pub fn new(fetcher: DynFetcher) -> Self {
        Self {
            fetcher,
            retry: RetryPolicy::new(2),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Node for FetchCompanyPage {
    fn name(&self) -> &str {
        "fetch_company_page"
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        let url = ctx
            .get(keys::RESEARCH_QUEUE)
            .and_then(|value| {
                value
                    .as_array()
                    .and_then(|queue| queue.first().cloned())
            })
            .ok_or_else(|| JobFlowError::MissingInput {
                node: self.name().to_string(),
                key: keys::RESEARCH_QUEUE.to_string(),
            })?;
        Ok(Prepared::Value(url))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let url = prep
            .value()
            .and_then(Value::as_str)
            .ok_or_else(|| JobFlowError::Fetch("queue entries must be URLs".to_string()))?;
        let mut body = self.fetcher.fetch(url).await?;
        if body.len() > PAGE_BODY_LIMIT {
            body.truncate(PAGE_BODY_LIMIT);
        }
        Ok(Value::String(body))
    }

    /// 单页抓不到不值得终止整次运行，留下占位正文继续
    async fn exec_fallback(&self, _prep: &Prepared, error: JobFlowError) -> Result<Value> {
        Ok(Value::String(format!("[page unavailable: {error}]")))
    }

    async fn post(&self, ctx: &SharedContext, prep: Prepared, result: Value) -> Result<Outcome> {
        let url = prep
            .value()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut queue = ctx
            .get(keys::RESEARCH_QUEUE)
            .and_then(|value| value.as_array().cloned())
            .unwrap_or_default();
        if !queue.is_empty() {
            queue.remove(0);
        }
        ctx.insert(keys::RESEARCH_QUEUE, Value::Array(queue));

        let mut raw = ctx
            .get(keys::RESEARCH_RAW)
            .and_then(|value| value.as_array().cloned())
            .unwrap_or_default();
        raw.push(json!({ "url": url, "body": result }));
        ctx.insert(keys::RESEARCH_RAW, Value::Array(raw));

        Ok(Outcome::default())
    }
}

/// 把抓到的页面浓缩成公司调研笔记
pub struct SummarizeResearch {
    llm: DynLlmClient,
    retry: RetryPolicy,
}

impl SummarizeResearch {
    pub fn new(llm: DynLlmClient) -> Self {
        Self {
            llm,
            retry: RetryPolicy::new(2),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn pages_digest(raw: &[Value]) -> String {
    raw.iter()
        .map(|page| {
            format!(
                "## {}\n{}",
                page["url"].as_str().unwrap_or("unknown"),
                page["body"].as_str().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Node for SummarizeResearch {
    fn name(&self) -> &str {
        "summarize_research"
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        let raw = ctx
            .require(self.name(), keys::RESEARCH_RAW)?;
        Ok(Prepared::Value(raw))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let raw = prep
            .value()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let request = LlmRequest::new(format!(
            "Summarise what matters about this employer for a job applicant: culture, \
             product, stage, stack.\n\n{}",
            pages_digest(&raw)
        ))
        .with_system("You write terse company research notes for a job applicant.");
        let response = self.llm.complete(request).await?;
        Ok(Value::String(response.content))
    }

    /// 降级：直接截取原始页面开头作为笔记
    async fn exec_fallback(&self, prep: &Prepared, error: JobFlowError) -> Result<Value> {
        let raw = prep
            .value()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if raw.is_empty() {
            return Err(error);
        }
        let mut digest = pages_digest(&raw);
        digest.truncate(600);
        Ok(Value::String(digest))
    }

    async fn post(&self, ctx: &SharedContext, _prep: Prepared, result: Value) -> Result<Outcome> {
        ctx.insert(keys::RESEARCH_NOTES, result);
        Ok(Outcome::default())
    }
}
