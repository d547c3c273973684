use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{JobFlowError, Result};
use crate::flow::{Node, Outcome, Prepared, RetryPolicy};
use crate::llm::{DynLlmClient, LlmRequest};
use crate::nodes::keys;
use crate::state::SharedContext;

const SYSTEM_PROMPT: &str =
    "You extract hiring requirements from job postings. Reply with a JSON array of \
     objects shaped {\"text\": string, \"is_required\": bool}. No prose.";

/// 职位描述中抽出的单条要求
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Requirement {
    pub text: String,
    pub is_required: bool,
}

/// 用 LLM 把职位描述结构化为要求列表
///
/// 末次尝试换用精简提示词；重试耗尽后退化为行启发式抽取，
/// 保证流水线在没有可用模型时仍能走通。
pub struct ExtractRequirements {
    llm: DynLlmClient,
    retry: RetryPolicy,
}

impl ExtractRequirements {
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

    fn prompt(&self, posting: &str, attempt: u32) -> LlmRequest {
        let final_attempt = attempt + 1 >= self.retry.max_attempts;
        let user = if final_attempt {
            // 末次尝试：最小化指令，提高格式服从率
            format!("JSON array of requirements from:\n{posting}")
        } else {
            format!(
                "Extract every requirement from the job posting below. Mark lines that \
                 are mandatory with is_required=true.\n\n{posting}"
            )
        };
        LlmRequest::new(user).with_system(SYSTEM_PROMPT)
    }
}

pub(crate) fn parse_requirement_json(content: &str) -> Option<Vec<Requirement>> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if let Ok(list) = serde_json::from_str::<Vec<Requirement>>(trimmed) {
        return Some(list);
    }
    // 宽容 {"requirements": [...]} 包装
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|value| {
            value
                .get("requirements")
                .cloned()
                .and_then(|list| serde_json::from_value(list).ok())
        })
}

/// 行启发式：保留疑似要求的行，作为无模型时的降级产物
pub(crate) fn heuristic_requirements(posting: &str) -> Vec<Requirement> {
    posting
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.len() < 200)
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("require")
                || lower.contains("must")
                || lower.contains("experience")
                || lower.contains("years")
        })
        .map(|line| Requirement {
            text: line.trim_start_matches(['-', '*']).trim().to_string(),
            is_required: line.to_lowercase().contains("require")
                || line.to_lowercase().contains("must"),
        })
        .collect()
}

#[async_trait]
impl Node for ExtractRequirements {
    fn name(&self) -> &str {
        "extract_requirements"
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Value(ctx.require(self.name(), keys::POSTING)?))
    }

    async fn exec(&self, prep: &Prepared, attempt: u32) -> Result<Value> {
        let posting = prep
            .value()
            .and_then(Value::as_str)
            .ok_or_else(|| JobFlowError::Document("posting must be text".to_string()))?;
        let response = self.llm.complete(self.prompt(posting, attempt)).await?;
        let requirements = parse_requirement_json(&response.content).ok_or_else(|| {
            JobFlowError::Llm("requirement extraction returned unparseable output".to_string())
        })?;
        if requirements.is_empty() {
            return Err(JobFlowError::Llm(
                "requirement extraction returned an empty list".to_string(),
            ));
        }
        serde_json::to_value(requirements).map_err(|e| JobFlowError::Serialization(e.to_string()))
    }

    async fn exec_fallback(&self, prep: &Prepared, error: JobFlowError) -> Result<Value> {
        let Some(posting) = prep.value().and_then(Value::as_str) else {
            return Err(error);
        };
        let requirements = heuristic_requirements(posting);
        if requirements.is_empty() {
            return Err(error);
        }
        debug!(
            node = self.name(),
            count = requirements.len(),
            "falling back to line-based extraction"
        );
        serde_json::to_value(requirements).map_err(|e| JobFlowError::Serialization(e.to_string()))
    }

    async fn post(&self, ctx: &SharedContext, _prep: Prepared, result: Value) -> Result<Outcome> {
        ctx.insert(keys::REQUIREMENTS, result);
        Ok(Outcome::default())
    }
}
