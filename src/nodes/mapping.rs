use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{JobFlowError, Result};
use crate::flow::{BatchNode, Outcome, RetryPolicy};
use crate::llm::{DynLlmClient, LlmRequest};
use crate::nodes::assessment::keyword_overlap;
use crate::nodes::intake::profile_from_ctx;
use crate::nodes::keys;
use crate::nodes::requirements::Requirement;
use crate::state::SharedContext;

const SYSTEM_PROMPT: &str =
    "You match career evidence to one hiring requirement. Reply with a JSON object \
     shaped {\"evidence\": string, \"strength\": number between 0 and 1}. No prose.";

/// 单条要求与履历证据的对应关系
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequirementMatch {
    pub requirement: String,
    pub is_required: bool,
    pub evidence: Option<String>,
    pub strength: f32,
}

/// 逐条要求匹配履历证据的批量节点
///
/// 每条要求一次模型调用。条目失败时退化为关键词匹配占位结果继续整批，
/// 不中止，这是本节点显式选择的批内失败策略。
pub struct MapExperience {
    llm: DynLlmClient,
    retry: RetryPolicy,
}

impl MapExperience {
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

fn item_requirement(item: &Value) -> Result<Requirement> {
    item.get("requirement")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| JobFlowError::Serialization(e.to_string()))?
        .ok_or_else(|| JobFlowError::Serialization("batch item lacks a requirement".to_string()))
}

fn item_digest(item: &Value) -> String {
    item.get("evidence_digest")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_match_json(content: &str) -> Option<(String, f32)> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let evidence = value.get("evidence")?.as_str()?.to_string();
    let strength = value.get("strength")?.as_f64()? as f32;
    Some((evidence, strength.clamp(0.0, 1.0)))
}

/// 降级匹配：在履历要点里找关键词重合度最高的一条
fn keyword_match(requirement: &Requirement, digest: &str) -> RequirementMatch {
    let best = digest
        .lines()
        .map(|line| line.trim_start_matches('-').trim())
        .filter(|line| !line.is_empty())
        .map(|line| (line.to_string(), keyword_overlap(&requirement.text, line)))
        .max_by(|a, b| a.1.total_cmp(&b.1));
    match best {
        Some((evidence, strength)) if strength > 0.0 => RequirementMatch {
            requirement: requirement.text.clone(),
            is_required: requirement.is_required,
            evidence: Some(evidence),
            strength,
        },
        _ => RequirementMatch {
            requirement: requirement.text.clone(),
            is_required: requirement.is_required,
            evidence: None,
            strength: 0.0,
        },
    }
}

#[async_trait]
impl BatchNode for MapExperience {
    fn name(&self) -> &str {
        "map_experience"
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    async fn prep_batch(&self, ctx: &SharedContext) -> Result<Vec<Value>> {
        let requirements: Vec<Requirement> = ctx
            .get_as(keys::REQUIREMENTS)?
            .ok_or_else(|| JobFlowError::MissingInput {
                node: self.name().to_string(),
                key: keys::REQUIREMENTS.to_string(),
            })?;
        let digest = profile_from_ctx(ctx, self.name())?.evidence_digest();
        // 每个条目自带证据摘要，条目之间互不依赖
        requirements
            .into_iter()
            .map(|requirement| {
                Ok(json!({
                    "requirement": serde_json::to_value(&requirement)
                        .map_err(|e| JobFlowError::Serialization(e.to_string()))?,
                    "evidence_digest": digest,
                }))
            })
            .collect()
    }

    async fn exec_item(&self, item: &Value, _attempt: u32) -> Result<Value> {
        let requirement = item_requirement(item)?;
        let digest = item_digest(item);
        let request = LlmRequest::new(format!(
            "Requirement: {}\n\nCareer evidence:\n{digest}",
            requirement.text
        ))
        .with_system(SYSTEM_PROMPT);
        let response = self.llm.complete(request).await?;
        let (evidence, strength) = parse_match_json(&response.content).ok_or_else(|| {
            JobFlowError::Llm("experience matching returned unparseable output".to_string())
        })?;
        serde_json::to_value(RequirementMatch {
            requirement: requirement.text,
            is_required: requirement.is_required,
            evidence: Some(evidence),
            strength,
        })
        .map_err(|e| JobFlowError::Serialization(e.to_string()))
    }

    async fn item_fallback(&self, item: &Value, _error: JobFlowError) -> Result<Value> {
        let requirement = item_requirement(item)?;
        let matched = keyword_match(&requirement, &item_digest(item));
        debug!(
            node = self.name(),
            requirement = %matched.requirement,
            strength = matched.strength as f64,
            "item degraded to keyword matching"
        );
        serde_json::to_value(matched).map_err(|e| JobFlowError::Serialization(e.to_string()))
    }

    async fn post_batch(
        &self,
        ctx: &SharedContext,
        _items: Vec<Value>,
        results: Vec<Value>,
    ) -> Result<Outcome> {
        ctx.insert(keys::REQUIREMENT_MATCHES, Value::Array(results));
        Ok(Outcome::default())
    }
}
