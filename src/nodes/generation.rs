use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{JobFlowError, Result};
use crate::flow::{Node, Outcome, Prepared, RetryPolicy};
use crate::llm::{DynLlmClient, LlmRequest};
use crate::nodes::assessment::FitReport;
use crate::nodes::intake::profile_from_ctx;
use crate::nodes::keys;
use crate::state::SharedContext;

fn generation_input(ctx: &SharedContext, node: &str) -> Result<Value> {
    let profile = profile_from_ctx(ctx, node)?;
    Ok(json!({
        "name": profile.name,
        "title": profile.title,
        "digest": profile.evidence_digest(),
        "matches": ctx.get(keys::REQUIREMENT_MATCHES).unwrap_or(Value::Null),
        "fit": ctx.get(keys::FIT_REPORT).unwrap_or(Value::Null),
        "notes": ctx.get(keys::RESEARCH_NOTES).unwrap_or(Value::Null),
    }))
}

/// 生成定制 CV 草稿
pub struct DraftCv {
    llm: DynLlmClient,
    retry: RetryPolicy,
}

impl DraftCv {
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

#[async_trait]
impl Node for DraftCv {
    fn name(&self) -> &str {
        "draft_cv"
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Value(generation_input(ctx, self.name())?))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let input = prep.value().cloned().unwrap_or_default();
        let request = LlmRequest::new(format!(
            "Write a one-page CV in Markdown tailored to the matched requirements. \
             Lead with the strongest evidence.\n\n{input}"
        ))
        .with_system("You write tight, truthful CVs. Never invent experience.");
        let response = self.llm.complete(request).await?;
        Ok(Value::String(response.content))
    }

    /// 降级：无模型时按模板拼一版
    async fn exec_fallback(&self, prep: &Prepared, _error: JobFlowError) -> Result<Value> {
        let input = prep.value().cloned().unwrap_or_default();
        let cv = format!(
            "# {}\n{}\n\n## Experience\n{}",
            input["name"].as_str().unwrap_or("Candidate"),
            input["title"].as_str().unwrap_or(""),
            input["digest"].as_str().unwrap_or("")
        );
        Ok(Value::String(cv))
    }

    async fn post(&self, ctx: &SharedContext, _prep: Prepared, result: Value) -> Result<Outcome> {
        ctx.insert(keys::CV_DRAFT, result);
        Ok(Outcome::default())
    }
}

/// 生成求职信草稿
pub struct DraftCoverLetter {
    llm: DynLlmClient,
    retry: RetryPolicy,
}

impl DraftCoverLetter {
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

#[async_trait]
impl Node for DraftCoverLetter {
    fn name(&self) -> &str {
        "draft_cover_letter"
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Value(generation_input(ctx, self.name())?))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let input = prep.value().cloned().unwrap_or_default();
        let request = LlmRequest::new(format!(
            "Write a short cover letter. Use the company research notes for specificity \
             and address the weakest matches honestly.\n\n{input}"
        ))
        .with_system("You write direct, warm cover letters without clichés.");
        let response = self.llm.complete(request).await?;
        Ok(Value::String(response.content))
    }

    async fn exec_fallback(&self, prep: &Prepared, _error: JobFlowError) -> Result<Value> {
        let input = prep.value().cloned().unwrap_or_default();
        let recommendation = serde_json::from_value::<FitReport>(input["fit"].clone())
            .map(|fit| fit.recommendation)
            .unwrap_or_default();
        let letter = format!(
            "Dear hiring team,\n\nI am {} ({}), applying for this role.\n{}\n\nBest regards,\n{}",
            input["name"].as_str().unwrap_or("the candidate"),
            input["title"].as_str().unwrap_or(""),
            recommendation,
            input["name"].as_str().unwrap_or("")
        );
        Ok(Value::String(letter))
    }

    async fn post(&self, ctx: &SharedContext, _prep: Prepared, result: Value) -> Result<Outcome> {
        ctx.insert(keys::COVER_LETTER_DRAFT, result);
        Ok(Outcome::default())
    }
}

/// 汇总产物；配置了输出目录时同时落盘
#[derive(Default)]
pub struct SaveOutputs;

impl SaveOutputs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node for SaveOutputs {
    fn name(&self) -> &str {
        "save_outputs"
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        let cv = ctx.require(self.name(), keys::CV_DRAFT)?;
        let cover_letter = ctx.require(self.name(), keys::COVER_LETTER_DRAFT)?;
        Ok(Prepared::Value(json!({
            "cv": cv,
            "cover_letter": cover_letter,
            "output_dir": ctx.get(keys::OUTPUT_DIR).unwrap_or(Value::Null),
        })))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let input = prep.value().cloned().unwrap_or_default();
        let Some(dir) = input["output_dir"].as_str().map(PathBuf::from) else {
            return Ok(Value::Null);
        };
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            JobFlowError::Document(format!("failed to create `{}`: {e}", dir.display()))
        })?;
        let cv_path = dir.join("cv.md");
        let letter_path = dir.join("cover_letter.md");
        tokio::fs::write(&cv_path, input["cv"].as_str().unwrap_or_default())
            .await
            .map_err(|e| JobFlowError::Document(e.to_string()))?;
        tokio::fs::write(&letter_path, input["cover_letter"].as_str().unwrap_or_default())
            .await
            .map_err(|e| JobFlowError::Document(e.to_string()))?;
        Ok(json!({
            "cv": cv_path.display().to_string(),
            "cover_letter": letter_path.display().to_string(),
        }))
    }

    async fn post(&self, ctx: &SharedContext, prep: Prepared, result: Value) -> Result<Outcome> {
        let input = match prep {
            Prepared::Value(input) => input,
            _ => Value::Null,
        };
        let mut outputs = json!({
            "cv": input["cv"],
            "cover_letter": input["cover_letter"],
        });
        if !result.is_null() {
            outputs["files"] = result;
        }
        ctx.insert(keys::OUTPUTS, outputs);
        Ok(Outcome::default())
    }
}
