use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{JobFlowError, Result};
use crate::flow::{Node, Outcome, Prepared, RetryPolicy};
use crate::ingest::DynDocumentSource;
use crate::nodes::keys;
use crate::profile::{CareerProfile, DynProfileStore};
use crate::state::SharedContext;

/// 读取职业履历并写入上下文
pub struct LoadProfile {
    store: DynProfileStore,
    retry: RetryPolicy,
}

impl LoadProfile {
    pub fn new(store: DynProfileStore) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Node for LoadProfile {
    fn name(&self) -> &str {
        "load_profile"
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Value(ctx.require(self.name(), keys::PROFILE_KEY)?))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let key = prep
            .value()
            .and_then(Value::as_str)
            .ok_or_else(|| JobFlowError::Profile("profile key must be a string".to_string()))?;
        let profile = self
            .store
            .load(key)
            .await?
            .ok_or_else(|| JobFlowError::Profile(format!("profile `{key}` not found")))?;
        serde_json::to_value(profile).map_err(|e| JobFlowError::Serialization(e.to_string()))
    }

    async fn post(&self, ctx: &SharedContext, _prep: Prepared, result: Value) -> Result<Outcome> {
        ctx.insert(keys::PROFILE, result);
        Ok(Outcome::default())
    }
}

/// 读取职位描述文档并写入上下文
pub struct LoadJobPosting {
    source: DynDocumentSource,
    retry: RetryPolicy,
}

impl LoadJobPosting {
    pub fn new(source: DynDocumentSource) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Node for LoadJobPosting {
    fn name(&self) -> &str {
        "load_job_posting"
    }

    fn retry(&self) -> RetryPolicy {
        self.retry
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Value(
            ctx.require(self.name(), keys::POSTING_PATH)?,
        ))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let path = prep
            .value()
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .ok_or_else(|| {
                JobFlowError::Document("posting path must be a string".to_string())
            })?;
        let text = self.source.load(&path).await?;
        Ok(Value::String(text))
    }

    async fn post(&self, ctx: &SharedContext, _prep: Prepared, result: Value) -> Result<Outcome> {
        ctx.insert(keys::POSTING, result);
        Ok(Outcome::default())
    }
}

pub(crate) fn profile_from_ctx(ctx: &SharedContext, node: &str) -> Result<CareerProfile> {
    ctx.get_as::<CareerProfile>(keys::PROFILE)?
        .ok_or_else(|| JobFlowError::MissingInput {
            node: node.to_string(),
            key: keys::PROFILE.to_string(),
        })
}
