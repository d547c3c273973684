use anyhow::anyhow;

use crate::error::{JobFlowError, Result};
use crate::profile::CareerProfile;

/// 输入校验器
pub struct InputValidator;

impl InputValidator {
    /// 验证 URL 格式
    pub fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(JobFlowError::Other(anyhow!("URL 不能为空")));
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(JobFlowError::Other(anyhow!(
                "URL 必须以 http:// 或 https:// 开头"
            )));
        }

        Ok(())
    }

    /// 验证调研页数预算
    pub fn validate_research_budget(budget: u64) -> Result<()> {
        if budget == 0 {
            return Err(JobFlowError::Other(anyhow!("调研预算必须大于 0")));
        }
        if budget > 20 {
            return Err(JobFlowError::Other(anyhow!(
                "调研预算过大（最多 20 页），当前值: {}",
                budget
            )));
        }
        Ok(())
    }

    /// 验证档案基本字段
    pub fn validate_profile(profile: &CareerProfile) -> Result<()> {
        if profile.name.trim().is_empty() {
            return Err(JobFlowError::Profile("profile name is empty".to_string()));
        }
        if profile.experiences.is_empty() && profile.skills.is_empty() {
            return Err(JobFlowError::Profile(
                "profile has neither experiences nor skills".to_string(),
            ));
        }
        Ok(())
    }
}
