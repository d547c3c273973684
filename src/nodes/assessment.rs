use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JobFlowError, Result};
use crate::flow::{Node, Outcome, Prepared};
use crate::nodes::keys;
use crate::nodes::mapping::RequirementMatch;
use crate::state::SharedContext;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "at", "for", "in", "of", "on", "or", "the", "to", "with", "you",
        "we", "our", "your", "is", "are", "as", "be", "will", "have", "has", "plus",
    ]
    .into_iter()
    .collect()
});

pub(crate) fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '+')
        .map(str::to_lowercase)
        .filter(|token| token.len() > 1 && !STOP_WORDS.contains(token.as_str()))
        .collect()
}

/// 关键词重合度：要求词元被证据覆盖的比例
pub(crate) fn keyword_overlap(requirement: &str, evidence: &str) -> f32 {
    let wanted = tokenize(requirement);
    if wanted.is_empty() {
        return 0.0;
    }
    let offered = tokenize(evidence);
    let hits = wanted.iter().filter(|token| offered.contains(*token)).count();
    hits as f32 / wanted.len() as f32
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitMatch {
    pub requirement: String,
    pub evidence: String,
    pub strength: f32,
}

/// 匹配度报告
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitReport {
    pub overall_score: u32,
    pub strong_matches: Vec<FitMatch>,
    pub partial_matches: Vec<FitMatch>,
    pub gaps: Vec<String>,
    pub recommendation: String,
}

const STRONG_THRESHOLD: f32 = 0.75;
const PARTIAL_THRESHOLD: f32 = 0.4;

/// 由要求匹配结果生成匹配度报告的确定性节点
///
/// 纯计算，无外部调用，因此不配重试。
#[derive(Default)]
pub struct AssessFit;

impl AssessFit {
    pub fn new() -> Self {
        Self
    }

    fn report(matches: &[RequirementMatch]) -> FitReport {
        let mut strong = Vec::new();
        let mut partial = Vec::new();
        let mut gaps = Vec::new();
        let mut required_gaps = 0usize;

        for entry in matches {
            let evidence = entry.evidence.clone().unwrap_or_default();
            if entry.strength >= STRONG_THRESHOLD {
                strong.push(FitMatch {
                    requirement: entry.requirement.clone(),
                    evidence,
                    strength: entry.strength,
                });
            } else if entry.strength >= PARTIAL_THRESHOLD {
                partial.push(FitMatch {
                    requirement: entry.requirement.clone(),
                    evidence,
                    strength: entry.strength,
                });
            } else {
                if entry.is_required {
                    required_gaps += 1;
                }
                gaps.push(entry.requirement.clone());
            }
        }

        let overall_score = if matches.is_empty() {
            0
        } else {
            let sum: f32 = matches.iter().map(|entry| entry.strength.clamp(0.0, 1.0)).sum();
            ((sum / matches.len() as f32) * 100.0).round() as u32
        };

        let recommendation = if required_gaps > 0 {
            format!(
                "{required_gaps} mandatory requirement(s) lack evidence; address them in the cover letter"
            )
        } else if overall_score >= 70 {
            "Strong fit; lead with the strongest matches".to_string()
        } else if overall_score >= 40 {
            "Partial fit; emphasise transferable experience".to_string()
        } else {
            "Weak fit; consider whether to apply".to_string()
        };

        FitReport {
            overall_score,
            strong_matches: strong,
            partial_matches: partial,
            gaps,
            recommendation,
        }
    }
}

#[async_trait]
impl Node for AssessFit {
    fn name(&self) -> &str {
        "assess_fit"
    }

    async fn prep(&self, ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Value(
            ctx.require(self.name(), keys::REQUIREMENT_MATCHES)?,
        ))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> Result<Value> {
        let matches: Vec<RequirementMatch> = prep
            .value()
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JobFlowError::Serialization(e.to_string()))?
            .unwrap_or_default();
        let report = Self::report(&matches);
        serde_json::to_value(report).map_err(|e| JobFlowError::Serialization(e.to_string()))
    }

    async fn post(&self, ctx: &SharedContext, _prep: Prepared, result: Value) -> Result<Outcome> {
        ctx.insert(keys::FIT_REPORT, result);
        Ok(Outcome::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(requirement: &str, is_required: bool, strength: f32) -> RequirementMatch {
        RequirementMatch {
            requirement: requirement.to_string(),
            is_required,
            evidence: Some("evidence".to_string()),
            strength,
        }
    }

    #[test]
    fn overlap_counts_requirement_tokens() {
        let score = keyword_overlap("5+ years Rust experience", "Four years writing Rust services");
        assert!(score > 0.3, "got {score}");
        assert_eq!(keyword_overlap("", "anything"), 0.0);
    }

    #[test]
    fn report_buckets_by_strength() {
        let report = AssessFit::report(&[
            entry("Rust", true, 0.9),
            entry("Kubernetes", false, 0.5),
            entry("Haskell", true, 0.1),
        ]);
        assert_eq!(report.strong_matches.len(), 1);
        assert_eq!(report.partial_matches.len(), 1);
        assert_eq!(report.gaps, vec!["Haskell".to_string()]);
        assert_eq!(report.overall_score, 50);
        assert!(report.recommendation.contains("mandatory"));
    }

    #[test]
    fn empty_matches_score_zero() {
        let report = AssessFit::report(&[]);
        assert_eq!(report.overall_score, 0);
        assert!(report.gaps.is_empty());
    }
}
