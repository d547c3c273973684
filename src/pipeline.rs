use std::sync::Arc;

use crate::error::Result;
use crate::flow::{Batch, Flow};
use crate::ingest::DynDocumentSource;
use crate::llm::DynLlmClient;
use crate::nodes::{
    outcomes, AssessFit, DraftCoverLetter, DraftCv, ExtractRequirements, FetchCompanyPage,
    LoadJobPosting, LoadProfile, MapExperience, PlanResearch, SaveOutputs, SummarizeResearch,
};
use crate::profile::DynProfileStore;
use crate::research::DynFetcher;

/// 流水线消费的全部外部协作者
#[derive(Clone)]
pub struct PipelineDeps {
    pub llm: DynLlmClient,
    pub profiles: DynProfileStore,
    pub documents: DynDocumentSource,
    pub fetcher: DynFetcher,
}

/// 要求匹配的最大并发模型调用数
const MAPPING_MAX_IN_FLIGHT: usize = 4;

/// 摄入阶段：读档案、读职位描述
pub fn intake_flow(deps: &PipelineDeps) -> Result<Flow> {
    let mut builder = Flow::builder("intake");
    builder
        .node(
            "load_profile",
            Arc::new(LoadProfile::new(deps.profiles.clone())),
        )
        .node(
            "load_posting",
            Arc::new(LoadJobPosting::new(deps.documents.clone())),
        )
        .start("load_profile")
        .connect("load_profile", "load_posting");
    builder.build()
}

/// 分析阶段：抽要求、批量匹配证据、出匹配度报告
pub fn analysis_flow(deps: &PipelineDeps) -> Result<Flow> {
    let mut builder = Flow::builder("analysis");
    builder
        .node(
            "extract_requirements",
            Arc::new(ExtractRequirements::new(deps.llm.clone())),
        )
        .node(
            "map_experience",
            Arc::new(Batch::concurrent(
                MapExperience::new(deps.llm.clone()),
                MAPPING_MAX_IN_FLIGHT,
            )),
        )
        .node("assess_fit", Arc::new(AssessFit::new()))
        .start("extract_requirements")
        .connect("extract_requirements", "map_experience")
        .connect("map_experience", "assess_fit");
    builder.build()
}

/// 调研阶段：决策节点与动作节点构成的显式终止循环
pub fn research_flow(deps: &PipelineDeps) -> Result<Flow> {
    let mut builder = Flow::builder("research");
    builder
        .node("plan", Arc::new(PlanResearch::new()))
        .node(
            "fetch_page",
            Arc::new(FetchCompanyPage::new(deps.fetcher.clone())),
        )
        .node(
            "summarize",
            Arc::new(SummarizeResearch::new(deps.llm.clone())),
        )
        .start("plan")
        .on("plan", outcomes::FETCH, "fetch_page")
        .on("plan", outcomes::SUMMARIZE, "summarize")
        .connect("fetch_page", "plan")
        .connect("summarize", "plan");
    // plan 的 done 标签无后继，即循环出口
    builder.build()
}

/// 生成阶段：CV、求职信、产物汇总
pub fn generation_flow(deps: &PipelineDeps) -> Result<Flow> {
    let mut builder = Flow::builder("generation");
    builder
        .node("draft_cv", Arc::new(DraftCv::new(deps.llm.clone())))
        .node(
            "draft_cover_letter",
            Arc::new(DraftCoverLetter::new(deps.llm.clone())),
        )
        .node("save_outputs", Arc::new(SaveOutputs::new()))
        .start("draft_cv")
        .connect("draft_cv", "draft_cover_letter")
        .connect("draft_cover_letter", "save_outputs");
    builder.build()
}

/// 端到端流水线：四个阶段流程作为节点串联
pub fn application_pipeline(deps: &PipelineDeps) -> Result<Flow> {
    let mut builder = Flow::builder("application_pipeline");
    builder
        .node("intake", Arc::new(intake_flow(deps)?))
        .node("analysis", Arc::new(analysis_flow(deps)?))
        .node("research", Arc::new(research_flow(deps)?))
        .node("generation", Arc::new(generation_flow(deps)?))
        .start("intake")
        .connect("intake", "analysis")
        .connect("analysis", "research")
        .connect("research", "generation");
    builder.build()
}
