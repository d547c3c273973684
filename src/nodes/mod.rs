// 应用节点模块 - 接在编排引擎上的各业务步骤

pub mod assessment;
pub mod generation;
pub mod intake;
pub mod mapping;
pub mod requirements;
pub mod research;

pub use assessment::{AssessFit, FitReport};
pub use generation::{DraftCoverLetter, DraftCv, SaveOutputs};
pub use intake::{LoadJobPosting, LoadProfile};
pub use mapping::{MapExperience, RequirementMatch};
pub use requirements::{ExtractRequirements, Requirement};
pub use research::{FetchCompanyPage, PlanResearch, SummarizeResearch};

/// 共享上下文键名常量
///
/// 每个键在流水线的某个阶段恰有一个约定生产者；读取方必须把缺失当作
/// "尚未产出" 处理。
pub mod keys {
    /// 输入：档案存储键 / 文件路径
    pub const PROFILE_KEY: &str = "profile_key";
    /// 输入：职位描述文档路径
    pub const POSTING_PATH: &str = "posting_path";
    /// 输入：公司调研待抓取 URL 队列
    pub const RESEARCH_QUEUE: &str = "research_queue";
    /// 输入：调研抓取页数预算
    pub const RESEARCH_BUDGET: &str = "research_budget";
    /// 输入：产物落盘目录（缺省只写上下文）
    pub const OUTPUT_DIR: &str = "output_dir";

    pub const PROFILE: &str = "profile";
    pub const POSTING: &str = "posting";
    pub const REQUIREMENTS: &str = "requirements";
    pub const REQUIREMENT_MATCHES: &str = "requirement_matches";
    pub const FIT_REPORT: &str = "fit_report";
    pub const RESEARCH_RAW: &str = "research_raw";
    pub const RESEARCH_NOTES: &str = "research_notes";
    pub const CV_DRAFT: &str = "cv_draft";
    pub const COVER_LETTER_DRAFT: &str = "cover_letter_draft";
    pub const OUTPUTS: &str = "outputs";
}

/// 调研决策节点的结果标签
pub mod outcomes {
    pub const FETCH: &str = "fetch";
    pub const SUMMARIZE: &str = "summarize";
    pub const DONE: &str = "done";
}
