pub mod error;
pub mod flow;
pub mod ingest;
pub mod llm;
pub mod nodes;
pub mod pipeline;
pub mod profile;
pub mod research;
pub mod state;
pub mod utils;

pub use error::{JobFlowError, Result};
pub use flow::{
    Batch, BatchFlow, BatchNode, BatchSource, Flow, FlowBuilder, Node, Outcome, Prepared,
    RetryPolicy, DEFAULT_OUTCOME,
};
pub use ingest::{DocumentSource, DynDocumentSource, TextDocumentSource};
pub use llm::{DynLlmClient, LlmClient, LlmRequest, LlmResponse, LocalEchoClient};
#[cfg(feature = "openai-client")]
pub use llm::OpenAiClient;
pub use nodes::{
    AssessFit, DraftCoverLetter, DraftCv, ExtractRequirements, FetchCompanyPage, FitReport,
    LoadJobPosting, LoadProfile, MapExperience, PlanResearch, Requirement, RequirementMatch,
    SaveOutputs, SummarizeResearch,
};
pub use pipeline::{
    analysis_flow, application_pipeline, generation_flow, intake_flow, research_flow, PipelineDeps,
};
pub use profile::{
    CareerProfile, DynProfileStore, Education, Experience, JsonFileStore, MemoryProfileStore,
    ProfileStore,
};
pub use research::{DynFetcher, Fetcher, StaticFetcher};
#[cfg(feature = "web-research")]
pub use research::HttpFetcher;
pub use state::SharedContext;
pub use utils::{logging, validation};
