use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobFlowError>;

#[derive(Debug, Error)]
pub enum JobFlowError {
    #[error("unknown node `{0}` in flow")]
    UnknownNode(String),
    #[error("node `{node}` is missing required context key `{key}`")]
    MissingInput { node: String, key: String },
    #[error("invalid wiring in flow `{flow}`: {reason}")]
    InvalidWiring { flow: String, reason: String },
    #[error("node `{node}` exhausted {attempts} attempt(s): {source}")]
    Exhausted {
        node: String,
        attempts: u32,
        #[source]
        source: Box<JobFlowError>,
    },
    #[error("run cancelled")]
    Cancelled,
    #[error("llm error: {0}")]
    Llm(String),
    #[error("profile error: {0}")]
    Profile(String),
    #[error("document error: {0}")]
    Document(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobFlowError {
    /// 判定是否属于配置错误（不重试，立即终止）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            JobFlowError::UnknownNode(_)
                | JobFlowError::MissingInput { .. }
                | JobFlowError::InvalidWiring { .. }
        )
    }
}
