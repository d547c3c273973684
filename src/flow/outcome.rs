use serde::{Deserialize, Serialize};

/// 保留的默认结果标签
pub const DEFAULT_OUTCOME: &str = "default";

/// 结果标签 - post 阶段返回、转换表用来选路的字符串标记
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outcome(String);

impl Outcome {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_OUTCOME
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self(DEFAULT_OUTCOME.to_string())
    }
}

impl From<&str> for Outcome {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for Outcome {
    fn from(label: String) -> Self {
        Self(label)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_label_is_reserved_value() {
        assert_eq!(Outcome::default().as_str(), DEFAULT_OUTCOME);
        assert!(Outcome::default().is_default());
        assert!(!Outcome::new("approve").is_default());
    }

    #[test]
    fn outcomes_compare_by_label() {
        assert_eq!(Outcome::new("x"), Outcome::from("x"));
        assert_ne!(Outcome::new("x"), Outcome::new("y"));
    }
}
