use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{JobFlowError, Result};

/// 职业履历 - 求职者的结构化档案
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CareerProfile {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub experiences: Vec<Experience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Experience {
    pub company: String,
    pub role: String,
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    #[serde(default)]
    pub year: Option<u32>,
}

impl CareerProfile {
    /// 履历要点的紧凑文本，供提示词拼装使用
    pub fn evidence_digest(&self) -> String {
        let mut lines = Vec::new();
        for experience in &self.experiences {
            let span = match &experience.end {
                Some(end) => format!("{} - {end}", experience.start),
                None => format!("{} - present", experience.start),
            };
            lines.push(format!(
                "{} at {} ({span})",
                experience.role, experience.company
            ));
            for highlight in &experience.highlights {
                lines.push(format!("  - {highlight}"));
            }
        }
        if !self.skills.is_empty() {
            lines.push(format!("Skills: {}", self.skills.join(", ")));
        }
        lines.join("\n")
    }
}

/// 档案存储 trait - 核心之外的持久化读写对
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<CareerProfile>>;
    async fn save(&self, key: &str, profile: &CareerProfile) -> Result<()>;
}

pub type DynProfileStore = Arc<dyn ProfileStore>;

/// 内存存储实现
#[derive(Default)]
pub struct MemoryProfileStore {
    inner: RwLock<HashMap<String, CareerProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(key: &str, profile: CareerProfile) -> Self {
        let store = Self::new();
        store.inner.write().insert(key.to_string(), profile);
        store
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, key: &str) -> Result<Option<CareerProfile>> {
        Ok(self.inner.read().get(key).cloned())
    }

    async fn save(&self, key: &str, profile: &CareerProfile) -> Result<()> {
        self.inner
            .write()
            .insert(key.to_string(), profile.clone());
        Ok(())
    }
}

/// JSON 文件存储 - key 解释为文件路径
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        let path = Path::new(key);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl ProfileStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<CareerProfile>> {
        let path = self.resolve(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(JobFlowError::Profile(format!(
                    "failed to read `{}`: {e}",
                    path.display()
                )));
            }
        };
        let profile = serde_json::from_str(&raw)
            .map_err(|e| JobFlowError::Profile(format!("malformed profile `{key}`: {e}")))?;
        Ok(Some(profile))
    }

    async fn save(&self, key: &str, profile: &CareerProfile) -> Result<()> {
        let path = self.resolve(key);
        let raw = serde_json::to_string_pretty(profile)
            .map_err(|e| JobFlowError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| JobFlowError::Profile(format!("failed to write `{}`: {e}", path.display())))
    }
}
