use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{JobFlowError, Result};

/// 文档来源 trait - 把路径解析为纯文本的窄接口
///
/// PDF/DOCX 解析属外部协作者，这里只内置纯文本与 Markdown。
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self, path: &Path) -> Result<String>;
}

pub type DynDocumentSource = Arc<dyn DocumentSource>;

/// 纯文本/Markdown 实现；Markdown 仅做轻度去标记
#[derive(Default, Clone)]
pub struct TextDocumentSource;

#[async_trait]
impl DocumentSource for TextDocumentSource {
    async fn load(&self, path: &Path) -> Result<String> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            JobFlowError::Document(format!("failed to read `{}`: {e}", path.display()))
        })?;
        if raw.trim().is_empty() {
            return Err(JobFlowError::Document(format!(
                "document `{}` is empty",
                path.display()
            )));
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("md") | Some("markdown") => Ok(strip_markdown(&raw)),
            _ => Ok(raw),
        }
    }
}

fn strip_markdown(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            line.trim_start_matches('#')
                .trim_start_matches(['-', '*'])
                .trim()
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
