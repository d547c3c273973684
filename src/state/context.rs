use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{JobFlowError, Result};

/// 共享上下文 - 单次运行内节点之间唯一的数据通道
///
/// 克隆得到的是同一份底层存储的句柄；上下文随一次顶层运行创建和销毁，
/// 不跨运行复用。
#[derive(Clone)]
pub struct SharedContext {
    store: Arc<RwLock<Map<String, Value>>>,
    cancel: CancellationToken,
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedContext {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Map::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// 以既有键值初始化（测试与批量子运行使用）
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            store: Arc::new(RwLock::new(map)),
            cancel: CancellationToken::new(),
        }
    }

    /// 读取一个键；缺失即 None，读取方不得假设键已产出
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.read().get(key).cloned()
    }

    /// 读取并反序列化为具体类型
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| JobFlowError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// 读取必需键；缺失视为配置错误
    pub fn require(&self, node: &str, key: &str) -> Result<Value> {
        self.get(key).ok_or_else(|| JobFlowError::MissingInput {
            node: node.to_string(),
            key: key.to_string(),
        })
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.store.write().insert(key.into(), value);
    }

    /// 序列化后写入
    pub fn insert_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let value =
            serde_json::to_value(value).map_err(|e| JobFlowError::Serialization(e.to_string()))?;
        self.insert(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.store.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.store.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// 当前内容的深拷贝快照
    pub fn snapshot(&self) -> Map<String, Value> {
        self.store.read().clone()
    }

    /// 将一组键值合并进来（批量聚合阶段使用）
    pub fn merge(&self, entries: Map<String, Value>) {
        let mut store = self.store.write();
        for (key, value) in entries {
            store.insert(key, value);
        }
    }

    /// 派生独立子上下文：数据为快照拷贝，取消令牌挂在父令牌之下
    ///
    /// 批量流程的每个条目在各自的子上下文里运行，互不可见，
    /// 结果由批量节点的聚合阶段并回父上下文。
    pub fn fork(&self) -> SharedContext {
        Self {
            store: Arc::new(RwLock::new(self.snapshot())),
            cancel: self.cancel.child_token(),
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// 请求取消本次运行；运行时在节点间与退避等待中检查
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext")
            .field("keys", &self.store.read().keys().collect::<Vec<_>>())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
