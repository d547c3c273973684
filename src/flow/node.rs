use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{JobFlowError, Result};
use crate::flow::outcome::Outcome;
use crate::flow::retry::RetryPolicy;
use crate::state::SharedContext;

/// prep 阶段的产物，原样交给 exec 与 post
///
/// 叶子节点产出 `Value`；批量节点产出 `Batch`；嵌套流程用 `Forward`
/// 把外层共享上下文转交给执行阶段。`Batch` 随行的上下文仅用于取消传播，
/// 条目执行不得借它直接写外层上下文。
#[derive(Clone, Debug, Default)]
pub enum Prepared {
    #[default]
    Empty,
    Value(Value),
    Batch {
        items: Vec<Value>,
        ctx: SharedContext,
    },
    Forward(SharedContext),
}

impl Prepared {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Prepared::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[Value]> {
        match self {
            Prepared::Batch { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn forwarded(&self) -> Option<&SharedContext> {
        match self {
            Prepared::Forward(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// 工作单元 - 三阶段生命周期契约
///
/// 执行顺序固定为 prep -> exec -> post。prep 只读上下文，失败立即传播；
/// exec 是唯一可重试阶段，按 [`RetryPolicy`] 重试，尝试序号对实现可见；
/// 重试耗尽后调用一次 `exec_fallback`，默认重新抛出；post 写回上下文并
/// 返回选路用的结果标签。[`crate::flow::Flow`] 同样实现本契约，流程因此
/// 可以作为节点嵌套。
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// 只读阶段：从共享上下文取本节点所需输入
    async fn prep(&self, _ctx: &SharedContext) -> Result<Prepared> {
        Ok(Prepared::Empty)
    }

    /// 易错阶段：外部调用发生在这里；`attempt` 从 0 计数
    async fn exec(&self, prep: &Prepared, attempt: u32) -> Result<Value>;

    /// 重试耗尽后的最后机会；返回 Ok 即以降级结果继续
    async fn exec_fallback(&self, _prep: &Prepared, error: JobFlowError) -> Result<Value> {
        Err(error)
    }

    /// 写回阶段：落盘派生输出并返回结果标签
    async fn post(&self, _ctx: &SharedContext, _prep: Prepared, _result: Value) -> Result<Outcome> {
        Ok(Outcome::default())
    }

    /// 驱动一次完整生命周期
    async fn run(&self, ctx: &SharedContext) -> Result<Outcome> {
        if ctx.is_cancelled() {
            return Err(JobFlowError::Cancelled);
        }

        let prep = self.prep(ctx).await?;
        let policy = self.retry();
        let mut attempt = 0u32;

        let result = loop {
            match self.exec(&prep, attempt).await {
                Ok(value) => break value,
                Err(JobFlowError::Cancelled) => return Err(JobFlowError::Cancelled),
                // 配置错误不属于瞬时故障，不重试也不走降级钩子
                Err(error) if error.is_configuration() => return Err(error),
                Err(error) => {
                    let used = attempt + 1;
                    if used < policy.max_attempts {
                        debug!(
                            node = %self.name(),
                            attempt = used,
                            error = %error,
                            "execute attempt failed, retrying"
                        );
                        policy.wait(ctx.cancellation()).await?;
                        attempt = used;
                    } else {
                        debug!(
                            node = %self.name(),
                            attempts = used,
                            "execute exhausted, invoking fallback"
                        );
                        match self.exec_fallback(&prep, error).await {
                            Ok(value) => break value,
                            Err(error) => {
                                return Err(JobFlowError::Exhausted {
                                    node: self.name().to_string(),
                                    attempts: used,
                                    source: Box::new(error),
                                });
                            }
                        }
                    }
                }
            }
        };

        self.post(ctx, prep, result).await
    }
}
