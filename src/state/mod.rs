// 状态管理模块

mod context;

pub use context::SharedContext;
