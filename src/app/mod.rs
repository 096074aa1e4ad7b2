//! # 应用上下文
//!
//! 启动时一次性构建全部共享服务，之后只通过克隆句柄共享。

pub mod context;

pub use context::AppContext;
