//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 单条记录的下载失败由 `favicon::DownloadError` 表达，只停留在单元内部并进入错误报告；
//! 本模块的 `AppError` 面向外围层：数据库、配置、HTTP 客户端构建、图标仓库、文件 I/O。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于以 JSON 输出给调用方。

use serde::Serialize;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 数据库操作失败
    #[error("数据库错误: {0}")]
    Database(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置无效
    #[error("配置错误: {0}")]
    Config(String),

    /// 图标仓库读写失败
    #[error("图标仓库错误: {0}")]
    Store(String),

    /// HTTP 客户端构建失败
    #[error("HTTP 客户端错误: {0}")]
    Http(String),
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
