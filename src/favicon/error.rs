//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 单个 `DownloadUnit` 的全部失败来源收敛到一个枚举，每个阶段在本地捕获错误并转换为
//! 该单元的终态，不会跨越单元边界向批处理传播。
//!
//! - `UriInvalid`：记录没有可用地址，单元直接跳过，不进入错误报告
//! - `LocatorFailed`：页面 → 图标地址解析失败
//! - `FetchFailed`：网络传输失败（DNS、连接、非 2xx、响应异常）
//! - `TranscodeFailed`：解码或编码失败

/// 图标下载单元的错误类型。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("no usable url: {0}")]
    UriInvalid(String),

    #[error("locator failed: {0}")]
    LocatorFailed(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("transcode failed: {0}")]
    TranscodeFailed(String),
}

impl DownloadError {
    /// 稳定错误码，供日志与进度界面使用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::UriInvalid(_) => "E_URI",
            Self::LocatorFailed(_) => "E_LOCATOR",
            Self::FetchFailed(_) => "E_FETCH",
            Self::TranscodeFailed(_) => "E_TRANSCODE",
        }
    }

    /// 出错所在阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UriInvalid(_) | Self::LocatorFailed(_) => "resolve",
            Self::FetchFailed(_) => "fetch",
            Self::TranscodeFailed(_) => "transcode",
        }
    }

    /// 是否应计入批处理错误报告。
    ///
    /// 无可用地址只意味着“没有事情可做”，不是错误。
    pub fn is_reportable(&self) -> bool {
        !matches!(self, Self::UriInvalid(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_stage_prefixes() {
        assert_eq!(
            DownloadError::FetchFailed("HTTP 404".into()).to_string(),
            "fetch failed: HTTP 404"
        );
        assert_eq!(
            DownloadError::TranscodeFailed("bad header".into()).to_string(),
            "transcode failed: bad header"
        );
    }

    #[test]
    fn uri_invalid_is_not_reportable() {
        assert!(!DownloadError::UriInvalid("empty".into()).is_reportable());
        assert!(DownloadError::LocatorFailed("dns".into()).is_reportable());
        assert_eq!(DownloadError::LocatorFailed("dns".into()).stage(), "resolve");
        assert_eq!(DownloadError::TranscodeFailed("x".into()).code(), "E_TRANSCODE");
    }
}
