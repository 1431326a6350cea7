//! # 配置模块
//!
//! ## 设计思路
//!
//! 将下载与转码的所有可调参数集中到 `FaviconConfig`，保证行为可观测、可调整、可测试。
//! 重采样质量（bicubic / lanczos / bilinear / nearest）作为高层语义，映射到
//! `fast_image_resize` 与 `image` 两套滤镜。
//!
//! ## 实现思路
//!
//! - `Default` 提供与原插件一致的请求头与 16×16 画布。
//! - `ResampleQuality` 负责质量字符串解析与反向输出。
//! - 配置可由 `serde` 从设置文件读取，缺省字段回退默认值。

use fast_image_resize as fr;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 桌面浏览器 UA，部分站点会对未知客户端返回错误页。
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows 6.1; rv:27.0) Gecko/20100101 Firefox/27.0";
pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "*";
pub const DEFAULT_ICON_SIZE: u32 = 16;

/// 图标下载与转码配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaviconConfig {
    /// 输出画布边长（像素），输出总是正方形。
    pub icon_size: u32,
    /// 请求头 `User-Agent`。
    pub user_agent: String,
    /// 请求头 `Accept`。
    pub accept: String,
    /// 请求头 `Accept-Language`。
    pub accept_language: String,
    /// 图标响应体积上限（字节）。
    pub max_icon_bytes: u64,
    /// 定位器读取页面 HTML 的体积上限（字节）。
    pub max_page_bytes: u64,
    /// 解码前按头信息检查的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 重采样质量。
    pub resample_quality: ResampleQuality,
    /// 单次请求超时（秒）；`None` 表示交由底层传输自行处理。
    pub request_timeout_secs: Option<u64>,
}

impl Default for FaviconConfig {
    fn default() -> Self {
        Self {
            icon_size: DEFAULT_ICON_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            max_icon_bytes: 4 * 1024 * 1024,
            max_page_bytes: 2 * 1024 * 1024,
            max_decoded_pixels: 4096 * 4096,
            resample_quality: ResampleQuality::Bicubic,
            request_timeout_secs: None,
        }
    }
}

impl FaviconConfig {
    /// 校验配置取值范围，设置文件加载后调用。
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=256).contains(&self.icon_size) {
            return Err(AppError::Config(format!(
                "icon_size 必须在 1~256 之间，当前为 {}",
                self.icon_size
            )));
        }
        if self.max_icon_bytes == 0 || self.max_page_bytes == 0 {
            return Err(AppError::Config("响应体积上限不能为 0".to_string()));
        }
        if self.max_decoded_pixels < u64::from(self.icon_size) * u64::from(self.icon_size) {
            return Err(AppError::Config(
                "max_decoded_pixels 不能小于输出画布像素数".to_string(),
            ));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(AppError::Config("request_timeout_secs 不能为 0".to_string()));
        }
        Ok(())
    }
}

/// 重采样质量档位。
///
/// - `Bicubic`：默认，高质量双三次插值
/// - `Lanczos`：更锐利，开销更高
/// - `Bilinear`：更快
/// - `Nearest`：像素风图标保持硬边
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleQuality {
    Bicubic,
    Lanczos,
    Bilinear,
    Nearest,
}

impl ResampleQuality {
    /// 从外部字符串解析质量档位。
    ///
    /// # 示例
    /// ```rust
    /// use favicon_downloader::favicon::ResampleQuality;
    ///
    /// let q = ResampleQuality::from_str("bicubic")?;
    /// assert_eq!(q.as_str(), "bicubic");
    /// # Ok::<(), favicon_downloader::error::AppError>(())
    /// ```
    pub fn from_str(quality: &str) -> Result<Self, AppError> {
        match quality.trim().to_lowercase().as_str() {
            "bicubic" => Ok(Self::Bicubic),
            "lanczos" => Ok(Self::Lanczos),
            "bilinear" => Ok(Self::Bilinear),
            "nearest" => Ok(Self::Nearest),
            other => Err(AppError::Config(format!(
                "未知重采样质量：{}（可选：bicubic / lanczos / bilinear / nearest）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bicubic => "bicubic",
            Self::Lanczos => "lanczos",
            Self::Bilinear => "bilinear",
            Self::Nearest => "nearest",
        }
    }

    /// `fast_image_resize` 卷积算法。
    pub(crate) fn resize_alg(self) -> fr::ResizeAlg {
        match self {
            Self::Bicubic => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
            Self::Lanczos => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
            Self::Bilinear => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
            Self::Nearest => fr::ResizeAlg::Nearest,
        }
    }

    /// 回退路径使用的 `image` 滤镜。
    pub(crate) fn image_filter(self) -> FilterType {
        match self {
            Self::Bicubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
            Self::Bilinear => FilterType::Triangle,
            Self::Nearest => FilterType::Nearest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_browser_headers() {
        let config = FaviconConfig::default();
        assert_eq!(config.icon_size, 16);
        assert_eq!(config.accept_language, "*");
        assert!(config.user_agent.contains("Firefox/27.0"));
        assert!(config.accept.ends_with("*/*;q=0.8"));
        assert!(config.request_timeout_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn quality_parse_roundtrip_and_rejects_unknown() {
        for name in ["bicubic", "lanczos", "bilinear", "nearest"] {
            let q = ResampleQuality::from_str(name).expect("known quality");
            assert_eq!(q.as_str(), name);
        }
        assert_eq!(
            ResampleQuality::from_str("  BICUBIC ").expect("case-insensitive"),
            ResampleQuality::Bicubic
        );
        assert!(matches!(
            ResampleQuality::from_str("ultra"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = FaviconConfig::default();
        config.icon_size = 0;
        assert!(config.validate().is_err());

        let mut config = FaviconConfig::default();
        config.max_decoded_pixels = 10;
        assert!(config.validate().is_err());

        let mut config = FaviconConfig::default();
        config.request_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: FaviconConfig =
            serde_json::from_str(r#"{ "resample_quality": "lanczos" }"#).expect("parse");
        assert_eq!(config.resample_quality, ResampleQuality::Lanczos);
        assert_eq!(config.icon_size, DEFAULT_ICON_SIZE);
    }
}
