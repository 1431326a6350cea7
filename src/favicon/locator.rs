//! # 图标地址定位模块
//!
//! ## 设计思路
//!
//! 定位器是注入能力：给定页面地址，返回具体的图标资源地址。核心流程只依赖
//! `FaviconLocator` trait，测试中可替换为内存实现。
//!
//! ## 实现思路
//!
//! - `RootFaviconLocator`：直接取站点根目录的 `/favicon.ico`。
//! - `HtmlFaviconLocator`：拉取页面，扫描 `<link rel="...icon..." href="...">`，
//!   相对地址按最终页面地址解析；页面无图标声明或状态码非 2xx 时回退根目录图标，
//!   传输失败则视为定位失败。

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::fetcher::{read_body_limited, redact_url_for_log};
use super::{DownloadError, FaviconConfig};

/// 页面地址 → 图标地址。
#[async_trait]
pub trait FaviconLocator: Send + Sync {
    async fn locate(&self, page_url: &Url) -> Result<Url, DownloadError>;
}

/// 站点根目录图标地址，`scheme://host[:port]/favicon.ico`。
pub fn root_favicon_url(page_url: &Url) -> Result<Url, DownloadError> {
    if page_url.host_str().is_none() {
        return Err(DownloadError::LocatorFailed(format!(
            "地址缺少主机名：{}",
            redact_url_for_log(page_url)
        )));
    }
    page_url
        .join("/favicon.ico")
        .map_err(|e| DownloadError::LocatorFailed(format!("拼接图标地址失败：{}", e)))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RootFaviconLocator;

#[async_trait]
impl FaviconLocator for RootFaviconLocator {
    async fn locate(&self, page_url: &Url) -> Result<Url, DownloadError> {
        root_favicon_url(page_url)
    }
}

static LINK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<link\b[^>]*>").expect("link tag pattern is valid")
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern is valid")
});

/// 解析 HTML 中声明的图标地址。
#[derive(Clone)]
pub struct HtmlFaviconLocator {
    client: reqwest::Client,
    max_page_bytes: u64,
}

impl HtmlFaviconLocator {
    pub fn new(client: reqwest::Client, config: &FaviconConfig) -> Self {
        Self {
            client,
            max_page_bytes: config.max_page_bytes,
        }
    }

    /// 在页面中查找图标链接，按优先级取最佳候选。
    ///
    /// `icon` / `shortcut icon` 优先于 `apple-touch-icon`，同级取第一个出现的。
    pub fn find_icon_href(html: &str) -> Option<String> {
        let mut best: Option<(u8, String)> = None;

        for tag in LINK_TAG.find_iter(html) {
            let mut rel = None;
            let mut href = None;
            for cap in ATTRIBUTE.captures_iter(tag.as_str()) {
                let value = cap
                    .get(2)
                    .or_else(|| cap.get(3))
                    .or_else(|| cap.get(4))
                    .map(|m| m.as_str().trim().to_string());
                match cap.get(1).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
                    Some("rel") => rel = value,
                    Some("href") => href = value,
                    _ => {}
                }
            }

            let (Some(rel), Some(href)) = (rel, href) else {
                continue;
            };
            if href.is_empty() {
                continue;
            }

            let Some(rank) = Self::rel_rank(&rel) else {
                continue;
            };
            if best.as_ref().is_none_or(|(current, _)| rank < *current) {
                best = Some((rank, href));
            }
        }

        best.map(|(_, href)| href)
    }

    fn rel_rank(rel: &str) -> Option<u8> {
        let tokens: Vec<String> = rel
            .split_ascii_whitespace()
            .map(str::to_ascii_lowercase)
            .collect();
        if tokens.iter().any(|t| t == "icon") {
            Some(0)
        } else if tokens
            .iter()
            .any(|t| t == "apple-touch-icon" || t == "apple-touch-icon-precomposed")
        {
            Some(1)
        } else {
            None
        }
    }
}

#[async_trait]
impl FaviconLocator for HtmlFaviconLocator {
    async fn locate(&self, page_url: &Url) -> Result<Url, DownloadError> {
        let fallback = root_favicon_url(page_url)?;

        let response = self
            .client
            .get(page_url.clone())
            .send()
            .await
            .map_err(|e| {
                DownloadError::LocatorFailed(format!(
                    "请求页面失败（{}）：{}",
                    redact_url_for_log(page_url),
                    e.without_url()
                ))
            })?;

        let (body, final_url) = match read_body_limited(response, self.max_page_bytes).await {
            Ok(ok) => ok,
            Err(detail) => {
                log::debug!(
                    "↪️ 页面不可用（{}），回退根目录图标：{}",
                    detail,
                    redact_url_for_log(&fallback)
                );
                return Ok(fallback);
            }
        };

        let html = String::from_utf8_lossy(&body);
        let Some(href) = Self::find_icon_href(&html) else {
            return Ok(fallback);
        };

        match final_url.join(&href) {
            Ok(icon_url) if matches!(icon_url.scheme(), "http" | "https") => Ok(icon_url),
            Ok(icon_url) => {
                log::debug!("↪️ 忽略非 http 图标地址：{}", icon_url.scheme());
                Ok(fallback)
            }
            Err(e) => {
                log::debug!("↪️ 图标地址无法解析（{}），回退根目录图标", e);
                Ok(fallback)
            }
        }
    }
}
