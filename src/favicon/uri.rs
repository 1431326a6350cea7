//! # 地址解析模块
//!
//! 从记录字段推导规范化的绝对地址，不访问网络。
//!
//! 1. 读取 `URL` 字段，为空则回退 `Title`
//! 2. 仍为空 → 无地址
//! 3. 带 `://` 且协议不是 http/https → 无地址
//! 4. 至少包含一个 `.`（粗略的域名检查）
//! 5. 无协议前缀时补 `http://`
//! 6. 通过以上检查却无法解析 → 定位失败，计入错误报告

use url::Url;

use super::DownloadError;
use crate::record::Record;

const SCHEME_SEPARATOR: &str = "://";

#[derive(Debug, Clone, Copy, Default)]
pub struct UriResolver;

impl UriResolver {
    pub fn new() -> Self {
        Self
    }

    /// 解析记录对应的页面地址。
    ///
    /// 返回 `UriInvalid` 表示该记录应被跳过，而不是失败；
    /// 通过了前置检查却无法解析的地址是 `LocatorFailed`，会进入错误报告。
    pub fn resolve(&self, record: &Record) -> Result<Url, DownloadError> {
        // 只有 URL 字段完全为空才回退 Title；纯空白的 URL 不回退
        let raw = match record.url() {
            "" => record.title(),
            url => url,
        };
        Self::normalize(raw.trim())
    }

    pub fn normalize(raw: &str) -> Result<Url, DownloadError> {
        if raw.is_empty() {
            return Err(DownloadError::UriInvalid("URL 与 Title 均为空".to_string()));
        }

        let has_http_scheme = Self::has_http_scheme(raw);
        if !has_http_scheme && raw.contains(SCHEME_SEPARATOR) {
            return Err(DownloadError::UriInvalid(format!(
                "不支持的协议：{}",
                raw.split(SCHEME_SEPARATOR).next().unwrap_or_default()
            )));
        }

        if !raw.contains('.') {
            return Err(DownloadError::UriInvalid(format!("不像域名：{}", raw)));
        }

        let absolute = if has_http_scheme {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };

        Url::parse(&absolute)
            .map_err(|e| DownloadError::LocatorFailed(format!("URL 格式错误（{}）：{}", raw, e)))
    }

    fn has_http_scheme(raw: &str) -> bool {
        let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FIELD_TITLE, FIELD_URL};
    use proptest::prelude::*;

    fn resolve(url: &str, title: &str) -> Result<Url, DownloadError> {
        let record = Record::new("r")
            .with_field(FIELD_URL, url)
            .with_field(FIELD_TITLE, title);
        UriResolver::new().resolve(&record)
    }

    #[test]
    fn bare_host_gets_http_prefix() {
        let url = resolve("example.com", "").expect("resolves");
        assert_eq!(url.as_str(), "http://example.com/");
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn https_is_kept_as_is() {
        let url = resolve("https://secure.example.org/login?next=1", "").expect("resolves");
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("secure.example.org"));
        assert_eq!(url.query(), Some("next=1"));
    }

    #[test]
    fn falls_back_to_title_when_url_empty() {
        let url = resolve("", "github.com").expect("title fallback");
        assert_eq!(url.host_str(), Some("github.com"));
    }

    #[test]
    fn empty_url_and_title_is_uri_invalid() {
        assert!(matches!(resolve("", ""), Err(DownloadError::UriInvalid(_))));
        assert!(matches!(
            UriResolver::new().resolve(&Record::new("no-fields")),
            Err(DownloadError::UriInvalid(_))
        ));
    }

    #[test]
    fn foreign_scheme_is_rejected() {
        assert!(matches!(resolve("ftp://x.y", ""), Err(DownloadError::UriInvalid(_))));
        assert!(matches!(
            resolve("ssh://host.example.com", ""),
            Err(DownloadError::UriInvalid(_))
        ));
    }

    #[test]
    fn string_without_dot_is_rejected() {
        assert!(matches!(resolve("localhost", ""), Err(DownloadError::UriInvalid(_))));
        assert!(matches!(resolve("My Bank", ""), Err(DownloadError::UriInvalid(_))));
    }

    #[test]
    fn whitespace_only_url_does_not_fall_back_to_title() {
        assert!(matches!(
            resolve("   ", "example.com"),
            Err(DownloadError::UriInvalid(_))
        ));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let url = resolve("  example.com \t", "").expect("resolves");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn dotted_but_unparsable_address_is_reported_not_skipped() {
        let err = resolve("", "Bank of America v2.0").expect_err("spaces in host");
        assert!(matches!(err, DownloadError::LocatorFailed(_)));
        assert!(err.is_reportable());

        assert!(matches!(
            resolve("http://exa mple.com", ""),
            Err(DownloadError::LocatorFailed(_))
        ));
    }

    proptest! {
        #[test]
        fn non_http_schemes_never_resolve(
            scheme in "[a-z][a-z0-9+]{0,7}",
            host in "[a-z]{1,10}\\.[a-z]{2,4}",
        ) {
            prop_assume!(scheme != "http" && scheme != "https");
            let raw = format!("{}://{}", scheme, host);
            prop_assert!(matches!(resolve(&raw, ""), Err(DownloadError::UriInvalid(_))));
        }

        #[test]
        fn dotted_hosts_resolve_to_http(host in "[a-z]{1,12}\\.[a-z]{2,6}") {
            let url = resolve(&host, "").expect("dotted host resolves");
            prop_assert_eq!(url.scheme(), "http");
            prop_assert_eq!(url.host_str(), Some(host.as_str()));
        }
    }
}
